//! Grouped traversal of paged query results.
//!
//! A query is rendered with its grouping columns first and rows ordered by
//! them. Pages are fetched one at a time, reassembled into complete groups,
//! and each group is handed to every computation exactly once.

mod carry;
mod output;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, trace};

pub use self::carry::{CarryState, Run};
pub use self::output::{ChunkOutput, GroupValue};
use crate::config::SqlConfig;
use crate::connection::{Connection, RowSet};
use crate::errors::{BoxError, Result, SqlPipeError};
use crate::relational::LazyQuery;
use crate::scalar::ScalarValue;

/// Rows of one complete group.
#[derive(Debug)]
pub struct Group {
    /// Position of the group in label order.
    pub index: usize,
    /// Values of the grouping columns. Empty for ungrouped queries.
    pub key: Vec<ScalarValue>,
    pub rows: RowSet,
}

type ComputeFn<'f> = Box<dyn FnMut(&Group) -> Result<GroupValue, BoxError> + 'f>;

/// Client computation run once per group.
pub struct Computation<'f> {
    name: Option<String>,
    func: ComputeFn<'f>,
}

impl<'f> Computation<'f> {
    pub fn named<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnMut(&Group) -> Result<GroupValue, BoxError> + 'f,
    {
        Computation {
            name: Some(name.into()),
            func: Box::new(func),
        }
    }

    pub fn unnamed<F>(func: F) -> Self
    where
        F: FnMut(&Group) -> Result<GroupValue, BoxError> + 'f,
    {
        Computation {
            name: None,
            func: Box::new(func),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Debug for Computation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Requests cancellation of a running traversal. Checked between groups.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub pages: usize,
    pub rows: usize,
    pub groups: usize,
}

#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub output: ChunkOutput,
    pub stats: TraversalStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    /// Waiting for the next page.
    Fetching,
    /// A complete group is being handed to computations.
    GroupComplete,
    /// Source exhausted, releasing the carried group.
    Draining,
    Done,
}

/// Runs grouped computations over a connection.
#[derive(Debug)]
pub struct ChunkedExecutor<'a, C: Connection + ?Sized> {
    conn: &'a C,
    config: SqlConfig,
    abort: AbortHandle,
}

impl<'a, C: Connection + ?Sized> ChunkedExecutor<'a, C> {
    pub fn new(conn: &'a C, config: SqlConfig) -> Self {
        ChunkedExecutor {
            conn,
            config,
            abort: AbortHandle::default(),
        }
    }

    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Run every computation once per group of `query`.
    ///
    /// Computations must be either all named, or a single unnamed one. This
    /// and the configured chunk size are checked before anything is sent to
    /// the connection.
    pub fn execute(
        &self,
        query: &LazyQuery,
        mut computations: Vec<Computation<'_>>,
    ) -> Result<ChunkResult> {
        validate_computations(&computations)?;
        self.config.validate()?;

        let dialect = self.conn.dialect();
        let rendered = query.render_group_ordered(dialect, &self.config)?;
        let num_keys = rendered.groups.len();

        let labels = if num_keys == 0 {
            // Ungrouped queries are a single group with an empty key.
            RowSet::with_rows(Vec::new(), vec![Vec::new()])
        } else {
            let label_query = query.render_labels(dialect, &self.config)?;
            self.conn.execute(&label_query.sql)?
        };
        debug!(groups = labels.num_rows(), sql = %rendered.sql, "starting grouped traversal");

        let mut traversal = Traversal {
            state: TraversalState::Fetching,
            carry: CarryState::new(num_keys),
            columns: rendered.vars.clone(),
            labels: &labels,
            slots: vec![vec![None; labels.num_rows()]; computations.len()],
            computations: &mut computations,
            next_group: 0,
            abort: &self.abort,
            stats: TraversalStats::default(),
        };

        self.conn
            .fetch_paged(&rendered.sql, self.config.chunk_size, &mut |page| {
                traversal.on_page(page)
            })?;
        traversal.drain()?;

        let stats = traversal.stats;
        let slots = traversal.slots;
        info!(
            pages = stats.pages,
            rows = stats.rows,
            groups = stats.groups,
            "grouped traversal complete"
        );

        let names = computations.iter().map(|c| c.name.clone()).collect();
        let output = output::assemble(labels, names, slots)?;

        Ok(ChunkResult { output, stats })
    }
}

fn validate_computations(computations: &[Computation]) -> Result<()> {
    if computations.is_empty() {
        return Err(SqlPipeError::InvalidComputations(
            "at least one computation is required".to_string(),
        ));
    }

    let named = computations.iter().filter(|c| c.name.is_some()).count();
    if named != 0 && named != computations.len() {
        return Err(SqlPipeError::MixedArgumentNaming {
            names: computations.iter().map(|c| c.name.clone()).collect(),
        });
    }

    if named == 0 && computations.len() > 1 {
        return Err(SqlPipeError::InvalidComputations(format!(
            "only a single unnamed computation is allowed, got {}",
            computations.len()
        )));
    }

    for (idx, c) in computations.iter().enumerate() {
        if computations[..idx].iter().any(|prev| prev.name == c.name) {
            return Err(SqlPipeError::InvalidComputations(format!(
                "duplicate computation name {:?}",
                c.name.as_deref().unwrap_or_default()
            )));
        }
    }

    Ok(())
}

/// State of a single traversal.
struct Traversal<'a, 'f> {
    state: TraversalState,
    carry: CarryState,
    /// Columns of every group's rows.
    columns: Vec<String>,
    labels: &'a RowSet,
    /// Output slots indexed by computation, then group.
    slots: Vec<Vec<Option<GroupValue>>>,
    computations: &'a mut [Computation<'f>],
    next_group: usize,
    abort: &'a AbortHandle,
    stats: TraversalStats,
}

impl Traversal<'_, '_> {
    fn on_page(&mut self, page: RowSet) -> Result<()> {
        debug_assert_eq!(TraversalState::Fetching, self.state);

        self.stats.pages += 1;
        self.stats.rows += page.num_rows();
        trace!(page = self.stats.pages, rows = page.num_rows(), "received page");

        for run in self.carry.push_page(page.rows)? {
            self.transition(TraversalState::GroupComplete);
            self.dispatch(run)?;
        }
        self.transition(TraversalState::Fetching);

        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        self.transition(TraversalState::Draining);

        match self.carry.drain() {
            Some(run) => self.dispatch(run)?,
            None if self.carry_is_ungrouped() && self.next_group == 0 => {
                // Ungrouped and empty, computations still see the one group.
                self.dispatch(Run {
                    key: Vec::new(),
                    rows: Vec::new(),
                })?
            }
            None => (),
        }

        let expected = self.labels.num_rows();
        if self.next_group != expected {
            return Err(SqlPipeError::GroupCountMismatch {
                expected,
                found: self.next_group,
            });
        }

        self.transition(TraversalState::Done);
        Ok(())
    }

    fn carry_is_ungrouped(&self) -> bool {
        self.labels.num_columns() == 0
    }

    fn transition(&mut self, next: TraversalState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "traversal state");
            self.state = next;
        }
    }

    fn dispatch(&mut self, run: Run) -> Result<()> {
        let index = self.next_group;
        if self.abort.is_aborted() {
            return Err(SqlPipeError::Cancelled { group: index });
        }

        let expected = self.labels.num_rows();
        let label = self
            .labels
            .rows
            .get(index)
            .ok_or(SqlPipeError::GroupCountMismatch {
                expected,
                found: index + 1,
            })?;
        let matches_label = label.len() == run.key.len()
            && label.iter().zip(&run.key).all(|(a, b)| a.key_eq(b));
        if !matches_label {
            return Err(SqlPipeError::ordering_violation(&run.key));
        }

        let group = Group {
            index,
            key: run.key,
            rows: RowSet::with_rows(self.columns.clone(), run.rows),
        };
        trace!(group = index, rows = group.rows.num_rows(), "dispatching group");

        for (comp_idx, comp) in self.computations.iter_mut().enumerate() {
            let value = (comp.func)(&group).map_err(|source| SqlPipeError::Computation {
                name: comp.name.clone().unwrap_or_default(),
                group: index,
                source,
            })?;
            self.slots[comp_idx][index] = Some(value);
        }

        self.next_group += 1;
        self.stats.groups += 1;

        Ok(())
    }
}
