use std::fmt::Write as _;

use hashbrown::HashSet;
use tracing::{debug, info, warn};

use super::level::{FromItem, SelectItem, SelectLevel};
use super::{LazyQuery, RelationalOp, RenderedQuery};
use crate::compile::{CompileContext, ExprCompiler, desc_inner};
use crate::config::SqlConfig;
use crate::dialect::Dialect;
use crate::errors::{Result, SqlPipeError};
use crate::expr::{Expression, col};
use crate::ident::Ident;

/// Query state between two operations of a chain.
#[derive(Debug, Clone)]
pub(super) struct BuildState {
    pub level: SelectLevel,
    pub groups: Vec<String>,
    /// Ordering applied at the outermost level when rendering.
    pub order: Vec<Expression>,
}

impl BuildState {
    pub fn vars(&self) -> Vec<String> {
        self.level.output_names()
    }
}

/// Folds an op chain into nested SELECT levels.
///
/// Each operation composes onto the current level when SQL clause order
/// allows it, otherwise the current level is wrapped in a subquery first.
#[derive(Debug)]
pub(super) struct QueryBuilder<'a> {
    pub(super) compiler: ExprCompiler<'a>,
    next_alias: usize,
    next_temp: usize,
    warnings: Vec<String>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(dialect: &'a Dialect, config: &'a SqlConfig) -> Self {
        QueryBuilder {
            compiler: ExprCompiler::new(dialect, config),
            next_alias: 0,
            next_temp: 0,
            warnings: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &'a Dialect {
        self.compiler.dialect()
    }

    pub fn build(&mut self, query: &LazyQuery) -> Result<BuildState> {
        let source = &query.source;
        let mut state = BuildState {
            level: SelectLevel::identity(
                FromItem::Table {
                    schema: source.schema.clone(),
                    name: source.name.clone(),
                },
                source.columns.clone(),
            ),
            groups: Vec::new(),
            order: Vec::new(),
        };

        for op in &query.ops {
            state = self.apply(state, op)?;
        }

        Ok(state)
    }

    fn apply(&mut self, state: BuildState, op: &RelationalOp) -> Result<BuildState> {
        match op {
            RelationalOp::Select(idents) => self.select(state, idents),
            RelationalOp::Rename(pairs) => self.rename(state, pairs),
            RelationalOp::Filter(predicates) => predicates
                .iter()
                .try_fold(state, |state, predicate| self.filter(state, predicate)),
            RelationalOp::Mutate(assignments) => assignments
                .iter()
                .try_fold(state, |state, (name, expr)| self.mutate(state, name, expr)),
            RelationalOp::Summarise(assignments) => self.summarise(state, assignments),
            RelationalOp::Arrange(keys) => self.arrange(state, keys),
            RelationalOp::GroupBy { keys, add } => self.group_by(state, keys, *add),
            RelationalOp::Ungroup => Ok(BuildState {
                groups: Vec::new(),
                ..state
            }),
        }
    }

    /// Render the final level with the accumulated ordering.
    pub fn finish(mut self, state: BuildState) -> Result<RenderedQuery> {
        // Order keys that are expressions can't use output aliases of the
        // same level.
        let needs_wrap = state.order.iter().any(|key| {
            let key = desc_inner(key).unwrap_or(key);
            key.as_column().is_none() && !state.level.can_reference(key.column_refs())
        });
        let state = if needs_wrap { self.wrap(state) } else { state };

        let mut sql = state.level.render(self.dialect())?;
        if !state.order.is_empty() {
            let keys = self
                .compiler
                .compile_order_by(&state.order, &CompileContext::scalar())?;
            write!(sql, " ORDER BY {}", keys.join(", "))?;
        }

        debug!(%sql, dialect = %self.dialect(), "rendered query");

        let mut warnings = self.warnings;
        warnings.extend(self.compiler.take_warnings());

        Ok(RenderedQuery {
            sql,
            vars: state.vars(),
            groups: state.groups,
            warnings,
        })
    }

    /// Ungroup with the grouping columns leading and rows ordered by them.
    pub fn group_ordered(&mut self, state: BuildState) -> Result<BuildState> {
        if state.groups.is_empty() {
            return Ok(state);
        }

        let groups = state.groups.clone();
        let idents: Vec<Ident> = groups
            .iter()
            .chain(state.vars().iter().filter(|v| !groups.contains(v)))
            .map(|v| Ident::new(v.as_str()))
            .collect();
        let mut state = self.select(state, &idents)?;

        let prior = std::mem::take(&mut state.order);
        state.order = groups.iter().map(|g| col(g.as_str())).collect();
        for key in prior {
            if !state.order.contains(&key) {
                state.order.push(key);
            }
        }

        Ok(state)
    }

    /// Distinct group keys, ordered by the keys.
    pub fn labels(&mut self, state: BuildState) -> Result<BuildState> {
        if state.groups.is_empty() {
            return Err(SqlPipeError::InvalidArgument {
                function: "labels".to_string(),
                reason: "query is not grouped".to_string(),
            });
        }

        let groups = state.groups.clone();
        let mut state = self.summarise(state, &[])?;
        state.order = groups.iter().map(|g| col(g.as_str())).collect();
        state.groups = groups;

        Ok(state)
    }

    pub(super) fn wrap(&mut self, state: BuildState) -> BuildState {
        let vars = state.level.output_names();
        let alias = self.next_alias();
        debug!(%alias, "wrapping query level in subquery");

        BuildState {
            level: SelectLevel::identity(
                FromItem::Subquery {
                    level: Box::new(state.level),
                    alias,
                },
                vars,
            ),
            groups: state.groups,
            order: state.order,
        }
    }

    pub(super) fn next_alias(&mut self) -> String {
        self.next_alias += 1;
        format!("q{:02}", self.next_alias)
    }

    pub(super) fn next_temp(&mut self) -> String {
        self.next_temp += 1;
        format!("win{:02}", self.next_temp)
    }

    fn check_refs(&self, state: &BuildState, expr: &Expression) -> Result<()> {
        let vars = state.vars();
        match expr.column_refs().into_iter().find(|r| !vars.iter().any(|v| v == r)) {
            Some(missing) => Err(SqlPipeError::UnknownColumn {
                name: missing.to_string(),
                available: vars,
            }),
            None => Ok(()),
        }
    }

    fn check_names<'n>(
        &self,
        state: &BuildState,
        names: impl IntoIterator<Item = &'n str>,
    ) -> Result<()> {
        let vars = state.vars();
        for name in names {
            if !vars.iter().any(|v| v == name) {
                return Err(SqlPipeError::UnknownColumn {
                    name: name.to_string(),
                    available: vars,
                });
            }
        }
        Ok(())
    }

    pub(super) fn select(&mut self, state: BuildState, idents: &[Ident]) -> Result<BuildState> {
        self.check_names(&state, idents.iter().map(|i| i.name.as_str()))?;

        let missing: Vec<&String> = state
            .groups
            .iter()
            .filter(|g| !idents.iter().any(|i| i.name == **g))
            .collect();
        let mut selected: Vec<Ident> = Vec::with_capacity(idents.len() + missing.len());
        if !missing.is_empty() {
            info!(?missing, "adding missing grouping columns to selection");
            selected.extend(missing.into_iter().map(|g| Ident::new(g.as_str())));
        }
        selected.extend(idents.iter().cloned());

        let mut items = Vec::with_capacity(selected.len());
        for ident in &selected {
            let Some(item) = state.level.item(&ident.name) else {
                // Checked above.
                continue;
            };
            let mut item = item.clone();
            item.name = ident.output_name().to_string();
            items.push(item);
        }

        let renames: Vec<(String, String)> = selected
            .iter()
            .filter(|i| i.alias.is_some())
            .map(|i| (i.name.clone(), i.output_name().to_string()))
            .collect();

        let BuildState {
            mut level,
            groups,
            order,
        } = state;
        level.items = items;

        let groups = groups
            .into_iter()
            .map(|g| rename_name(&g, &renames).unwrap_or(g))
            .collect();

        let kept: Vec<&str> = selected.iter().map(|i| i.name.as_str()).collect();
        let mut new_order = Vec::with_capacity(order.len());
        for mut key in order {
            if key.column_refs().iter().all(|r| kept.contains(r)) {
                rename_refs(&mut key, &renames);
                new_order.push(key);
            } else {
                let msg = format!("Dropping ordering by {key}, its columns are no longer selected");
                warn!("{msg}");
                self.warnings.push(msg);
            }
        }

        Ok(BuildState {
            level,
            groups,
            order: new_order,
        })
    }

    fn rename(&mut self, state: BuildState, pairs: &[(String, String)]) -> Result<BuildState> {
        self.check_names(&state, pairs.iter().map(|(from, _)| from.as_str()))?;

        let idents: Vec<Ident> = state
            .vars()
            .into_iter()
            .map(|v| match pairs.iter().find(|(from, _)| *from == v) {
                Some((_, to)) => Ident::with_alias(v, to.as_str()),
                None => Ident::new(v),
            })
            .collect();

        let mut seen = HashSet::with_capacity(idents.len());
        if let Some(dup) = idents.iter().find(|ident| !seen.insert(ident.output_name())) {
            return Err(SqlPipeError::InvalidArgument {
                function: "rename".to_string(),
                reason: format!("duplicate output column '{}'", dup.output_name()),
            });
        }

        self.select(state, &idents)
    }

    pub(super) fn filter(&mut self, state: BuildState, predicate: &Expression) -> Result<BuildState> {
        self.check_refs(&state, predicate)?;

        if self.needs_window(predicate) {
            return self.filter_windowed(state, predicate);
        }

        let level = &state.level;
        let needs_wrap = level.aggregated
            || level.windowed
            || level.is_joined()
            || !level.can_reference(predicate.column_refs());
        let mut state = if needs_wrap { self.wrap(state) } else { state };

        let sql = self.compiler.compile(predicate, &CompileContext::scalar())?;
        state.level.filters.push(sql);

        Ok(state)
    }

    pub(super) fn mutate(
        &mut self,
        state: BuildState,
        name: &str,
        expr: &Expression,
    ) -> Result<BuildState> {
        self.check_refs(&state, expr)?;

        let windowed = self.needs_window(expr);
        if windowed && (!self.dialect().supports_window_functions() || self.needs_join(expr)) {
            return self.mutate_emulated(state, name, expr);
        }

        let needs_wrap = {
            let level = &state.level;
            let mut deps = expr.column_refs();
            if windowed {
                deps.extend(state.groups.iter().map(String::as_str));
                deps.extend(state.order.iter().flat_map(Expression::column_refs));
            }
            level.aggregated || level.is_joined() || !level.can_reference(deps)
        };
        let mut state = if needs_wrap { self.wrap(state) } else { state };

        let ctx = if windowed {
            CompileContext::windowed(&state.groups, &state.order)
        } else {
            CompileContext::scalar()
        };
        let sql = self.compiler.compile(expr, &ctx)?;

        state.level.set_item(SelectItem::computed(name, sql));
        state.level.windowed |= windowed;

        Ok(state)
    }

    fn summarise(
        &mut self,
        state: BuildState,
        assignments: &[(String, Expression)],
    ) -> Result<BuildState> {
        for (name, expr) in assignments {
            self.check_refs(&state, expr)?;
            if state.groups.contains(name) {
                return Err(SqlPipeError::InvalidArgument {
                    function: "summarise".to_string(),
                    reason: format!("cannot assign to grouping column '{name}'"),
                });
            }
        }

        let state = if state.level.is_plain() {
            state
        } else {
            self.wrap(state)
        };
        let BuildState {
            mut level, groups, ..
        } = state;

        let mut items: Vec<SelectItem> = groups.iter().map(|g| SelectItem::column(g.as_str())).collect();
        for (name, expr) in assignments {
            let sql = self.compiler.compile(expr, &CompileContext::scalar())?;
            items.push(SelectItem::computed(name.as_str(), sql));
        }

        level.items = items;
        level.group_by = groups;
        level.aggregated = true;

        Ok(BuildState {
            level,
            groups: Vec::new(),
            order: Vec::new(),
        })
    }

    fn arrange(&mut self, mut state: BuildState, keys: &[Expression]) -> Result<BuildState> {
        for key in keys {
            self.check_refs(&state, key)?;
        }
        state.order = keys.to_vec();
        Ok(state)
    }

    fn group_by(&mut self, mut state: BuildState, keys: &[String], add: bool) -> Result<BuildState> {
        self.check_names(&state, keys.iter().map(String::as_str))?;

        if !add {
            state.groups.clear();
        }
        for key in keys {
            if !state.groups.contains(key) {
                state.groups.push(key.clone());
            }
        }

        Ok(state)
    }
}

/// New name for `name` if it is renamed.
fn rename_name(name: &str, renames: &[(String, String)]) -> Option<String> {
    renames
        .iter()
        .find(|(from, _)| from == name)
        .map(|(_, to)| to.clone())
}

/// Rename column references, applying all renames simultaneously.
fn rename_refs(expr: &mut Expression, renames: &[(String, String)]) {
    if let Expression::Column(name) = expr {
        if let Some(to) = rename_name(name, renames) {
            *name = to;
        }
        return;
    }
    let _ = expr.for_each_child_mut(|child| {
        rename_refs(child, renames);
        Ok(())
    });
}
