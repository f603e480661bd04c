//! Reassembly of groups split across page boundaries.

use hashbrown::HashSet;
use tracing::trace;

use crate::errors::{Result, SqlPipeError};
use crate::scalar::{GroupKey, ScalarValue};

/// Contiguous rows sharing a group key.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub key: Vec<ScalarValue>,
    pub rows: Vec<Vec<ScalarValue>>,
}

/// Rows held back between pages, owned by a single traversal.
///
/// The last run of every page may continue on the next page, so it is
/// carried over and only released once a different key follows it or the
/// source is exhausted.
#[derive(Debug)]
pub struct CarryState {
    /// Number of leading columns making up the group key.
    num_keys: usize,
    carry: Option<Run>,
    finalized: HashSet<GroupKey>,
}

impl CarryState {
    pub fn new(num_keys: usize) -> Self {
        CarryState {
            num_keys,
            carry: None,
            finalized: HashSet::new(),
        }
    }

    pub fn carried_rows(&self) -> usize {
        self.carry.as_ref().map(|run| run.rows.len()).unwrap_or(0)
    }

    /// Add a page of rows, returning runs that are now known to be complete,
    /// in order.
    ///
    /// Errors if a run's key belongs to a group that was already completed,
    /// which means the source is not ordered by the group keys.
    pub fn push_page(&mut self, rows: Vec<Vec<ScalarValue>>) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = Vec::new();
        if let Some(carry) = self.carry.take() {
            runs.push(carry);
        }

        for row in rows {
            let key = match row.get(..self.num_keys) {
                Some(key) => key,
                None => {
                    return Err(SqlPipeError::InvalidArgument {
                        function: "fetch_paged".to_string(),
                        reason: format!(
                            "row has {} column(s), expected at least {} grouping column(s)",
                            row.len(),
                            self.num_keys
                        ),
                    });
                }
            };

            match runs.last_mut() {
                Some(run) if keys_eq(&run.key, key) => run.rows.push(row),
                _ => {
                    let key = key.to_vec();
                    self.check_not_finalized(&key)?;
                    if let Some(prev) = runs.last() {
                        self.finalized.insert(GroupKey(prev.key.clone()));
                    }
                    runs.push(Run {
                        key,
                        rows: vec![row],
                    });
                }
            }
        }

        self.carry = runs.pop();
        trace!(
            complete = runs.len(),
            carried = self.carried_rows(),
            "split page into runs"
        );

        Ok(runs)
    }

    /// Release the carried run. Only valid once no more pages will arrive.
    pub fn drain(&mut self) -> Option<Run> {
        let run = self.carry.take()?;
        self.finalized.insert(GroupKey(run.key.clone()));
        Some(run)
    }

    fn check_not_finalized(&self, key: &[ScalarValue]) -> Result<()> {
        if self.finalized.contains(&GroupKey(key.to_vec())) {
            return Err(SqlPipeError::ordering_violation(key));
        }
        Ok(())
    }
}

fn keys_eq(a: &[ScalarValue], b: &[ScalarValue]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.key_eq(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(values: &[(&str, i64)]) -> Vec<Vec<ScalarValue>> {
        values
            .iter()
            .map(|(k, v)| vec![ScalarValue::from(*k), ScalarValue::from(*v)])
            .collect()
    }

    fn keys(runs: &[Run]) -> Vec<String> {
        runs.iter().map(|r| r.key[0].to_string()).collect()
    }

    #[test]
    fn last_run_is_carried() {
        let mut carry = CarryState::new(1);

        let runs = carry.push_page(rows(&[("a", 1), ("a", 2), ("b", 3)])).unwrap();
        assert_eq!(vec!["a"], keys(&runs));
        assert_eq!(2, runs[0].rows.len());
        assert_eq!(1, carry.carried_rows());

        let runs = carry.push_page(rows(&[("b", 4), ("c", 5)])).unwrap();
        assert_eq!(vec!["b"], keys(&runs));
        assert_eq!(rows(&[("b", 3), ("b", 4)]), runs[0].rows);

        let last = carry.drain().unwrap();
        assert_eq!(rows(&[("c", 5)]), last.rows);
        assert!(carry.drain().is_none());
    }

    #[test]
    fn group_spanning_many_pages() {
        let mut carry = CarryState::new(1);
        for v in 0..5 {
            let runs = carry.push_page(rows(&[("a", v)])).unwrap();
            assert!(runs.is_empty());
        }
        let runs = carry.push_page(vec![]).unwrap();
        assert!(runs.is_empty());

        let last = carry.drain().unwrap();
        assert_eq!(5, last.rows.len());
    }

    #[test]
    fn interleaved_keys_in_page() {
        let mut carry = CarryState::new(1);
        let err = carry
            .push_page(rows(&[("a", 1), ("b", 2), ("a", 3)]))
            .unwrap_err();
        assert!(matches!(
            err,
            SqlPipeError::GroupOrderingViolation { ref key } if key == "(a)"
        ));
    }

    #[test]
    fn finalized_key_on_later_page() {
        let mut carry = CarryState::new(1);
        carry.push_page(rows(&[("a", 1), ("b", 2)])).unwrap();
        carry.push_page(rows(&[("b", 3), ("c", 4)])).unwrap();
        let err = carry.push_page(rows(&[("a", 5)])).unwrap_err();
        assert!(matches!(err, SqlPipeError::GroupOrderingViolation { .. }));
    }

    #[test]
    fn null_keys_group_together() {
        let mut carry = CarryState::new(1);
        let page = vec![
            vec![ScalarValue::Null, 1.into()],
            vec![ScalarValue::Null, 2.into()],
            vec!["x".into(), 3.into()],
        ];
        let runs = carry.push_page(page).unwrap();
        assert_eq!(1, runs.len());
        assert_eq!(2, runs[0].rows.len());
    }

    #[test]
    fn no_keys_single_run() {
        let mut carry = CarryState::new(0);
        assert!(carry.push_page(rows(&[("a", 1), ("b", 2)])).unwrap().is_empty());
        assert!(carry.push_page(rows(&[("c", 3)])).unwrap().is_empty());
        assert_eq!(3, carry.drain().unwrap().rows.len());
    }

    #[test]
    fn short_rows_rejected() {
        let mut carry = CarryState::new(3);
        carry.push_page(rows(&[("a", 1)])).unwrap_err();
    }
}
