//! Assembly of per-group computation results.

use std::any::Any;
use std::sync::Arc;

use crate::connection::RowSet;
use crate::errors::{Result, SqlPipeError};
use crate::scalar::ScalarValue;

/// Value produced by a computation for one group.
#[derive(Debug, Clone)]
pub enum GroupValue {
    Table(RowSet),
    Scalar(ScalarValue),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl GroupValue {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        GroupValue::Opaque(Arc::new(value))
    }

    pub fn as_table(&self) -> Option<&RowSet> {
        match self {
            GroupValue::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            GroupValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            GroupValue::Opaque(value) => value.downcast_ref(),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            GroupValue::Table(_) => "table",
            GroupValue::Scalar(_) => "scalar",
            GroupValue::Opaque(_) => "opaque value",
        }
    }
}

impl From<ScalarValue> for GroupValue {
    fn from(value: ScalarValue) -> Self {
        GroupValue::Scalar(value)
    }
}

impl From<RowSet> for GroupValue {
    fn from(value: RowSet) -> Self {
        GroupValue::Table(value)
    }
}

#[derive(Debug, Clone)]
pub enum ChunkOutput {
    /// Results of a single unnamed computation, concatenated in group order
    /// with the group label columns in front.
    Combined(RowSet),
    /// One row per group: labels plus one column per named computation.
    PerGroup {
        labels: RowSet,
        columns: Vec<(String, Vec<GroupValue>)>,
    },
}

impl ChunkOutput {
    /// Flatten into a single table. Only possible when every value is a
    /// scalar, or when the output is already combined.
    pub fn into_row_set(self) -> Result<RowSet> {
        let (labels, columns) = match self {
            ChunkOutput::Combined(table) => return Ok(table),
            ChunkOutput::PerGroup { labels, columns } => (labels, columns),
        };

        let mut out = labels;
        for (name, values) in columns {
            out.columns.push(name.clone());
            for (row, value) in out.rows.iter_mut().zip(values) {
                match value {
                    GroupValue::Scalar(value) => row.push(value),
                    other => {
                        return Err(SqlPipeError::NonUniformResultShape(format!(
                            "computation '{name}' returned a {}, expected a scalar",
                            other.kind()
                        )));
                    }
                }
            }
        }

        Ok(out)
    }
}

/// Build the output from filled slots, indexed by computation then group.
pub(crate) fn assemble(
    labels: RowSet,
    names: Vec<Option<String>>,
    slots: Vec<Vec<Option<GroupValue>>>,
) -> Result<ChunkOutput> {
    let expected = labels.num_rows();
    let mut columns = Vec::with_capacity(slots.len());
    for group_values in slots {
        let found = group_values.iter().filter(|v| v.is_some()).count();
        let values = group_values
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(SqlPipeError::GroupCountMismatch { expected, found })?;
        columns.push(values);
    }

    match names.as_slice() {
        [None] => {
            let values = columns.pop().unwrap_or_default();
            combine(labels, values)
        }
        _ => Ok(ChunkOutput::PerGroup {
            labels,
            columns: names
                .into_iter()
                .map(|name| name.unwrap_or_default())
                .zip(columns)
                .collect(),
        }),
    }
}

/// Concatenate per-group tables, prefixing each row with its group label.
fn combine(labels: RowSet, values: Vec<GroupValue>) -> Result<ChunkOutput> {
    let mut result_columns: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for (index, (label, value)) in labels.rows.iter().zip(values).enumerate() {
        let table = match value {
            GroupValue::Table(table) => table,
            other => {
                return Err(SqlPipeError::NonUniformResultShape(format!(
                    "group {index} returned a {}, expected a table",
                    other.kind()
                )));
            }
        };

        match &result_columns {
            Some(columns) if *columns != table.columns => {
                return Err(SqlPipeError::NonUniformResultShape(format!(
                    "group {index} returned columns {:?}, expected {:?}",
                    table.columns, columns
                )));
            }
            Some(_) => (),
            None => result_columns = Some(table.columns.clone()),
        }

        for row in table.rows {
            let mut out = label.clone();
            out.extend(row);
            rows.push(out);
        }
    }

    let mut columns = labels.columns;
    columns.extend(result_columns.unwrap_or_default());

    Ok(ChunkOutput::Combined(RowSet::with_rows(columns, rows)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> RowSet {
        RowSet::with_rows(
            vec!["g".to_string()],
            vec![vec!["a".into()], vec!["b".into()]],
        )
    }

    fn table(values: &[i64]) -> GroupValue {
        GroupValue::Table(RowSet::with_rows(
            vec!["v".to_string()],
            values.iter().map(|v| vec![ScalarValue::from(*v)]).collect(),
        ))
    }

    #[test]
    fn combine_tables_with_labels() {
        let out = assemble(
            labels(),
            vec![None],
            vec![vec![Some(table(&[1, 2])), Some(table(&[3]))]],
        )
        .unwrap();

        let ChunkOutput::Combined(out) = out else {
            panic!("expected combined output");
        };
        assert_eq!(vec!["g", "v"], out.columns);
        let expected: Vec<Vec<ScalarValue>> = vec![
            vec!["a".into(), 1.into()],
            vec!["a".into(), 2.into()],
            vec!["b".into(), 3.into()],
        ];
        assert_eq!(expected, out.rows);
    }

    #[test]
    fn unnamed_scalar_is_non_uniform() {
        let err = assemble(
            labels(),
            vec![None],
            vec![vec![Some(table(&[1])), Some(ScalarValue::from(2).into())]],
        )
        .unwrap_err();
        assert!(matches!(err, SqlPipeError::NonUniformResultShape(_)));
    }

    #[test]
    fn mismatched_table_columns() {
        let other = GroupValue::Table(RowSet::new(vec!["w".to_string()]));
        let err = assemble(labels(), vec![None], vec![vec![Some(table(&[1])), Some(other)]])
            .unwrap_err();
        assert!(matches!(err, SqlPipeError::NonUniformResultShape(_)));
    }

    #[test]
    fn named_per_group() {
        let out = assemble(
            labels(),
            vec![Some("n".to_string()), Some("model".to_string())],
            vec![
                vec![Some(ScalarValue::from(2).into()), Some(ScalarValue::from(1).into())],
                vec![Some(GroupValue::opaque(1.5_f64)), Some(GroupValue::opaque(2.5_f64))],
            ],
        )
        .unwrap();

        let ChunkOutput::PerGroup { labels, columns } = &out else {
            panic!("expected per group output");
        };
        assert_eq!(2, labels.num_rows());
        assert_eq!("model", columns[1].0);
        assert_eq!(Some(&2.5), columns[1].1[1].downcast_ref::<f64>());

        let err = out.into_row_set().unwrap_err();
        assert!(matches!(err, SqlPipeError::NonUniformResultShape(_)));
    }

    #[test]
    fn scalar_columns_flatten() {
        let out = assemble(
            labels(),
            vec![Some("n".to_string())],
            vec![vec![Some(ScalarValue::from(2).into()), Some(ScalarValue::from(1).into())]],
        )
        .unwrap()
        .into_row_set()
        .unwrap();
        assert_eq!(vec!["g", "n"], out.columns);
        assert_eq!(vec![ScalarValue::from("b"), ScalarValue::from(1)], out.rows[1]);
    }

    #[test]
    fn missing_slot() {
        let err = assemble(labels(), vec![Some("n".to_string())], vec![vec![Some(table(&[1])), None]])
            .unwrap_err();
        assert!(matches!(
            err,
            SqlPipeError::GroupCountMismatch { expected: 2, found: 1 }
        ));
    }
}
