use rusqlite::Row;
use rusqlite::types::ValueRef;
use sqlpipe_core::scalar::ScalarValue;

use crate::errors::{Result, SqliteError};

/// Convert a single sqlite value.
///
/// Sqlite has no boolean or timestamp storage class, those come back as
/// integers and text respectively.
pub fn scalar_from_value(value: ValueRef<'_>, column: &str) -> Result<ScalarValue> {
    Ok(match value {
        ValueRef::Null => ScalarValue::Null,
        ValueRef::Integer(i) => ScalarValue::Int64(i),
        ValueRef::Real(r) => ScalarValue::Float64(r),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t)
                .map_err(|_| SqliteError::InvalidText(column.to_string()))?;
            ScalarValue::Utf8(s.to_string())
        }
        ValueRef::Blob(_) => return Err(SqliteError::UnsupportedBlob(column.to_string())),
    })
}

pub fn convert_row(row: &Row<'_>, columns: &[String]) -> Result<Vec<ScalarValue>> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, name)| scalar_from_value(row.get_ref(idx)?, name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_classes() {
        assert_eq!(ScalarValue::Null, scalar_from_value(ValueRef::Null, "a").unwrap());
        assert_eq!(
            ScalarValue::Int64(4),
            scalar_from_value(ValueRef::Integer(4), "a").unwrap()
        );
        assert_eq!(
            ScalarValue::Float64(1.5),
            scalar_from_value(ValueRef::Real(1.5), "a").unwrap()
        );
        assert_eq!(
            ScalarValue::from("abc"),
            scalar_from_value(ValueRef::Text(b"abc"), "a").unwrap()
        );
    }

    #[test]
    fn blob_rejected() {
        let err = scalar_from_value(ValueRef::Blob(&[0, 1]), "data").unwrap_err();
        assert!(matches!(err, SqliteError::UnsupportedBlob(ref c) if c == "data"));
    }
}
