//! Capability required from a backend connection.

use std::fmt;

use crate::dialect::Dialect;
use crate::errors::Result;
use crate::escape::quote_identifier;
use crate::scalar::ScalarValue;

/// Rows with named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ScalarValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        RowSet {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<ScalarValue>>) -> Self {
        RowSet { columns, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of a single column.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &ScalarValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }
}

impl fmt::Display for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join("\t"))?;
        for row in &self.rows {
            let row = row.iter().map(|v| v.to_string()).collect::<Vec<_>>();
            writeln!(f, "{}", row.join("\t"))?;
        }
        Ok(())
    }
}

/// A connection able to run rendered SQL.
///
/// Fetching is synchronous. Pages are delivered in order and the next page is
/// not requested until `on_page` for the previous one has returned.
pub trait Connection {
    fn dialect(&self) -> &Dialect;

    fn quote_identifier(&self, name: &str) -> Result<String> {
        quote_identifier(name, self.dialect())
    }

    /// Run `sql`, calling `on_page` with successive pages of at most
    /// `page_size` rows until the result is exhausted.
    ///
    /// An error returned from `on_page` stops fetching and is returned as is.
    fn fetch_paged(
        &self,
        sql: &str,
        page_size: usize,
        on_page: &mut dyn FnMut(RowSet) -> Result<()>,
    ) -> Result<()>;

    /// Run `sql` and collect all rows.
    fn execute(&self, sql: &str) -> Result<RowSet>;
}
