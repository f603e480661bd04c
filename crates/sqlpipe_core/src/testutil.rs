//! Scripted connection for exercising traversal without a database.

use std::cell::{Cell, RefCell};

use crate::connection::{Connection, RowSet};
use crate::dialect::Dialect;
use crate::errors::Result;
use crate::scalar::ScalarValue;

/// Connection returning pre-built labels and pages, recording every call.
#[derive(Debug)]
pub struct ScriptedConnection {
    dialect: Dialect,
    labels: RowSet,
    pages: Vec<RowSet>,
    pub executes: Cell<usize>,
    pub fetches: Cell<usize>,
    pub pages_delivered: Cell<usize>,
    pub statements: RefCell<Vec<String>>,
}

impl ScriptedConnection {
    pub fn new(labels: RowSet, pages: Vec<RowSet>) -> Self {
        ScriptedConnection {
            dialect: Dialect::ANSI,
            labels,
            pages,
            executes: Cell::new(0),
            fetches: Cell::new(0),
            pages_delivered: Cell::new(0),
            statements: RefCell::new(Vec::new()),
        }
    }

    /// Split `rows` into pages of `page_size` rows.
    pub fn paged(
        labels: RowSet,
        columns: &[&str],
        rows: Vec<Vec<ScalarValue>>,
        page_size: usize,
    ) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let pages = rows
            .chunks(page_size)
            .map(|chunk| RowSet::with_rows(columns.clone(), chunk.to_vec()))
            .collect();
        Self::new(labels, pages)
    }

    pub fn calls(&self) -> usize {
        self.executes.get() + self.fetches.get()
    }
}

impl Connection for ScriptedConnection {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn fetch_paged(
        &self,
        sql: &str,
        _page_size: usize,
        on_page: &mut dyn FnMut(RowSet) -> Result<()>,
    ) -> Result<()> {
        self.fetches.set(self.fetches.get() + 1);
        self.statements.borrow_mut().push(sql.to_string());
        for page in &self.pages {
            self.pages_delivered.set(self.pages_delivered.get() + 1);
            on_page(page.clone())?;
        }
        Ok(())
    }

    fn execute(&self, sql: &str) -> Result<RowSet> {
        self.executes.set(self.executes.get() + 1);
        self.statements.borrow_mut().push(sql.to_string());
        Ok(self.labels.clone())
    }
}

/// Label table with a single key column.
pub fn labels(column: &str, keys: &[&str]) -> RowSet {
    RowSet::with_rows(
        vec![column.to_string()],
        keys.iter().map(|k| vec![ScalarValue::from(*k)]).collect(),
    )
}
