use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::OpenFlags;
use sqlpipe_core::connection::{Connection, RowSet};
use sqlpipe_core::dialect::Dialect;
use sqlpipe_core::errors::Result;
use tracing::debug;

use crate::convert::convert_row;
use crate::errors::SqliteError;

/// Synchronous sqlite connection.
pub struct SqliteConnection {
    path: Option<PathBuf>,
    inner: rusqlite::Connection,
    dialect: Dialect,
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "SqliteConnection({})", path.to_string_lossy()),
            None => write!(f, "SqliteConnection(:memory:)"),
        }
    }
}

impl SqliteConnection {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = rusqlite::Connection::open(&path).map_err(SqliteError::from)?;
        Ok(Self::from_parts(Some(path), inner))
    }

    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = rusqlite::Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(SqliteError::from)?;
        Ok(Self::from_parts(Some(path), inner))
    }

    pub fn open_in_memory() -> Result<Self> {
        let inner = rusqlite::Connection::open_in_memory().map_err(SqliteError::from)?;
        Ok(Self::from_parts(None, inner))
    }

    fn from_parts(path: Option<PathBuf>, inner: rusqlite::Connection) -> Self {
        SqliteConnection {
            path,
            inner,
            dialect: Dialect::SQLITE,
        }
    }

    /// Render queries for a different dialect. Mostly useful for checking
    /// emulated window functions against sqlite's native ones.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn without_window_functions(self) -> Self {
        let dialect = self.dialect.without_window_functions();
        self.with_dialect(dialect)
    }

    /// Run one or more statements, discarding any results.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.inner.execute_batch(sql).map_err(SqliteError::from)?;
        Ok(())
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn fetch_paged(
        &self,
        sql: &str,
        page_size: usize,
        on_page: &mut dyn FnMut(RowSet) -> Result<()>,
    ) -> Result<()> {
        debug!(%sql, page_size, "fetching paged");
        let page_size = page_size.max(1);

        let mut stmt = self.inner.prepare(sql).map_err(SqliteError::from)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([]).map_err(SqliteError::from)?;

        let mut page = Vec::with_capacity(page_size);
        while let Some(row) = rows.next().map_err(SqliteError::from)? {
            page.push(convert_row(row, &columns)?);
            if page.len() == page_size {
                // Next rows are not stepped until the page has been handled.
                on_page(RowSet::with_rows(columns.clone(), std::mem::take(&mut page)))?;
            }
        }
        if !page.is_empty() {
            on_page(RowSet::with_rows(columns, page))?;
        }

        Ok(())
    }

    fn execute(&self, sql: &str) -> Result<RowSet> {
        debug!(%sql, "executing");
        let mut stmt = self.inner.prepare(sql).map_err(SqliteError::from)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut out = RowSet::new(columns);
        let mut rows = stmt.query([]).map_err(SqliteError::from)?;
        while let Some(row) = rows.next().map_err(SqliteError::from)? {
            out.rows.push(convert_row(row, &out.columns)?);
        }

        Ok(out)
    }
}
