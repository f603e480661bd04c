use sqlpipe_core::errors::SqlPipeError;

#[derive(Debug, thiserror::Error)]
pub enum SqliteError {
    #[error("Unsupported blob value in column {0}")]
    UnsupportedBlob(String),

    #[error("Invalid utf-8 text in column {0}")]
    InvalidText(String),

    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),
}

pub type Result<T, E = SqliteError> = std::result::Result<T, E>;

impl From<SqliteError> for SqlPipeError {
    fn from(err: SqliteError) -> Self {
        SqlPipeError::connection(err)
    }
}
