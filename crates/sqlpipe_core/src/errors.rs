use crate::scalar::ScalarValue;

/// Boxed error produced outside of this crate (connections, client
/// computations).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum SqlPipeError {
    #[error("Identifier '{name}' contains the closing quote '{quote}' and {dialect} has no escape for it")]
    InvalidIdentifier {
        name: String,
        quote: char,
        dialect: &'static str,
    },

    #[error("Unknown function '{name}' with {arity} argument(s)")]
    UnknownFunction { name: String, arity: usize },

    #[error("Function '{name}' expects {expected} argument(s), got {got}")]
    ArityError {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("Window function '{name}' is not allowed here")]
    WindowNotAllowedHere { name: String },

    #[error("Window function '{name}' cannot be emulated on {dialect}")]
    UnsupportedWindowEmulation { name: String, dialect: &'static str },

    #[error("Invalid argument for '{function}': {reason}")]
    InvalidArgument { function: String, reason: String },

    #[error("Unknown column '{name}', available: {available:?}")]
    UnknownColumn { name: String, available: Vec<String> },

    #[error("Computations must be either all named or all unnamed: {names:?}")]
    MixedArgumentNaming { names: Vec<Option<String>> },

    #[error("Invalid computations: {0}")]
    InvalidComputations(String),

    #[error("Computation results have a non-uniform shape: {0}")]
    NonUniformResultShape(String),

    #[error("Rows are not ordered by group keys, key {key} appeared after its group was finalized")]
    GroupOrderingViolation { key: String },

    #[error("Expected {expected} group(s) from the label table, traversal found {found}")]
    GroupCountMismatch { expected: usize, found: usize },

    #[error("Traversal cancelled before group {group}")]
    Cancelled { group: usize },

    #[error("Computation '{name}' failed on group {group}: {source}")]
    Computation {
        name: String,
        group: usize,
        #[source]
        source: BoxError,
    },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error(transparent)]
    Connection(BoxError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Fmt(#[from] std::fmt::Error),
}

impl SqlPipeError {
    /// Wrap an error coming from a connection implementation.
    pub fn connection(err: impl Into<BoxError>) -> Self {
        SqlPipeError::Connection(err.into())
    }

    pub(crate) fn ordering_violation(key: &[ScalarValue]) -> Self {
        let key = key
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        SqlPipeError::GroupOrderingViolation {
            key: format!("({key})"),
        }
    }
}

pub type Result<T, E = SqlPipeError> = std::result::Result<T, E>;
