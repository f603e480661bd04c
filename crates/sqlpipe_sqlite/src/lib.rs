//! SQLite backed connection.

pub mod convert;
pub mod errors;
pub mod wrapper;

pub use self::wrapper::SqliteConnection;
