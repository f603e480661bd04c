//! Lazy relational queries over SQL databases.
//!
//! Queries are built up from relational operations, compiled into a single
//! SELECT for a target dialect, and optionally traversed group by group in
//! bounded pages.

pub mod chunk;
pub mod compile;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod errors;
pub mod escape;
pub mod expr;
pub mod ident;
pub mod relational;
pub mod scalar;

#[cfg(test)]
mod testutil;
