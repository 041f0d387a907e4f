//! Async access to the legacy Firebird ERP database.
//!
//! The ERP runs on Firebird and only speaks its own wire protocol. This crate
//! keeps the blocking client off the Tokio runtime: every query runs on the
//! blocking thread pool against a connection checked out from a bounded
//! [`Pool`]. Results come back as dynamically typed [`Row`]s which callers
//! map into their own typed records.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Bounded connection pool over a pluggable [`Connector`].
pub mod pool;
/// Dynamically typed column values and rows.
pub mod value;
/// Connector for a real Firebird server (pure-Rust wire client).
pub mod native;

pub use native::{Charset, ConnectOptions, FirebirdConnector};
pub use pool::{Connector, Pool, PoolError};
pub use value::{Row, RowError, Value};
