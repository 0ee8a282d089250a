//! Store execution backends.
//!
//! Each backend is implemented in its own file and gated behind a feature
//! flag. SQLite deployments supply their own `SqlExecutor`; only the query
//! fragments for that dialect ship here.

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PostgresExecutor;
