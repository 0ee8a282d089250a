//! Raw SQL execution boundary.
//!
//! Executors run `RenderedQuery` values against a store and hand rows back
//! as JSON objects keyed by column name. Everything a query needs is bound
//! through the query's parameter vector.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::sql_ast::RenderedQuery;

pub type RawRow = Map<String, Value>;

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute_raw(&self, query: &RenderedQuery) -> Result<Vec<RawRow>>;

    /// Starts a transaction pinned to a single consistent snapshot of the
    /// store. Executors must surface serialization/lock-timeout class
    /// failures inside the snapshot as `TabulonError::LockContention`.
    async fn begin_snapshot(&self) -> Result<Box<dyn SqlSnapshot>>;
}

#[async_trait]
pub trait SqlSnapshot: Send + Sync {
    async fn execute_raw(&mut self, query: &RenderedQuery) -> Result<Vec<RawRow>>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
}

/// Integer cell access tolerant of numeric and stringly-typed store drivers.
pub fn row_i64(row: &RawRow, key: &str) -> Option<i64> {
    match row.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn row_string(row: &RawRow, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
