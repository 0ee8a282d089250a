//! Collaborator contracts the query services are built against.
//!
//! Metadata, permissions, and record hydration live outside this crate; the
//! services receive them as trait objects bundled into a `ProviderSet` at
//! construction time.

use std::sync::Arc;

use async_trait::async_trait;

use crate::db_provider::DbProvider;
use crate::error::Result;
use crate::executor::{RawRow, SqlExecutor};
use crate::fields::{Field, Table, View};
use crate::sql_ast::{SelectQuery, TableRef};

#[async_trait]
pub trait FieldProvider: Send + Sync {
    /// All fields of the table, or the named subset.
    async fn get_fields(&self, table_id: &str, field_ids: Option<&[String]>) -> Result<Vec<Field>>;
}

#[async_trait]
pub trait ViewProvider: Send + Sync {
    async fn get_view(&self, table_id: &str, view_id: &str) -> Result<Option<View>>;
}

#[derive(Debug, Clone, Default)]
pub struct WrapViewOptions {
    pub view_id: Option<String>,
    /// Keep the record-id column visible even when the permission layer
    /// narrows the column set.
    pub keep_primary_key: bool,
}

/// What a query may select from after permission narrowing: either the
/// physical table or a permission-wrapping query expression, plus the field
/// ids that expression still exposes.
#[derive(Debug, Clone)]
pub struct ScopedSource {
    pub source: SourceRef,
    pub allowed_field_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub enum SourceRef {
    Table(Table),
    Query(Box<SelectQuery>),
}

impl ScopedSource {
    pub fn table_ref(&self) -> TableRef {
        match &self.source {
            SourceRef::Table(table) => TableRef::table(table.db_table_name.clone()),
            SourceRef::Query(query) => TableRef::subquery((**query).clone(), "src"),
        }
    }
}

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn wrap_view(&self, table_id: &str, options: WrapViewOptions) -> Result<ScopedSource>;
}

#[async_trait]
pub trait RecordProvider: Send + Sync {
    async fn get_records_by_id(&self, table_id: &str, record_ids: &[String])
        -> Result<Vec<RawRow>>;
}

/// The collaborator bundle services are constructed from. Plain explicit
/// injection; no registry.
#[derive(Clone)]
pub struct ProviderSet {
    pub fields: Arc<dyn FieldProvider>,
    pub views: Arc<dyn ViewProvider>,
    pub permissions: Arc<dyn PermissionProvider>,
    pub records: Arc<dyn RecordProvider>,
    pub db: Arc<dyn DbProvider>,
    pub executor: Arc<dyn SqlExecutor>,
}
