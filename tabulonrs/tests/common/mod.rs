//! Shared fixtures: in-memory collaborators and a scripted executor that
//! records every query it is asked to run.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use tabulon::db_provider::PostgresProvider;
use tabulon::error::Result;
use tabulon::executor::{RawRow, SqlExecutor, SqlSnapshot};
use tabulon::fields::{CellValueType, Field, Table, View};
use tabulon::providers::{
    FieldProvider, PermissionProvider, ProviderSet, RecordProvider, ScopedSource, SourceRef,
    ViewProvider, WrapViewOptions,
};
use tabulon::sql_ast::RenderedQuery;
use tabulon::TabulonError;

pub fn field(id: &str, db_field_name: &str, cell_value_type: CellValueType) -> Field {
    Field {
        id: id.to_string(),
        name: id.to_string(),
        db_field_name: db_field_name.to_string(),
        cell_value_type,
        is_multiple_cell_value: false,
    }
}

pub fn text_field(id: &str, db_field_name: &str) -> Field {
    field(id, db_field_name, CellValueType::String)
}

pub fn number_field(id: &str, db_field_name: &str) -> Field {
    field(id, db_field_name, CellValueType::Number)
}

pub fn date_field(id: &str, db_field_name: &str) -> Field {
    field(id, db_field_name, CellValueType::DateTime)
}

pub fn row(entries: &[(&str, Value)]) -> RawRow {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

pub struct StaticFields(pub Vec<Field>);

#[async_trait]
impl FieldProvider for StaticFields {
    async fn get_fields(
        &self,
        _table_id: &str,
        field_ids: Option<&[String]>,
    ) -> Result<Vec<Field>> {
        Ok(match field_ids {
            Some(ids) => self
                .0
                .iter()
                .filter(|f| ids.contains(&f.id))
                .cloned()
                .collect(),
            None => self.0.clone(),
        })
    }
}

pub struct StaticView(pub Option<View>);

#[async_trait]
impl ViewProvider for StaticView {
    async fn get_view(&self, _table_id: &str, _view_id: &str) -> Result<Option<View>> {
        Ok(self.0.clone())
    }
}

pub struct OpenPermissions {
    pub table_name: String,
    pub allowed_field_ids: Option<Vec<String>>,
}

#[async_trait]
impl PermissionProvider for OpenPermissions {
    async fn wrap_view(&self, table_id: &str, _options: WrapViewOptions) -> Result<ScopedSource> {
        Ok(ScopedSource {
            source: SourceRef::Table(Table {
                id: table_id.to_string(),
                db_table_name: self.table_name.clone(),
            }),
            allowed_field_ids: self.allowed_field_ids.clone(),
        })
    }
}

#[derive(Default)]
pub struct RecordingRecords {
    pub requests: Mutex<Vec<Vec<String>>>,
    pub rows: Vec<RawRow>,
}

impl RecordingRecords {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requested_ids(&self, index: usize) -> Vec<String> {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl RecordProvider for RecordingRecords {
    async fn get_records_by_id(
        &self,
        _table_id: &str,
        record_ids: &[String],
    ) -> Result<Vec<RawRow>> {
        self.requests.lock().unwrap().push(record_ids.to_vec());
        Ok(self.rows.clone())
    }
}

/// Returns queued results in order and records every executed query;
/// queries beyond the script return no rows.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    inner: Arc<ExecutorInner>,
}

#[derive(Default)]
struct ExecutorInner {
    results: Mutex<VecDeque<Result<Vec<RawRow>>>>,
    executed: Mutex<Vec<RenderedQuery>>,
    snapshot_queries: Mutex<usize>,
    commits: Mutex<usize>,
    rollbacks: Mutex<usize>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rows(&self, rows: Vec<RawRow>) {
        self.inner.results.lock().unwrap().push_back(Ok(rows));
    }

    pub fn push_error(&self, error: TabulonError) {
        self.inner.results.lock().unwrap().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.inner.executed.lock().unwrap().len()
    }

    pub fn executed(&self, index: usize) -> RenderedQuery {
        self.inner.executed.lock().unwrap()[index].clone()
    }

    pub fn snapshot_query_count(&self) -> usize {
        *self.inner.snapshot_queries.lock().unwrap()
    }

    pub fn commit_count(&self) -> usize {
        *self.inner.commits.lock().unwrap()
    }

    pub fn rollback_count(&self) -> usize {
        *self.inner.rollbacks.lock().unwrap()
    }

    fn run(&self, query: &RenderedQuery) -> Result<Vec<RawRow>> {
        self.inner.executed.lock().unwrap().push(query.clone());
        match self.inner.results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl SqlExecutor for ScriptedExecutor {
    async fn execute_raw(&self, query: &RenderedQuery) -> Result<Vec<RawRow>> {
        self.run(query)
    }

    async fn begin_snapshot(&self) -> Result<Box<dyn SqlSnapshot>> {
        Ok(Box::new(ScriptedSnapshot {
            executor: self.clone(),
        }))
    }
}

pub struct ScriptedSnapshot {
    executor: ScriptedExecutor,
}

#[async_trait]
impl SqlSnapshot for ScriptedSnapshot {
    async fn execute_raw(&mut self, query: &RenderedQuery) -> Result<Vec<RawRow>> {
        *self.executor.inner.snapshot_queries.lock().unwrap() += 1;
        self.executor.run(query)
    }

    async fn commit(&mut self) -> Result<()> {
        *self.executor.inner.commits.lock().unwrap() += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        *self.executor.inner.rollbacks.lock().unwrap() += 1;
        Ok(())
    }
}

pub fn provider_set(
    fields: Vec<Field>,
    view: Option<View>,
    allowed_field_ids: Option<Vec<String>>,
    executor: &ScriptedExecutor,
) -> ProviderSet {
    provider_set_with_records(
        fields,
        view,
        allowed_field_ids,
        executor,
        Arc::new(RecordingRecords::default()),
    )
}

pub fn provider_set_with_records(
    fields: Vec<Field>,
    view: Option<View>,
    allowed_field_ids: Option<Vec<String>>,
    executor: &ScriptedExecutor,
    records: Arc<RecordingRecords>,
) -> ProviderSet {
    ProviderSet {
        fields: Arc::new(StaticFields(fields)),
        views: Arc::new(StaticView(view)),
        permissions: Arc::new(OpenPermissions {
            table_name: "records_raw".to_string(),
            allowed_field_ids,
        }),
        records,
        db: Arc::new(PostgresProvider::new()),
        executor: Arc::new(executor.clone()),
    }
}
