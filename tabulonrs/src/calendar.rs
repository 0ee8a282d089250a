//! Calendar day-bucketing.
//!
//! Records whose `[start, end]` interval overlaps the query window are
//! bucketed into per-day counts, and the matching records are hydrated
//! through the record provider.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db_provider::DateWindow;
use crate::error::{Result, TabulonError};
use crate::executor::{row_i64, RawRow};
use crate::fields::{index_fields, searchable_fields, Search, View};
use crate::filter::Filter;
use crate::providers::{ProviderSet, WrapViewOptions};
use crate::sql_ast::SelectQuery;
use crate::validation;

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarQuery {
    pub view_id: Option<String>,
    pub start_field_id: String,
    pub end_field_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub filter: Option<Filter>,
    pub search: Option<Search>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CalendarDailyCollection {
    /// `"YYYY-MM-DD"` to the number of records overlapping that day.
    pub count_map: BTreeMap<String, i64>,
    pub records: Vec<RawRow>,
}

pub struct CalendarService {
    providers: ProviderSet,
}

impl CalendarService {
    pub fn new(providers: ProviderSet) -> Self {
        Self { providers }
    }

    pub async fn daily_collection(
        &self,
        table_id: &str,
        query: &CalendarQuery,
    ) -> Result<CalendarDailyCollection> {
        validation::ensure_table_id(table_id)?;
        let started = Instant::now();

        let view = self.load_view(table_id, query.view_id.as_deref()).await?;
        let fields = self.providers.fields.get_fields(table_id, None).await?;
        let field_map = index_fields(&fields);
        let start_field = validation::ensure_calendar_field(&field_map, &query.start_field_id, "start")?;
        let end_field = validation::ensure_calendar_field(&field_map, &query.end_field_id, "end")?;
        if query.end_date < query.start_date {
            return Err(TabulonError::Validation(
                "calendar window end date precedes its start date".to_string(),
            ));
        }

        let filter = Filter::merge(
            view.as_ref().and_then(|v| v.filter.clone()),
            query.filter.clone(),
        );
        let scoped = self
            .providers
            .permissions
            .wrap_view(
                table_id,
                WrapViewOptions {
                    view_id: query.view_id.clone(),
                    keep_primary_key: true,
                },
            )
            .await?;

        let db = &self.providers.db;
        let mut base = SelectQuery {
            from: scoped.table_ref(),
            ..Default::default()
        };
        if let Some(filter) = &filter {
            base = db.filter_query(base, filter, &field_map)?;
        }
        if let Some(search) = &query.search {
            let search_fields =
                searchable_fields(&fields, search, scoped.allowed_field_ids.as_deref());
            if !search_fields.is_empty() {
                base = db.search_query(base, &search.query, &search_fields)?;
            }
        }
        let window = DateWindow {
            start: query.start_date,
            end: query.end_date,
        };
        let rendered = db.calendar_daily_collection_query(base, &window, start_field, end_field)?;
        let rows = self.providers.executor.execute_raw(&rendered).await?;

        let mut count_map = BTreeMap::new();
        let mut record_ids = Vec::new();
        let mut seen = HashSet::new();
        for row in &rows {
            let date = match row.get("date").and_then(Value::as_str) {
                Some(date) => date.to_string(),
                None => continue,
            };
            count_map.insert(date, row_i64(row, "count").unwrap_or(0));
            for id in normalize_record_ids(row.get("record_ids")) {
                if seen.insert(id.clone()) {
                    record_ids.push(id);
                }
            }
        }
        let records = if record_ids.is_empty() {
            Vec::new()
        } else {
            self.providers
                .records
                .get_records_by_id(table_id, &record_ids)
                .await?
        };
        tracing::debug!(
            table = table_id,
            days = count_map.len(),
            records = records.len(),
            ms = started.elapsed().as_millis() as u64,
            "calendar daily collection"
        );
        Ok(CalendarDailyCollection { count_map, records })
    }

    async fn load_view(&self, table_id: &str, view_id: Option<&str>) -> Result<Option<View>> {
        match view_id {
            Some(view_id) => self.providers.views.get_view(table_id, view_id).await,
            None => Ok(None),
        }
    }
}

/// Per-day id lists arrive as an array or as a delimiter-joined string
/// depending on the store's aggregate.
fn normalize_record_ids(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(joined)) => joined
            .split(',')
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
