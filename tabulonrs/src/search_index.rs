//! Search-result ordinal resolution.
//!
//! Matched records are indexed either within the matched-only result set
//! (`hide_not_matched`) or by their absolute position in the full
//! filtered/sorted/grouped view, resolved through a window row-number query
//! that runs on the same store snapshot as the match query.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, TabulonError};
use crate::executor::{row_i64, row_string, RawRow, SqlSnapshot};
use crate::fields::{
    index_fields, searchable_fields, FieldMap, FieldOrder, Search, View, MATCHED_FIELD_ALIAS,
    RECORD_ID_COLUMN, ROW_NUMBER_ALIAS,
};
use crate::filter::Filter;
use crate::providers::{ProviderSet, ScopedSource, WrapViewOptions};
use crate::sql_ast::{RenderedQuery, SelectQuery};
use crate::validation;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchIndexRequest {
    pub view_id: Option<String>,
    pub search: Search,
    pub filter: Option<Filter>,
    pub order_by: Option<Vec<FieldOrder>>,
    pub group_by: Option<Vec<FieldOrder>>,
    pub skip: Option<u64>,
    pub take: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchIndexItem {
    pub index: i64,
    pub field_id: String,
    pub record_id: String,
}

pub struct SearchIndexService {
    providers: ProviderSet,
    config: EngineConfig,
}

impl SearchIndexService {
    pub fn new(providers: ProviderSet, config: EngineConfig) -> Self {
        Self { providers, config }
    }

    /// Resolves the ordinal position of every search match, or `None` when
    /// nothing matches.
    ///
    /// With `hide_not_matched`, matched rows are the only visible rows and
    /// `index` counts distinct matched records starting at `skip + 1`.
    /// Otherwise `index` is the record's 1-based window row number within
    /// the full view; both queries of that path observe one store snapshot.
    pub async fn search_index(
        &self,
        table_id: &str,
        request: &SearchIndexRequest,
    ) -> Result<Option<Vec<SearchIndexItem>>> {
        validation::ensure_table_id(table_id)?;
        validation::ensure_search_take(request.take, self.config.max_search_take)?;
        validation::ensure_search_term(&request.search.query)?;
        let started = Instant::now();

        let view = self.load_view(table_id, request.view_id.as_deref()).await?;
        let fields = self.providers.fields.get_fields(table_id, None).await?;
        let field_map = index_fields(&fields);
        let filter = Filter::merge(
            view.as_ref().and_then(|v| v.filter.clone()),
            request.filter.clone(),
        );
        let order_by = request
            .order_by
            .clone()
            .or_else(|| view.as_ref().and_then(|v| v.sort.clone()));
        let group_by = request
            .group_by
            .clone()
            .or_else(|| view.as_ref().and_then(|v| v.group_by.clone()));
        let scoped = self
            .providers
            .permissions
            .wrap_view(
                table_id,
                WrapViewOptions {
                    view_id: request.view_id.clone(),
                    keep_primary_key: true,
                },
            )
            .await?;
        let search_fields =
            searchable_fields(&fields, &request.search, scoped.allowed_field_ids.as_deref());
        if search_fields.is_empty() {
            return Ok(None);
        }
        let skip = request.skip.unwrap_or(0);

        let base = self.build_view_query(
            &scoped,
            filter.as_ref(),
            group_by.as_deref(),
            order_by.as_deref(),
            &field_map,
        )?;
        let match_query = self.providers.db.search_index_query(
            base.clone(),
            &request.search.query,
            &search_fields,
            skip,
            request.take,
        )?;

        let result = if request.search.hide_not_matched {
            self.matched_only_index(&match_query, skip).await?
        } else {
            self.absolute_index(&match_query, base).await?
        };
        tracing::debug!(
            table = table_id,
            matches = result.as_ref().map_or(0, Vec::len),
            ms = started.elapsed().as_millis() as u64,
            "search index"
        );
        Ok(result)
    }

    /// Zero-based position of one record in the view, `None` when the
    /// record is filtered out of it.
    pub async fn record_index(
        &self,
        table_id: &str,
        view_id: Option<&str>,
        record_id: &str,
    ) -> Result<Option<i64>> {
        validation::ensure_table_id(table_id)?;
        let view = self.load_view(table_id, view_id).await?;
        let fields = self.providers.fields.get_fields(table_id, None).await?;
        let field_map = index_fields(&fields);
        let filter = view.as_ref().and_then(|v| v.filter.clone());
        let order_by = view.as_ref().and_then(|v| v.sort.clone());
        let group_by = view.as_ref().and_then(|v| v.group_by.clone());
        let scoped = self
            .providers
            .permissions
            .wrap_view(
                table_id,
                WrapViewOptions {
                    view_id: view_id.map(str::to_string),
                    keep_primary_key: true,
                },
            )
            .await?;

        let view_query = self.build_view_query(
            &scoped,
            filter.as_ref(),
            group_by.as_deref(),
            order_by.as_deref(),
            &field_map,
        )?;
        let ids = [record_id.to_string()];
        let query = self.providers.db.record_index_query(view_query, &ids)?;
        let rows = self.providers.executor.execute_raw(&query).await?;
        Ok(rows
            .first()
            .and_then(|row| row_i64(row, ROW_NUMBER_ALIAS))
            .map(|row_number| row_number - 1))
    }

    async fn matched_only_index(
        &self,
        match_query: &RenderedQuery,
        skip: u64,
    ) -> Result<Option<Vec<SearchIndexItem>>> {
        let rows = self.providers.executor.execute_raw(match_query).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let mut seen: HashSet<String> = HashSet::new();
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let (record_id, field_id) = match_columns(row)?;
            seen.insert(record_id.clone());
            items.push(SearchIndexItem {
                index: skip as i64 + seen.len() as i64,
                field_id,
                record_id,
            });
        }
        Ok(Some(items))
    }

    /// The match query and the row-number query must observe the table at
    /// one consistent point; a store lock/serialization failure inside the
    /// snapshot is reported as a timeout and never retried here.
    async fn absolute_index(
        &self,
        match_query: &RenderedQuery,
        view_query: SelectQuery,
    ) -> Result<Option<Vec<SearchIndexItem>>> {
        let mut snapshot = self.providers.executor.begin_snapshot().await?;
        match self
            .absolute_index_in(&mut snapshot, match_query, view_query)
            .await
        {
            Ok(items) => match snapshot.commit().await {
                Ok(()) => Ok(items),
                Err(error) => Err(timeout_translation(error)),
            },
            Err(error) => {
                let _ = snapshot.rollback().await;
                Err(timeout_translation(error))
            }
        }
    }

    async fn absolute_index_in(
        &self,
        snapshot: &mut Box<dyn SqlSnapshot>,
        match_query: &RenderedQuery,
        view_query: SelectQuery,
    ) -> Result<Option<Vec<SearchIndexItem>>> {
        let matches = snapshot.execute_raw(match_query).await?;
        if matches.is_empty() {
            return Ok(None);
        }
        let mut distinct_ids = Vec::new();
        let mut seen = HashSet::new();
        for row in &matches {
            let (record_id, _) = match_columns(row)?;
            if seen.insert(record_id.clone()) {
                distinct_ids.push(record_id);
            }
        }
        let index_query = self
            .providers
            .db
            .record_index_query(view_query, &distinct_ids)?;
        let rows = snapshot.execute_raw(&index_query).await?;
        let mut row_numbers: HashMap<String, i64> = HashMap::with_capacity(rows.len());
        for row in &rows {
            if let (Some(id), Some(number)) = (
                row_string(row, RECORD_ID_COLUMN),
                row_i64(row, ROW_NUMBER_ALIAS),
            ) {
                row_numbers.insert(id, number);
            }
        }
        let items = matches
            .iter()
            .map(|row| {
                let (record_id, field_id) = match_columns(row)?;
                // Every matched id must resolve to a row number within the
                // same snapshot; a miss is an internal invariant break.
                let index = row_numbers.get(&record_id).copied().ok_or_else(|| {
                    TabulonError::NotFound(format!("record {record_id} not found in view"))
                })?;
                Ok(SearchIndexItem {
                    index,
                    field_id,
                    record_id,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(items))
    }

    fn build_view_query(
        &self,
        scoped: &ScopedSource,
        filter: Option<&Filter>,
        group_by: Option<&[FieldOrder]>,
        order_by: Option<&[FieldOrder]>,
        field_map: &FieldMap,
    ) -> Result<SelectQuery> {
        let db = &self.providers.db;
        let mut query = SelectQuery {
            from: scoped.table_ref(),
            ..Default::default()
        };
        if let Some(filter) = filter {
            query = db.filter_query(query, filter, field_map)?;
        }
        // Group columns lead the view ordering; the explicit sort breaks
        // ties within each group.
        let mut order: Vec<FieldOrder> = Vec::new();
        if let Some(group_by) = group_by {
            order.extend(group_by.iter().cloned());
        }
        if let Some(order_by) = order_by {
            order.extend(order_by.iter().cloned());
        }
        if !order.is_empty() {
            query = db.sort_query(query, &order, field_map)?;
        }
        Ok(query)
    }

    async fn load_view(&self, table_id: &str, view_id: Option<&str>) -> Result<Option<View>> {
        match view_id {
            Some(view_id) => self.providers.views.get_view(table_id, view_id).await,
            None => Ok(None),
        }
    }
}

fn match_columns(row: &RawRow) -> Result<(String, String)> {
    let record_id = row_string(row, RECORD_ID_COLUMN)
        .ok_or_else(|| TabulonError::Execution("search match row is missing __id".to_string()))?;
    let field_id = row_string(row, MATCHED_FIELD_ALIAS).unwrap_or_default();
    Ok((record_id, field_id))
}

fn timeout_translation(error: TabulonError) -> TabulonError {
    match error {
        TabulonError::LockContention(message) => {
            TabulonError::Timeout(format!("search index query timed out: {message}"))
        }
        other => other,
    }
}
