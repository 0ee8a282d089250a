//! Aggregate query planning, grouped-aggregation merging, and row counting.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::{Result, TabulonError};
use crate::executor::{row_i64, RawRow};
use crate::fields::{
    index_fields, searchable_fields, Field, FieldMap, FieldOrder, Search, StatisticFunc, View,
    RECORD_ID_COLUMN,
};
use crate::filter::Filter;
use crate::grouping::group_id;
use crate::projection::resolve_projection;
use crate::providers::{ProviderSet, ScopedSource, WrapViewOptions};
use crate::sql_ast::{col, SelectItem, SelectQuery, SqlExpr, SqlRenderer};
use crate::statistics::{
    convert_aggregation_value, resolve_statistic_fields, CustomFieldStats, StatisticField,
    ROW_WILDCARD,
};
use crate::validation;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AggregationQuery {
    pub view_id: Option<String>,
    pub filter: Option<Filter>,
    pub group_by: Option<Vec<FieldOrder>>,
    pub search: Option<Search>,
    pub field_stats: Option<Vec<CustomFieldStats>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowCountQuery {
    pub view_id: Option<String>,
    pub filter: Option<Filter>,
    pub search: Option<Search>,
    pub restriction: Option<RecordIdRestriction>,
}

/// Record-id restriction for link-field counting: candidates are outside
/// the selected set, selected records inside it. Never both at once.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordIdRestriction {
    Within(Vec<String>),
    Without(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationValue {
    pub value: Value,
    pub statistic_func: StatisticFunc,
}

/// Aggregates for one `(field, function)` pair: the ungrouped total plus,
/// when grouping is active, one value per group keyed by group id.
#[derive(Debug, Clone, Serialize)]
pub struct FieldAggregation {
    pub field_id: String,
    pub total: AggregationValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<BTreeMap<String, AggregationValue>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregationResult {
    pub aggregations: Vec<FieldAggregation>,
}

pub struct AggregationService {
    providers: ProviderSet,
    config: EngineConfig,
}

impl AggregationService {
    pub fn new(providers: ProviderSet, config: EngineConfig) -> Self {
        Self { providers, config }
    }

    pub async fn aggregate(
        &self,
        table_id: &str,
        query: &AggregationQuery,
    ) -> Result<AggregationResult> {
        validation::ensure_table_id(table_id)?;
        let started = Instant::now();

        let view = self.load_view(table_id, query.view_id.as_deref()).await?;
        let fields = self.providers.fields.get_fields(table_id, None).await?;
        let field_map = index_fields(&fields);
        let statistic_fields =
            resolve_statistic_fields(view.as_ref(), query.field_stats.as_deref(), &field_map)?;
        if statistic_fields.is_empty() {
            return Ok(AggregationResult::default());
        }

        let filter = Filter::merge(
            view.as_ref().and_then(|v| v.filter.clone()),
            query.filter.clone(),
        );
        let group_by = query
            .group_by
            .clone()
            .or_else(|| view.as_ref().and_then(|v| v.group_by.clone()));
        let scoped = self
            .providers
            .permissions
            .wrap_view(
                table_id,
                WrapViewOptions {
                    view_id: query.view_id.clone(),
                    keep_primary_key: false,
                },
            )
            .await?;

        let search_scope = query.search.as_ref().and_then(|s| s.field_ids.clone());
        let projection = resolve_projection(
            Some(statistic_fields.as_slice()),
            group_by.as_deref(),
            filter.as_ref(),
            search_scope.as_deref(),
            scoped.allowed_field_ids.as_deref(),
        );
        // Statistic fields outside the projection were permission-narrowed
        // away.
        let statistic_fields: Vec<StatisticField> = statistic_fields
            .into_iter()
            .filter(|stat| {
                stat.field_id == ROW_WILDCARD
                    || projection
                        .as_deref()
                        .map_or(true, |p| p.contains(&stat.field_id))
            })
            .collect();
        if statistic_fields.is_empty() {
            return Ok(AggregationResult::default());
        }
        let search_fields = match &query.search {
            Some(search) => searchable_fields(&fields, search, projection.as_deref()),
            None => Vec::new(),
        };

        let rows = self
            .run_level(
                &scoped,
                filter.as_ref(),
                query.search.as_ref(),
                &search_fields,
                &statistic_fields,
                &[],
                &field_map,
            )
            .await?;
        let total_row = rows.first();
        let mut aggregations: Vec<FieldAggregation> = statistic_fields
            .iter()
            .map(|stat| FieldAggregation {
                field_id: stat.field_id.clone(),
                total: AggregationValue {
                    value: convert_aggregation_value(
                        total_row.and_then(|row| row.get(&stat.alias)),
                        stat.statistic_func,
                    ),
                    statistic_func: stat.statistic_func,
                },
                group: None,
            })
            .collect();

        if let Some(group_by) = group_by.as_deref().filter(|g| !g.is_empty()) {
            self.merge_grouped(
                &mut aggregations,
                &statistic_fields,
                group_by,
                &scoped,
                filter.as_ref(),
                query.search.as_ref(),
                &search_fields,
                &field_map,
            )
            .await?;
        }

        tracing::debug!(
            table = table_id,
            stats = aggregations.len(),
            ms = started.elapsed().as_millis() as u64,
            "aggregate"
        );
        Ok(AggregationResult { aggregations })
    }

    /// Re-runs the planner once per group-by nesting level and folds every
    /// returned row into the per-field group maps. Levels are independent
    /// reads and the merge is keyed by group id, not arrival order.
    #[allow(clippy::too_many_arguments)]
    async fn merge_grouped(
        &self,
        aggregations: &mut [FieldAggregation],
        statistic_fields: &[StatisticField],
        group_by: &[FieldOrder],
        scoped: &ScopedSource,
        filter: Option<&Filter>,
        search: Option<&Search>,
        search_fields: &[Field],
        field_map: &FieldMap,
    ) -> Result<()> {
        let namespace = &group_by[0].field_id;
        for level in 0..group_by.len() {
            let slice = &group_by[..=level];
            let rows = self
                .run_level(
                    scoped,
                    filter,
                    search,
                    search_fields,
                    statistic_fields,
                    slice,
                    field_map,
                )
                .await?;
            let group_columns = slice
                .iter()
                .map(|item| {
                    field_map.get(&item.field_id).ok_or_else(|| {
                        TabulonError::Validation(format!(
                            "group field {} not found in table",
                            item.field_id
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            for row in &rows {
                let values: Vec<&Value> = group_columns
                    .iter()
                    .map(|field| row.get(&field.db_field_name).unwrap_or(&Value::Null))
                    .collect();
                let id = group_id(namespace, &values);
                for (stat, aggregation) in statistic_fields.iter().zip(aggregations.iter_mut()) {
                    let value = convert_aggregation_value(row.get(&stat.alias), stat.statistic_func);
                    aggregation.group.get_or_insert_with(BTreeMap::new).insert(
                        id.clone(),
                        AggregationValue {
                            value,
                            statistic_func: stat.statistic_func,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// One aggregate SELECT: group columns projected first, one aggregate
    /// expression per statistic field under its unique alias.
    #[allow(clippy::too_many_arguments)]
    async fn run_level(
        &self,
        scoped: &ScopedSource,
        filter: Option<&Filter>,
        search: Option<&Search>,
        search_fields: &[Field],
        statistic_fields: &[StatisticField],
        group_slice: &[FieldOrder],
        field_map: &FieldMap,
    ) -> Result<Vec<RawRow>> {
        let db = &self.providers.db;
        let mut query = SelectQuery {
            from: scoped.table_ref(),
            ..Default::default()
        };
        if let Some(filter) = filter {
            query = db.filter_query(query, filter, field_map)?;
        }
        if let Some(search) = search {
            if search.hide_not_matched && !search_fields.is_empty() {
                query = db.search_query(query, &search.query, search_fields)?;
            }
        }
        for item in group_slice {
            let field = field_map.get(&item.field_id).ok_or_else(|| {
                TabulonError::Validation(format!(
                    "group field {} not found in table",
                    item.field_id
                ))
            })?;
            let expr = col(&field.db_field_name);
            query.group_by.push(expr.clone());
            query.select.push(SelectItem {
                expr,
                alias: Some(field.db_field_name.clone()),
            });
        }
        for stat in statistic_fields {
            let target = if stat.field_id == ROW_WILDCARD {
                SqlExpr::Star
            } else {
                let field = field_map.get(&stat.field_id).ok_or_else(|| {
                    TabulonError::Validation(format!(
                        "statistic field {} not found in table",
                        stat.field_id
                    ))
                })?;
                col(&field.db_field_name)
            };
            query.select.push(SelectItem {
                expr: SqlExpr::Aggregate {
                    func: stat.statistic_func,
                    expr: Box::new(target),
                },
                alias: Some(stat.alias.clone()),
            });
        }
        if !group_slice.is_empty() {
            query.limit = Some(self.config.max_group_points as u64);
        }
        let rendered = SqlRenderer::new(db.dialect()).render_select(&query)?;
        let rows = self.providers.executor.execute_raw(&rendered).await?;
        tracing::debug!(
            depth = group_slice.len(),
            rows = rows.len(),
            "aggregate level"
        );
        Ok(rows)
    }

    /// Counts the view's rows, optionally restricted to (or away from) a
    /// record-id set. An empty result is `0`, never null.
    pub async fn record_count(&self, table_id: &str, query: &RowCountQuery) -> Result<i64> {
        validation::ensure_table_id(table_id)?;
        // A "must be within" restriction over an empty set can match
        // nothing; skip the round-trip.
        if let Some(RecordIdRestriction::Within(ids)) = &query.restriction {
            if ids.is_empty() {
                return Ok(0);
            }
        }

        let view = self.load_view(table_id, query.view_id.as_deref()).await?;
        let fields = self.providers.fields.get_fields(table_id, None).await?;
        let field_map = index_fields(&fields);
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
        let mut count_query = SelectQuery {
            from: scoped.table_ref(),
            ..Default::default()
        };
        if let Some(filter) = &filter {
            count_query = db.filter_query(count_query, filter, &field_map)?;
        }
        if let Some(search) = &query.search {
            let search_fields =
                searchable_fields(&fields, search, scoped.allowed_field_ids.as_deref());
            if !search_fields.is_empty() {
                count_query = db.search_count_query(count_query, &search.query, &search_fields)?;
            }
        }
        match &query.restriction {
            Some(RecordIdRestriction::Within(ids)) => {
                count_query.filters.push(record_id_restriction(ids, false));
            }
            Some(RecordIdRestriction::Without(ids)) if !ids.is_empty() => {
                count_query.filters.push(record_id_restriction(ids, true));
            }
            _ => {}
        }
        count_query.select.push(SelectItem {
            expr: SqlExpr::Aggregate {
                func: StatisticFunc::Count,
                expr: Box::new(SqlExpr::Star),
            },
            alias: Some("count".to_string()),
        });

        let rendered = SqlRenderer::new(db.dialect()).render_select(&count_query)?;
        let rows = self.providers.executor.execute_raw(&rendered).await?;
        let count = rows.first().and_then(|row| row_i64(row, "count")).unwrap_or(0);
        tracing::debug!(table = table_id, count, "record count");
        Ok(count)
    }

    async fn load_view(&self, table_id: &str, view_id: Option<&str>) -> Result<Option<View>> {
        match view_id {
            Some(view_id) => self.providers.views.get_view(table_id, view_id).await,
            None => Ok(None),
        }
    }
}

fn record_id_restriction(record_ids: &[String], negated: bool) -> SqlExpr {
    SqlExpr::InList {
        expr: Box::new(col(RECORD_ID_COLUMN)),
        list: record_ids
            .iter()
            .map(|id| SqlExpr::Literal(Value::String(id.clone())))
            .collect(),
        negated,
    }
}
