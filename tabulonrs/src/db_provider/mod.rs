//! Dialect-specific query-fragment builders.
//!
//! The query services hand a `SelectQuery` to these builders and get it back
//! augmented with predicate/ordering clauses. The window and calendar
//! queries have no dialect-independent shape, so those builders return a
//! fully rendered query instead. Sources handed to the builders must expose
//! the `__id` and `__auto_number` columns.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::{Result, TabulonError};
use crate::fields::{
    Field, FieldOrder, SortDirection, AUTO_NUMBER_COLUMN, RECORD_ID_COLUMN, ROW_NUMBER_ALIAS,
};
use crate::filter::{Conjunction, Filter, FilterOperator};
use crate::sql_ast::{
    col, qcol, OrderItem, RenderedQuery, SelectItem, SelectQuery, SqlBinaryOperator, SqlExpr,
    SqlRenderer, TableRef,
};

mod postgres;
pub use postgres::PostgresProvider;

mod sqlite;
pub use sqlite::SqliteProvider;

/// Inclusive day window for calendar bucketing.
#[derive(Debug, Clone, Copy)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

pub trait DbProvider: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    /// ANDs the filter tree's predicate into the query.
    fn filter_query(
        &self,
        mut query: SelectQuery,
        filter: &Filter,
        field_map: &HashMap<String, Field>,
    ) -> Result<SelectQuery> {
        query
            .filters
            .push(filter_expr(filter, field_map, self.dialect())?);
        Ok(query)
    }

    fn sort_query(
        &self,
        mut query: SelectQuery,
        sort: &[FieldOrder],
        field_map: &HashMap<String, Field>,
    ) -> Result<SelectQuery> {
        for item in sort {
            let field = field_map.get(&item.field_id).ok_or_else(|| {
                TabulonError::Validation(format!("sort references unknown field {}", item.field_id))
            })?;
            query.order_by.push(OrderItem {
                expr: col(&field.db_field_name),
                direction: item.direction,
            });
        }
        Ok(query)
    }

    /// ANDs the search-match predicate into the query (narrow-results mode).
    fn search_query(
        &self,
        mut query: SelectQuery,
        search_term: &str,
        search_fields: &[Field],
    ) -> Result<SelectQuery> {
        query
            .filters
            .push(search_predicate(self.dialect(), search_term, search_fields));
        Ok(query)
    }

    /// Same predicate, tuned for counting: no ranking information needed.
    fn search_count_query(
        &self,
        query: SelectQuery,
        search_term: &str,
        search_fields: &[Field],
    ) -> Result<SelectQuery> {
        self.search_query(query, search_term, search_fields)
    }

    /// Ranked search-match query over the (filtered, ordered) base:
    /// one `(__id, __field_id)` row per match, in view order, bounded by
    /// `skip`/`take`.
    fn search_index_query(
        &self,
        base: SelectQuery,
        search_term: &str,
        search_fields: &[Field],
        skip: u64,
        take: u64,
    ) -> Result<RenderedQuery>;

    /// Window row-number lookup: wraps the full view query in a
    /// `ROW_NUMBER()` counter and selects `(__id, __row_num)` for exactly
    /// the given record ids.
    fn record_index_query(
        &self,
        view_query: SelectQuery,
        record_ids: &[String],
    ) -> Result<RenderedQuery> {
        if record_ids.is_empty() {
            return Err(TabulonError::Validation(
                "record index lookup requires at least one record id".to_string(),
            ));
        }
        let mut inner = view_query;
        let mut order = std::mem::take(&mut inner.order_by);
        if order.is_empty() {
            order.push(OrderItem {
                expr: col(AUTO_NUMBER_COLUMN),
                direction: SortDirection::Asc,
            });
        }
        inner.select.clear();
        inner.select.push(SelectItem {
            expr: col(RECORD_ID_COLUMN),
            alias: None,
        });
        // Sort columns must survive into the windowed scope; re-select them
        // under stable aliases and order the window by those.
        let mut window_order = Vec::new();
        for (i, item) in order.into_iter().enumerate() {
            let alias = format!("__s{i}");
            window_order.push(OrderItem {
                expr: qcol("t", &alias),
                direction: item.direction,
            });
            inner.select.push(SelectItem {
                expr: item.expr,
                alias: Some(alias),
            });
        }
        let numbered = SelectQuery {
            select: vec![
                SelectItem {
                    expr: qcol("t", RECORD_ID_COLUMN),
                    alias: None,
                },
                SelectItem {
                    expr: SqlExpr::WindowRowNumber {
                        order_by: window_order,
                    },
                    alias: Some(ROW_NUMBER_ALIAS.to_string()),
                },
            ],
            from: TableRef::subquery(inner, "t"),
            ..Default::default()
        };
        let outer = SelectQuery {
            select: vec![
                SelectItem {
                    expr: col(RECORD_ID_COLUMN),
                    alias: None,
                },
                SelectItem {
                    expr: col(ROW_NUMBER_ALIAS),
                    alias: None,
                },
            ],
            from: TableRef::subquery(numbered, "t1"),
            filters: vec![SqlExpr::InList {
                expr: Box::new(col(RECORD_ID_COLUMN)),
                list: record_ids
                    .iter()
                    .map(|id| SqlExpr::Literal(Value::String(id.clone())))
                    .collect(),
                negated: false,
            }],
            ..Default::default()
        };
        SqlRenderer::new(self.dialect()).render_select(&outer)
    }

    /// One row per day the record intervals overlap the window:
    /// `(date, count, record_ids)`, with `record_ids` aggregated per day.
    fn calendar_daily_collection_query(
        &self,
        base: SelectQuery,
        window: &DateWindow,
        start_field: &Field,
        end_field: &Field,
    ) -> Result<RenderedQuery>;
}

pub(crate) fn filter_expr(
    filter: &Filter,
    field_map: &HashMap<String, Field>,
    dialect: &dyn Dialect,
) -> Result<SqlExpr> {
    match filter {
        Filter::Group {
            conjunction,
            children,
        } => {
            let exprs = children
                .iter()
                .map(|child| filter_expr(child, field_map, dialect))
                .collect::<Result<Vec<_>>>()?;
            let op = match conjunction {
                Conjunction::And => SqlBinaryOperator::And,
                Conjunction::Or => SqlBinaryOperator::Or,
            };
            let mut iter = exprs.into_iter();
            match iter.next() {
                None => Ok(SqlExpr::Fragment {
                    sql: "(1 = 1)".to_string(),
                    params: vec![],
                }),
                Some(first) => Ok(iter.fold(first, |acc, expr| SqlExpr::BinaryOp {
                    op,
                    left: Box::new(acc),
                    right: Box::new(expr),
                })),
            }
        }
        Filter::Condition {
            field_id,
            operator,
            value,
        } => {
            let field = field_map.get(field_id).ok_or_else(|| {
                TabulonError::Validation(format!("filter references unknown field {field_id}"))
            })?;
            Ok(condition_expr(field, *operator, value, dialect))
        }
    }
}

fn condition_expr(
    field: &Field,
    operator: FilterOperator,
    value: &Value,
    dialect: &dyn Dialect,
) -> SqlExpr {
    let column = col(&field.db_field_name);
    let comparison = |op| SqlExpr::BinaryOp {
        op,
        left: Box::new(column.clone()),
        right: Box::new(SqlExpr::Literal(value.clone())),
    };
    match operator {
        FilterOperator::Is if value.is_null() => comparison(SqlBinaryOperator::Is),
        FilterOperator::Is => comparison(SqlBinaryOperator::Eq),
        FilterOperator::IsNot if value.is_null() => comparison(SqlBinaryOperator::IsNot),
        FilterOperator::IsNot => comparison(SqlBinaryOperator::Neq),
        FilterOperator::Contains => contains_fragment(field, value, false, dialect),
        FilterOperator::DoesNotContain => contains_fragment(field, value, true, dialect),
        FilterOperator::IsGreater => comparison(SqlBinaryOperator::Gt),
        FilterOperator::IsGreaterEqual => comparison(SqlBinaryOperator::Gte),
        FilterOperator::IsLess => comparison(SqlBinaryOperator::Lt),
        FilterOperator::IsLessEqual => comparison(SqlBinaryOperator::Lte),
        FilterOperator::IsAnyOf => in_list(column.clone(), value, false),
        FilterOperator::IsNoneOf => in_list(column.clone(), value, true),
        FilterOperator::IsEmpty => SqlExpr::BinaryOp {
            op: SqlBinaryOperator::Is,
            left: Box::new(column.clone()),
            right: Box::new(SqlExpr::Literal(Value::Null)),
        },
        FilterOperator::IsNotEmpty => SqlExpr::BinaryOp {
            op: SqlBinaryOperator::IsNot,
            left: Box::new(column.clone()),
            right: Box::new(SqlExpr::Literal(Value::Null)),
        },
    }
}

fn contains_fragment(
    field: &Field,
    value: &Value,
    negated: bool,
    dialect: &dyn Dialect,
) -> SqlExpr {
    let pattern = format!("%{}%", value_text(value));
    let negation = if negated { "NOT " } else { "" };
    SqlExpr::Fragment {
        sql: format!(
            "CAST({} AS TEXT) {}{} ?",
            dialect.quote_ident(&field.db_field_name),
            negation,
            dialect.like_operator()
        ),
        params: vec![Value::String(pattern)],
    }
}

fn in_list(column: SqlExpr, value: &Value, negated: bool) -> SqlExpr {
    let list = match value {
        Value::Array(items) => items.iter().map(|v| SqlExpr::Literal(v.clone())).collect(),
        other => vec![SqlExpr::Literal(other.clone())],
    };
    SqlExpr::InList {
        expr: Box::new(column),
        list,
        negated,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// OR of per-field text matches; false when nothing is searchable.
pub(crate) fn search_predicate(
    dialect: &dyn Dialect,
    search_term: &str,
    fields: &[Field],
) -> SqlExpr {
    if fields.is_empty() {
        return SqlExpr::Fragment {
            sql: "(1 = 0)".to_string(),
            params: vec![],
        };
    }
    let pattern = Value::String(format!("%{search_term}%"));
    let mut sql = String::new();
    let mut params = Vec::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            sql.push_str(" OR ");
        }
        sql.push_str(&format!(
            "CAST({} AS TEXT) {} ?",
            dialect.quote_ident(&field.db_field_name),
            dialect.like_operator()
        ));
        params.push(pattern.clone());
    }
    SqlExpr::Fragment {
        sql: format!("({sql})"),
        params,
    }
}

/// Strips the base's ordering into stable `__s{i}` select aliases and
/// projects the record-id and search columns, ready for wrapping by a
/// dialect-specific match query.
pub(crate) struct MatchBase {
    pub query: SelectQuery,
    pub sort_aliases: Vec<(String, SortDirection)>,
}

pub(crate) fn prepare_match_base(mut base: SelectQuery, search_fields: &[Field]) -> MatchBase {
    let mut order = std::mem::take(&mut base.order_by);
    if order.is_empty() {
        order.push(OrderItem {
            expr: col(AUTO_NUMBER_COLUMN),
            direction: SortDirection::Asc,
        });
    }
    base.select.clear();
    base.select.push(SelectItem {
        expr: col(RECORD_ID_COLUMN),
        alias: None,
    });
    for field in search_fields {
        base.select.push(SelectItem {
            expr: col(&field.db_field_name),
            alias: None,
        });
    }
    let mut sort_aliases = Vec::new();
    for (i, item) in order.into_iter().enumerate() {
        let alias = format!("__s{i}");
        base.select.push(SelectItem {
            expr: item.expr,
            alias: Some(alias.clone()),
        });
        sort_aliases.push((alias, item.direction));
    }
    MatchBase {
        query: base,
        sort_aliases,
    }
}

pub(crate) fn iso_date(date: NaiveDate) -> Value {
    Value::String(date.format("%Y-%m-%d").to_string())
}

/// Record intervals overlapping the query window; open-ended records fall
/// back to their start date.
pub(crate) fn window_overlap_filter(
    dialect: &dyn Dialect,
    start_field: &Field,
    end_field: &Field,
    window: &DateWindow,
) -> SqlExpr {
    let start_col = dialect.quote_ident(&start_field.db_field_name);
    let end_col = dialect.quote_ident(&end_field.db_field_name);
    let coalesced = format!("COALESCE({end_col}, {start_col})");
    SqlExpr::Fragment {
        sql: format!(
            "{start_col} IS NOT NULL AND {} <= {} AND {} >= {}",
            dialect.cast_date(&start_col),
            dialect.cast_date("?"),
            dialect.cast_date(&coalesced),
            dialect.cast_date("?")
        ),
        params: vec![iso_date(window.end), iso_date(window.start)],
    }
}
