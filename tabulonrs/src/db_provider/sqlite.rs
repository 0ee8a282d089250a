//! SQLite query-fragment builders.
//!
//! SQLite has no lateral joins, so the match query is a per-field UNION ALL,
//! and the calendar day table is a recursive CTE.

use serde_json::Value;

use crate::dialect::{Dialect, SqliteDialect};
use crate::error::{Result, TabulonError};
use crate::fields::{Field, MATCHED_FIELD_ALIAS, RECORD_ID_COLUMN};
use crate::sql_ast::{col, RenderedQuery, SelectItem, SelectQuery, SqlWriter};

use super::{iso_date, prepare_match_base, window_overlap_filter, DateWindow, DbProvider};

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteProvider {
    dialect: SqliteDialect,
}

impl SqliteProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DbProvider for SqliteProvider {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn search_index_query(
        &self,
        base: SelectQuery,
        search_term: &str,
        search_fields: &[Field],
        skip: u64,
        take: u64,
    ) -> Result<RenderedQuery> {
        if search_fields.is_empty() {
            return Err(TabulonError::Validation(
                "search requires at least one searchable field".to_string(),
            ));
        }
        let prepared = prepare_match_base(base, search_fields);
        let pattern = format!("%{search_term}%");

        let mut w = SqlWriter::new(self.dialect());
        w.push("SELECT ");
        w.ident("m");
        w.push(".");
        w.ident(RECORD_ID_COLUMN);
        w.push(", ");
        w.ident("m");
        w.push(".");
        w.ident(MATCHED_FIELD_ALIAS);
        w.push(" FROM (");
        for (rank, field) in search_fields.iter().enumerate() {
            if rank > 0 {
                w.push(" UNION ALL ");
            }
            w.push("SELECT ");
            w.ident("t");
            w.push(".");
            w.ident(RECORD_ID_COLUMN);
            w.push(" AS ");
            w.ident(RECORD_ID_COLUMN);
            w.push(", ");
            w.bind(Value::String(field.id.clone()));
            w.push(" AS ");
            w.ident(MATCHED_FIELD_ALIAS);
            w.push(&format!(", {rank} AS "));
            w.ident("__field_rank");
            for (alias, _) in &prepared.sort_aliases {
                w.push(", ");
                w.ident("t");
                w.push(".");
                w.ident(alias);
                w.push(" AS ");
                w.ident(alias);
            }
            w.push(" FROM (");
            w.select(&prepared.query)?;
            w.push(") AS ");
            w.ident("t");
            w.push(" WHERE CAST(");
            w.ident("t");
            w.push(".");
            w.ident(&field.db_field_name);
            w.push(&format!(" AS TEXT) {} ", self.dialect().like_operator()));
            w.bind(Value::String(pattern.clone()));
        }
        w.push(") AS ");
        w.ident("m");
        w.push(" ORDER BY ");
        for (alias, direction) in &prepared.sort_aliases {
            w.ident("m");
            w.push(".");
            w.ident(alias);
            w.push(" ");
            w.push(direction.sql_keyword());
            w.push(", ");
        }
        w.ident("m");
        w.push(".");
        w.ident(RECORD_ID_COLUMN);
        w.push(", ");
        w.ident("m");
        w.push(".");
        w.ident("__field_rank");
        w.push(&format!(" LIMIT {take} OFFSET {skip}"));
        Ok(w.finish())
    }

    fn calendar_daily_collection_query(
        &self,
        mut base: SelectQuery,
        window: &DateWindow,
        start_field: &Field,
        end_field: &Field,
    ) -> Result<RenderedQuery> {
        let dialect = self.dialect();
        base.select.clear();
        base.select.push(SelectItem {
            expr: col(RECORD_ID_COLUMN),
            alias: None,
        });
        base.select.push(SelectItem {
            expr: col(&start_field.db_field_name),
            alias: None,
        });
        if end_field.db_field_name != start_field.db_field_name {
            base.select.push(SelectItem {
                expr: col(&end_field.db_field_name),
                alias: None,
            });
        }
        base.order_by.clear();
        base.filters
            .push(window_overlap_filter(dialect, start_field, end_field, window));

        let start_col = format!(
            "{}.{}",
            dialect.quote_ident("t"),
            dialect.quote_ident(&start_field.db_field_name)
        );
        let end_col = format!(
            "{}.{}",
            dialect.quote_ident("t"),
            dialect.quote_ident(&end_field.db_field_name)
        );
        let coalesced = format!("COALESCE({end_col}, {start_col})");

        let mut w = SqlWriter::new(dialect);
        w.push("WITH RECURSIVE ");
        w.ident("days");
        w.push("(");
        w.ident("day");
        w.push(") AS (SELECT date(");
        w.bind(iso_date(window.start));
        w.push(") UNION ALL SELECT date(");
        w.ident("day");
        w.push(", '+1 day') FROM ");
        w.ident("days");
        w.push(" WHERE ");
        w.ident("day");
        w.push(" < date(");
        w.bind(iso_date(window.end));
        w.push(")) SELECT ");
        w.ident("days");
        w.push(".");
        w.ident("day");
        w.push(" AS ");
        w.ident("date");
        w.push(", COUNT(*) AS ");
        w.ident("count");
        w.push(", GROUP_CONCAT(");
        w.ident("t");
        w.push(".");
        w.ident(RECORD_ID_COLUMN);
        w.push(") AS ");
        w.ident("record_ids");
        w.push(" FROM ");
        w.ident("days");
        w.push(" JOIN (");
        w.select(&base)?;
        w.push(") AS ");
        w.ident("t");
        w.push(&format!(" ON {} <= ", dialect.cast_date(&start_col)));
        w.ident("days");
        w.push(".");
        w.ident("day");
        w.push(&format!(" AND {} >= ", dialect.cast_date(&coalesced)));
        w.ident("days");
        w.push(".");
        w.ident("day");
        w.push(" GROUP BY ");
        w.ident("days");
        w.push(".");
        w.ident("day");
        w.push(" ORDER BY ");
        w.ident("days");
        w.push(".");
        w.ident("day");
        Ok(w.finish())
    }
}
