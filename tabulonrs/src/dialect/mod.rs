//! SQL dialect abstractions for the supported stores.
//!
//! Dialects render identifiers, placeholders, and statistic aggregation
//! expressions. Query-tree walking lives in `sql_ast`; the dialect only maps
//! logical constructs to SQL fragments.

use crate::fields::StatisticFunc;

pub trait Dialect: Send + Sync {
    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Placeholder for the zero-based parameter index.
    fn placeholder(&self, _idx: usize) -> String {
        "?".to_string()
    }

    /// The case-insensitive pattern-match operator.
    fn like_operator(&self) -> &'static str {
        "LIKE"
    }

    /// Casts a rendered expression to a calendar date.
    fn cast_date(&self, expr: &str) -> String;

    fn render_aggregation(&self, func: StatisticFunc, expr: &str) -> String {
        standard_aggregation(func, expr)
    }
}

/// Standard SQL renderings shared by the dialects; PostgreSQL flavored where
/// the standard is silent (date arithmetic).
pub(crate) fn standard_aggregation(func: StatisticFunc, expr: &str) -> String {
    match func {
        StatisticFunc::Count => format!("COUNT({expr})"),
        StatisticFunc::Empty => format!("COUNT(*) - COUNT({expr})"),
        StatisticFunc::Filled => format!("COUNT({expr})"),
        StatisticFunc::Unique => format!("COUNT(DISTINCT {expr})"),
        StatisticFunc::Max | StatisticFunc::LatestDate => format!("MAX({expr})"),
        StatisticFunc::Min | StatisticFunc::EarliestDate => format!("MIN({expr})"),
        StatisticFunc::Sum => format!("SUM({expr})"),
        StatisticFunc::Average => format!("AVG({expr})"),
        StatisticFunc::Checked => format!("COUNT(CASE WHEN {expr} THEN 1 END)"),
        StatisticFunc::UnChecked => format!("COUNT(*) - COUNT(CASE WHEN {expr} THEN 1 END)"),
        StatisticFunc::PercentEmpty => {
            format!("(COUNT(*) - COUNT({expr})) * 100.0 / NULLIF(COUNT(*), 0)")
        }
        StatisticFunc::PercentFilled => format!("COUNT({expr}) * 100.0 / NULLIF(COUNT(*), 0)"),
        StatisticFunc::PercentUnique => {
            format!("COUNT(DISTINCT {expr}) * 100.0 / NULLIF(COUNT(*), 0)")
        }
        StatisticFunc::PercentChecked => {
            format!("COUNT(CASE WHEN {expr} THEN 1 END) * 100.0 / NULLIF(COUNT(*), 0)")
        }
        StatisticFunc::PercentUnChecked => format!(
            "(COUNT(*) - COUNT(CASE WHEN {expr} THEN 1 END)) * 100.0 / NULLIF(COUNT(*), 0)"
        ),
        StatisticFunc::DateRangeOfDays => format!("date_part('day', MAX({expr}) - MIN({expr}))"),
        // Raw "<max>,<min>" pair; the statistics layer converts it to a
        // month span.
        StatisticFunc::DateRangeOfMonths => format!("CONCAT(MAX({expr}), ',', MIN({expr}))"),
    }
}

mod postgres;
pub use postgres::PostgresDialect;

mod sqlite;
pub use sqlite::SqliteDialect;
