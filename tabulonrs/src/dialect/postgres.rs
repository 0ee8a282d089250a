//! PostgreSQL dialect implementation.

use super::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn placeholder(&self, idx: usize) -> String {
        format!("${}", idx + 1) // PostgreSQL uses $1, $2, ...
    }

    fn like_operator(&self) -> &'static str {
        "ILIKE"
    }

    fn cast_date(&self, expr: &str) -> String {
        format!("({expr})::date")
    }
}
