//! Dialect-independent query tree and its renderer.
//!
//! Every request value flows through bound parameters: the renderer emits
//! dialect placeholders and collects a parameter vector alongside the SQL
//! text. Identifiers come from field metadata and are always quoted.

use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::{Result, TabulonError};
use crate::fields::{SortDirection, StatisticFunc};

#[derive(Debug, Clone)]
pub enum SqlExpr {
    Column {
        table: Option<String>,
        name: String,
    },
    Literal(Value),
    Star,
    Aggregate {
        func: StatisticFunc,
        expr: Box<SqlExpr>,
    },
    BinaryOp {
        op: SqlBinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    WindowRowNumber {
        order_by: Vec<OrderItem>,
    },
    /// Dialect-specific SQL written by a DB provider. `?` marks a bound
    /// parameter; the renderer renumbers markers into dialect placeholders.
    Fragment {
        sql: String,
        params: Vec<Value>,
    },
}

pub fn col(name: &str) -> SqlExpr {
    SqlExpr::Column {
        table: None,
        name: name.to_string(),
    }
}

pub fn qcol(table: &str, name: &str) -> SqlExpr {
    SqlExpr::Column {
        table: Some(table.to_string()),
        name: name.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBinaryOperator {
    And,
    Or,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    Is,
    IsNot,
}

#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
    pub subquery: Option<Box<SelectQuery>>,
}

impl TableRef {
    pub fn table(name: impl Into<String>) -> Self {
        TableRef {
            name: name.into(),
            alias: None,
            subquery: None,
        }
    }

    pub fn subquery(query: SelectQuery, alias: impl Into<String>) -> Self {
        TableRef {
            name: String::new(),
            alias: Some(alias.into()),
            subquery: Some(Box::new(query)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    /// ANDed together in the WHERE clause.
    pub filters: Vec<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Final SQL text plus its bound parameters, ready for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Incremental SQL assembly with parameter binding. DB providers use this
/// directly for their dialect-specific queries; `SqlRenderer` uses it for
/// the query tree.
pub struct SqlWriter<'d> {
    dialect: &'d dyn Dialect,
    sql: String,
    params: Vec<Value>,
}

impl<'d> SqlWriter<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    /// Appends trusted SQL text verbatim.
    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn ident(&mut self, name: &str) {
        let quoted = self.dialect.quote_ident(name);
        self.sql.push_str(&quoted);
    }

    /// Appends a placeholder and records the bound value.
    pub fn bind(&mut self, value: Value) {
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self.params.push(value);
    }

    /// Splices provider SQL, renumbering each `?` marker into the next
    /// placeholder. Marker and parameter counts must match.
    pub fn fragment(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        let mut remaining = params.iter();
        for ch in sql.chars() {
            if ch == '?' {
                let value = remaining.next().ok_or_else(|| {
                    TabulonError::Execution("fragment has more markers than parameters".to_string())
                })?;
                self.bind(value.clone());
            } else {
                self.sql.push(ch);
            }
        }
        if remaining.next().is_some() {
            return Err(TabulonError::Execution(
                "fragment has more parameters than markers".to_string(),
            ));
        }
        Ok(())
    }

    pub fn select(&mut self, query: &SelectQuery) -> Result<()> {
        self.push("SELECT ");
        if query.select.is_empty() {
            self.push("*");
        }
        for (i, item) in query.select.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(&item.expr)?;
            if let Some(alias) = &item.alias {
                self.push(" AS ");
                self.ident(alias);
            }
        }
        self.push(" FROM ");
        self.table_ref(&query.from)?;

        if !query.filters.is_empty() {
            self.push(" WHERE ");
            for (i, filter) in query.filters.iter().enumerate() {
                if i > 0 {
                    self.push(" AND ");
                }
                self.expr(filter)?;
            }
        }

        if !query.group_by.is_empty() {
            self.push(" GROUP BY ");
            for (i, group) in query.group_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expr(group)?;
            }
        }

        if !query.order_by.is_empty() {
            self.push(" ORDER BY ");
            self.order_items(&query.order_by)?;
        }

        if let Some(limit) = query.limit {
            self.push(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = query.offset {
            self.push(&format!(" OFFSET {offset}"));
        }
        Ok(())
    }

    fn table_ref(&mut self, table: &TableRef) -> Result<()> {
        if let Some(subquery) = &table.subquery {
            self.push("(");
            self.select(subquery)?;
            self.push(")");
            if let Some(alias) = &table.alias {
                self.push(" AS ");
                self.ident(alias);
            }
        } else {
            self.ident(&table.name);
            if let Some(alias) = &table.alias {
                self.push(" AS ");
                self.ident(alias);
            }
        }
        Ok(())
    }

    fn order_items(&mut self, items: &[OrderItem]) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(&item.expr)?;
            self.push(" ");
            self.push(item.direction.sql_keyword());
        }
        Ok(())
    }

    pub fn expr(&mut self, expr: &SqlExpr) -> Result<()> {
        match expr {
            SqlExpr::Column { table, name } => {
                if let Some(table) = table {
                    self.ident(table);
                    self.push(".");
                }
                self.ident(name);
            }
            SqlExpr::Star => self.push("*"),
            SqlExpr::Literal(Value::Null) => self.push("NULL"),
            SqlExpr::Literal(value) => self.bind(value.clone()),
            SqlExpr::Aggregate { func, expr } => {
                let target = self.static_expr(expr)?;
                let sql = self.dialect.render_aggregation(*func, &target);
                self.push(&sql);
            }
            SqlExpr::BinaryOp { op, left, right } => {
                self.push("(");
                self.expr(left)?;
                self.push(match op {
                    SqlBinaryOperator::And => " AND ",
                    SqlBinaryOperator::Or => " OR ",
                    SqlBinaryOperator::Eq => " = ",
                    SqlBinaryOperator::Neq => " != ",
                    SqlBinaryOperator::Gt => " > ",
                    SqlBinaryOperator::Gte => " >= ",
                    SqlBinaryOperator::Lt => " < ",
                    SqlBinaryOperator::Lte => " <= ",
                    SqlBinaryOperator::Like => " LIKE ",
                    SqlBinaryOperator::ILike => " ILIKE ",
                    SqlBinaryOperator::Is => " IS ",
                    SqlBinaryOperator::IsNot => " IS NOT ",
                });
                self.expr(right)?;
                self.push(")");
            }
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                self.expr(expr)?;
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(item)?;
                }
                self.push(")");
            }
            SqlExpr::WindowRowNumber { order_by } => {
                self.push("ROW_NUMBER() OVER (");
                if !order_by.is_empty() {
                    self.push("ORDER BY ");
                    self.order_items(order_by)?;
                }
                self.push(")");
            }
            SqlExpr::Fragment { sql, params } => self.fragment(sql, params)?,
        }
        Ok(())
    }

    /// Renders a parameter-free expression to a string, for splicing into
    /// dialect aggregation templates.
    fn static_expr(&self, expr: &SqlExpr) -> Result<String> {
        match expr {
            SqlExpr::Column { table, name } => Ok(match table {
                Some(table) => format!(
                    "{}.{}",
                    self.dialect.quote_ident(table),
                    self.dialect.quote_ident(name)
                ),
                None => self.dialect.quote_ident(name),
            }),
            SqlExpr::Star => Ok("*".to_string()),
            _ => Err(TabulonError::Execution(
                "aggregate target must be a plain column".to_string(),
            )),
        }
    }

    pub fn finish(self) -> RenderedQuery {
        RenderedQuery {
            sql: self.sql,
            params: self.params,
        }
    }
}

pub struct SqlRenderer<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn render_select(&self, query: &SelectQuery) -> Result<RenderedQuery> {
        let mut writer = SqlWriter::new(self.dialect);
        writer.select(query)?;
        Ok(writer.finish())
    }
}
