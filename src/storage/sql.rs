//! SQL rendering of query plans
//!
//! Turns a [`QueryPlan`] and the [`EntityModel`] it targets into a `SELECT`
//! statement with bind parameters. Identifiers are validated and quoted for
//! the chosen [`Dialect`]; values never appear in the SQL text.
//!
//! ```rust,ignore
//! let renderer = SqlRenderer::new(Dialect::Postgres);
//! let statement = renderer.render_select(&model, "*", &plan)?;
//! // SELECT * FROM "people" AS t WHERE "age" >= $1 ORDER BY "name" ASC NULLS FIRST LIMIT 10
//! ```

use crate::core::error::{RepositoryError, Result, StorageError};
use crate::core::field::FieldValue;
use crate::core::model::EntityModel;
use crate::core::ordering::OrderingDirection;
use crate::core::predicate::{CompareOp, Expr};
use crate::core::query::{QueryPlan, SortKey};

/// SQL flavour to render for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `$1, $2, ...` placeholders, double-quoted identifiers
    Postgres,
    /// `?` placeholders, backtick-quoted identifiers
    MySql,
    /// `?` placeholders, double-quoted identifiers
    Sqlite,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Postgres | Dialect::Sqlite => '"',
        }
    }

    // MySQL already sorts nulls first ascending and last descending
    fn explicit_null_ordering(self) -> bool {
        matches!(self, Dialect::Postgres | Dialect::Sqlite)
    }
}

/// Rendered SQL text with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<FieldValue>,
}

#[derive(Debug, Clone, Copy)]
pub struct SqlRenderer {
    dialect: Dialect,
}

impl SqlRenderer {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Placeholder for the parameter at 1-based `index`
    pub fn placeholder(&self, index: usize) -> String {
        self.dialect.placeholder(index)
    }

    /// Validate and quote a single identifier
    ///
    /// Dotted paths address nested values that have no column of their own
    /// and are rejected.
    pub fn quote(&self, ident: &str) -> Result<String> {
        if ident.contains('.') {
            return Err(self.error(format!(
                "field path '{}' refers to a nested value and cannot be translated",
                ident
            )));
        }
        if !is_valid_identifier(ident) {
            return Err(self.error(format!("invalid identifier '{}'", ident)));
        }
        let quote = self.dialect.quote_char();
        Ok(format!("{quote}{ident}{quote}"))
    }

    /// Render a `SELECT` for a plan
    ///
    /// `projection` is emitted verbatim after `SELECT`; the table is aliased
    /// as `t`.
    pub fn render_select<T>(
        &self,
        model: &EntityModel,
        projection: &str,
        plan: &QueryPlan<T>,
    ) -> Result<SqlStatement> {
        self.render_parts(
            model,
            projection,
            plan.filter_expr(),
            plan.sort_keys(),
            plan.offset(),
            plan.limit(),
        )
    }

    /// Render a `SELECT` from the individual parts of a plan
    pub fn render_parts(
        &self,
        model: &EntityModel,
        projection: &str,
        filter: Option<&Expr>,
        sort: &[SortKey],
        offset: usize,
        limit: Option<usize>,
    ) -> Result<SqlStatement> {
        let mut sql = format!(
            "SELECT {} FROM {} AS t",
            projection,
            self.quote(model.table_name())?
        );
        let mut params = Vec::new();

        if let Some(expr) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_condition(expr, &mut params)?);
        }

        if !sort.is_empty() {
            let keys = sort
                .iter()
                .map(|key| self.render_sort_key(key))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        self.append_window(&mut sql, offset, limit);

        Ok(SqlStatement { sql, params })
    }

    /// Render a boolean condition, pushing its values onto `params`
    pub fn render_condition(&self, expr: &Expr, params: &mut Vec<FieldValue>) -> Result<String> {
        match expr {
            Expr::Compare { field, op, value } => {
                let column = self.quote(field)?;
                if value.is_null() {
                    return Ok(match op {
                        CompareOp::Eq => format!("{} IS NULL", column),
                        CompareOp::Ne => format!("{} IS NOT NULL", column),
                        // ordering against null is unknown
                        _ => "NULL".to_string(),
                    });
                }
                let placeholder = self.bind(params, value.clone());
                Ok(format!("{} {} {}", column, op.as_sql(), placeholder))
            }
            Expr::In { field, values } => {
                let column = self.quote(field)?;
                if values.is_empty() {
                    return Ok("1 = 0".to_string());
                }
                let items: Vec<String> = values
                    .iter()
                    .map(|value| {
                        if value.is_null() {
                            "NULL".to_string()
                        } else {
                            self.bind(params, value.clone())
                        }
                    })
                    .collect();
                Ok(format!("{} IN ({})", column, items.join(", ")))
            }
            Expr::Like { field, pattern } => {
                let column = self.quote(field)?;
                let placeholder = self.bind(params, FieldValue::String(pattern.clone()));
                Ok(match self.dialect {
                    Dialect::Sqlite => format!("{} LIKE {} ESCAPE '\\'", column, placeholder),
                    Dialect::Postgres | Dialect::MySql => format!("{} LIKE {}", column, placeholder),
                })
            }
            Expr::IsNull { field } => Ok(format!("{} IS NULL", self.quote(field)?)),
            Expr::And(left, right) => Ok(format!(
                "({} AND {})",
                self.render_condition(left, params)?,
                self.render_condition(right, params)?
            )),
            Expr::Or(left, right) => Ok(format!(
                "({} OR {})",
                self.render_condition(left, params)?,
                self.render_condition(right, params)?
            )),
            Expr::Not(inner) => Ok(format!("NOT ({})", self.render_condition(inner, params)?)),
        }
    }

    fn render_sort_key(&self, key: &SortKey) -> Result<String> {
        let column = self.quote(&key.field)?;
        let direction = match key.direction {
            OrderingDirection::Ascending => "ASC",
            OrderingDirection::Descending => "DESC",
        };
        if !self.dialect.explicit_null_ordering() {
            return Ok(format!("{} {}", column, direction));
        }
        let nulls = match key.direction {
            OrderingDirection::Ascending => "NULLS FIRST",
            OrderingDirection::Descending => "NULLS LAST",
        };
        Ok(format!("{} {} {}", column, direction, nulls))
    }

    fn append_window(&self, sql: &mut String, offset: usize, limit: Option<usize>) {
        match (limit, offset) {
            (Some(limit), 0) => sql.push_str(&format!(" LIMIT {}", limit)),
            (Some(limit), offset) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (None, 0) => {}
            (None, offset) => match self.dialect {
                Dialect::Postgres => sql.push_str(&format!(" OFFSET {}", offset)),
                Dialect::Sqlite => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
                Dialect::MySql => sql.push_str(&format!(" LIMIT {} OFFSET {}", u64::MAX, offset)),
            },
        }
    }

    fn bind(&self, params: &mut Vec<FieldValue>, value: FieldValue) -> String {
        params.push(value);
        self.dialect.placeholder(params.len())
    }

    fn error(&self, message: String) -> RepositoryError {
        StorageError::QueryError {
            backend: self.dialect.name().to_string(),
            message,
        }
        .into()
    }
}

fn is_valid_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
