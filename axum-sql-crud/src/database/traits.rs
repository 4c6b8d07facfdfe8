//! Database provider trait
//!
//! This trait defines the narrow interface the CRUD screens need from a
//! database: schema introspection, identifier quoting, a lazy row cursor
//! for SELECTs and write execution.

use crate::schema::ColumnDescriptor;
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// SQL dialect differences that matter when generating statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Quote an identifier (table or column name) to prevent SQL injection
    ///
    /// Both SQLite and PostgreSQL use double quotes for identifiers. Embedded
    /// double quotes are escaped by doubling them.
    pub fn quote_identifier(self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    /// Positional bind placeholder for the 1-based parameter `index`
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", index),
        }
    }

    /// Placeholder for a value written into a column of the given type
    ///
    /// PostgreSQL does not coerce text parameters into dates, enums and the
    /// like, so the parameter is cast to the column's type name.
    pub fn typed_placeholder(self, index: usize, data_type: Option<&str>) -> String {
        match (self, data_type) {
            (Dialect::Postgres, Some(data_type)) if !data_type.is_empty() => format!(
                "CAST({} AS {})",
                self.placeholder(index),
                self.quote_identifier(data_type)
            ),
            _ => self.placeholder(index),
        }
    }

    /// Whether a column has to be selected as text for the driver to decode it
    ///
    /// The PostgreSQL driver reads a fixed set of types natively. NUMERIC,
    /// intervals, arrays, enums and other types go through a text cast.
    pub fn needs_text_cast(self, column: &ColumnDescriptor) -> bool {
        match self {
            Dialect::Sqlite => false,
            Dialect::Postgres => {
                let lower = column.data_type.to_lowercase();
                let base = lower.split('(').next().unwrap_or_default().trim();
                !matches!(
                    base,
                    "bool" | "boolean" | "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint"
                        | "float4" | "float8" | "real" | "double precision" | "timestamp" | "timestamptz"
                        | "date" | "time" | "uuid" | "json" | "jsonb" | "bytea" | "text" | "varchar"
                        | "character varying" | "bpchar" | "name"
                )
            }
        }
    }

    /// Build `INSERT INTO table (...) VALUES (...)`
    pub fn insert_statement(self, table: &str, fields: &[FieldValue]) -> Statement {
        if fields.is_empty() {
            return Statement {
                sql: format!("INSERT INTO {} DEFAULT VALUES", self.quote_identifier(table)),
                binds: Vec::new(),
            };
        }

        let mut columns = Vec::with_capacity(fields.len());
        let mut placeholders = Vec::with_capacity(fields.len());
        let mut binds = Vec::with_capacity(fields.len());

        for field in fields {
            binds.push(field.value.clone());
            columns.push(self.quote_identifier(&field.column));
            placeholders.push(self.typed_placeholder(binds.len(), field.data_type.as_deref()));
        }

        Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.quote_identifier(table),
                columns.join(", "),
                placeholders.join(", ")
            ),
            binds,
        }
    }

    /// Build `UPDATE table SET ... WHERE ...`; SET binds precede WHERE binds
    pub fn update_statement(
        self,
        table: &str,
        conditions: &[FieldValue],
        fields: &[FieldValue],
    ) -> Statement {
        let mut binds = Vec::with_capacity(fields.len() + conditions.len());
        let mut assignments = Vec::with_capacity(fields.len());

        for field in fields {
            binds.push(field.value.clone());
            assignments.push(format!(
                "{} = {}",
                self.quote_identifier(&field.column),
                self.typed_placeholder(binds.len(), field.data_type.as_deref())
            ));
        }

        let where_clause = self.conditions_clause(conditions, &mut binds);

        Statement {
            sql: format!(
                "UPDATE {} SET {}{}",
                self.quote_identifier(table),
                assignments.join(", "),
                where_clause
            ),
            binds,
        }
    }

    /// Build `DELETE FROM table WHERE ...`
    pub fn delete_statement(self, table: &str, conditions: &[FieldValue]) -> Statement {
        let mut binds = Vec::with_capacity(conditions.len());
        let where_clause = self.conditions_clause(conditions, &mut binds);

        Statement {
            sql: format!("DELETE FROM {}{}", self.quote_identifier(table), where_clause),
            binds,
        }
    }

    fn conditions_clause(self, conditions: &[FieldValue], binds: &mut Vec<Value>) -> String {
        if conditions.is_empty() {
            return String::new();
        }

        let mut parts = Vec::with_capacity(conditions.len());
        for condition in conditions {
            if condition.value.is_null() {
                parts.push(format!("{} IS NULL", self.quote_identifier(&condition.column)));
                continue;
            }
            binds.push(condition.value.clone());
            parts.push(format!(
                "{} = {}",
                self.quote_identifier(&condition.column),
                self.typed_placeholder(binds.len(), condition.data_type.as_deref())
            ));
        }

        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// A SQL statement with its positional bind values
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<Value>,
}

/// One column value destined for a write (or a key condition)
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    /// Column name
    pub column: String,

    /// Value to bind
    pub value: Value,

    /// Declared column type, used by dialects that need explicit casts
    pub data_type: Option<String>,
}

impl FieldValue {
    pub fn new(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            value,
            data_type: None,
        }
    }

    pub fn typed(column: impl Into<String>, value: Value, data_type: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value,
            data_type: Some(data_type.into()),
        }
    }
}

/// One row of a result set, with its column names in select order
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl ResultRow {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Value of the named output column
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|name| name == column)
            .and_then(|index| self.values.get(index))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Lazy, single-pass cursor over the rows of one executed statement
///
/// The cursor cannot be rewound; re-iterating requires executing the
/// statement again.
pub struct RowCursor<'a> {
    rows: BoxStream<'a, Result<ResultRow, DatabaseError>>,
}

impl<'a> RowCursor<'a> {
    pub fn new(rows: BoxStream<'a, Result<ResultRow, DatabaseError>>) -> Self {
        Self { rows }
    }

    /// Fetch the next row, or `None` once the result set is exhausted
    pub async fn next(&mut self) -> Option<Result<ResultRow, DatabaseError>> {
        self.rows.next().await
    }

    /// Drain the remaining rows into memory
    pub async fn collect_rows(mut self) -> Result<Vec<ResultRow>, DatabaseError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }
}

/// Database provider trait for schema discovery, reads and writes
///
/// Implementations of this trait own their connection pool; a connection is
/// only held for the duration of one call (or one cursor).
#[async_trait]
pub trait DatabaseProvider: Send + Sync + 'static {
    /// SQL dialect spoken by this database
    fn dialect(&self) -> Dialect;

    /// Quote an identifier for interpolation into SQL text
    fn quote_identifier(&self, identifier: &str) -> String {
        self.dialect().quote_identifier(identifier)
    }

    /// Get column metadata for a table, ordered by ordinal position
    ///
    /// # Arguments
    ///
    /// * `table` - Name of the table
    ///
    /// # Returns
    ///
    /// The table's columns, or `DatabaseError::TableNotFound`
    async fn column_metadata(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DatabaseError>;

    /// Execute a SELECT and return a cursor over its rows
    ///
    /// # Arguments
    ///
    /// * `sql` - Statement with positional placeholders
    /// * `binds` - Values for the placeholders, in order
    fn execute<'a>(&'a self, sql: &'a str, binds: &'a [Value]) -> RowCursor<'a>;

    /// Execute a write statement and return the number of affected rows
    async fn execute_write(&self, sql: &str, binds: &[Value]) -> Result<u64, DatabaseError>;

    /// Insert one row
    async fn insert(&self, table: &str, fields: &[FieldValue]) -> Result<u64, DatabaseError> {
        let statement = self.dialect().insert_statement(table, fields);
        tracing::debug!(sql = %statement.sql, binds = statement.binds.len(), "insert");
        self.execute_write(&statement.sql, &statement.binds).await
    }

    /// Update the rows matching all `conditions`
    async fn update(
        &self,
        table: &str,
        conditions: &[FieldValue],
        fields: &[FieldValue],
    ) -> Result<u64, DatabaseError> {
        if conditions.is_empty() {
            return Err(DatabaseError::Query("refusing to update without conditions".into()));
        }
        if fields.is_empty() {
            return Ok(0);
        }
        let statement = self.dialect().update_statement(table, conditions, fields);
        tracing::debug!(sql = %statement.sql, binds = statement.binds.len(), "update");
        self.execute_write(&statement.sql, &statement.binds).await
    }

    /// Delete the rows matching all `conditions`
    async fn delete(&self, table: &str, conditions: &[FieldValue]) -> Result<u64, DatabaseError> {
        if conditions.is_empty() {
            return Err(DatabaseError::Query("refusing to delete without conditions".into()));
        }
        let statement = self.dialect().delete_statement(table, conditions);
        tracing::debug!(sql = %statement.sql, binds = statement.binds.len(), "delete");
        self.execute_write(&statement.sql, &statement.binds).await
    }
}

/// Database error type
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Generic database error
    #[error("Database error: {0}")]
    Query(String),

    /// Table not found
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A value could not be decoded into JSON
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::Query(error.to_string())
    }
}
