//! PostgreSQL database provider implementation

use crate::database::traits::{DatabaseError, DatabaseProvider, Dialect, ResultRow, RowCursor};
use crate::schema::ColumnDescriptor;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::Uuid;
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo};
use std::sync::Arc;

/// PostgreSQL database provider
pub struct PostgresProvider {
    pool: PgPool,
}

impl PostgresProvider {
    /// Create a new PostgreSQL provider
    ///
    /// # Arguments
    ///
    /// * `pool` - PostgreSQL connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn bind_value<'q>(
        query: Query<'q, Postgres, PgArguments>,
        value: &Value,
    ) -> Query<'q, Postgres, PgArguments> {
        match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(flag) => query.bind(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(integer) => query.bind(integer),
                None => query.bind(number.as_f64().unwrap_or_default()),
            },
            Value::String(text) => query.bind(text.clone()),
            other => query.bind(other.clone()),
        }
    }

    /// Convert a PostgreSQL row into a `ResultRow` sharing the given column names
    fn row_to_result(row: &PgRow, columns: Arc<[String]>) -> Result<ResultRow, DatabaseError> {
        let mut values = Vec::with_capacity(columns.len());

        for (index, column) in row.columns().iter().enumerate() {
            let type_info = column.type_info();

            let value: Value = match type_info.name() {
                "BOOL" => {
                    let val: Option<bool> = row.try_get(index)?;
                    val.map(Value::Bool).unwrap_or(Value::Null)
                }
                "INT2" => {
                    let val: Option<i16> = row.try_get(index)?;
                    val.map(|v| Value::Number(v.into())).unwrap_or(Value::Null)
                }
                "INT4" => {
                    let val: Option<i32> = row.try_get(index)?;
                    val.map(|v| Value::Number(v.into())).unwrap_or(Value::Null)
                }
                "INT8" => {
                    let val: Option<i64> = row.try_get(index)?;
                    val.map(|v| Value::Number(v.into())).unwrap_or(Value::Null)
                }
                "FLOAT4" => {
                    let val: Option<f32> = row.try_get(index)?;
                    val.and_then(|v| serde_json::Number::from_f64(v as f64))
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "FLOAT8" => {
                    let val: Option<f64> = row.try_get(index)?;
                    val.and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "TIMESTAMP" => {
                    let val: Option<NaiveDateTime> = row.try_get(index)?;
                    val.map(|v| Value::String(v.format("%Y-%m-%d %H:%M:%S").to_string()))
                        .unwrap_or(Value::Null)
                }
                "TIMESTAMPTZ" => {
                    let val: Option<DateTime<Utc>> = row.try_get(index)?;
                    val.map(|v| Value::String(v.to_rfc3339())).unwrap_or(Value::Null)
                }
                "DATE" => {
                    let val: Option<NaiveDate> = row.try_get(index)?;
                    val.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null)
                }
                "TIME" => {
                    let val: Option<NaiveTime> = row.try_get(index)?;
                    val.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null)
                }
                "UUID" => {
                    let val: Option<Uuid> = row.try_get(index)?;
                    val.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null)
                }
                "JSON" | "JSONB" => {
                    let val: Option<Value> = row.try_get(index)?;
                    val.unwrap_or(Value::Null)
                }
                "BYTEA" => {
                    let val: Option<Vec<u8>> = row.try_get(index)?;
                    val.map(|bytes| Value::String(format!("[BLOB: {} bytes]", bytes.len())))
                        .unwrap_or(Value::Null)
                }
                _ => {
                    // Text types, plus base columns the query compiler selected
                    // through a text cast (numeric, enums, arrays, ...)
                    let val: Option<String> = row.try_get(index).ok().flatten();
                    val.map(Value::String).unwrap_or(Value::Null)
                }
            };

            values.push(value);
        }

        Ok(ResultRow::new(columns, values))
    }

    /// Fetch the declared labels of an enum type, in declaration order
    async fn enum_values(&self, type_name: &str) -> Result<Option<Vec<String>>, DatabaseError> {
        let enum_query = r#"
            SELECT e.enumlabel
            FROM pg_type t
            JOIN pg_enum e ON e.enumtypid = t.oid
            WHERE t.typname = $1
            ORDER BY e.enumsortorder
        "#;

        let labels: Vec<String> = sqlx::query_scalar(enum_query)
            .bind(type_name)
            .fetch_all(&self.pool)
            .await?;

        Ok(if labels.is_empty() { None } else { Some(labels) })
    }
}

#[async_trait]
impl DatabaseProvider for PostgresProvider {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn column_metadata(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DatabaseError> {
        let column_query = r#"
            SELECT
                column_name,
                ordinal_position,
                data_type,
                udt_name,
                is_nullable,
                column_default
            FROM information_schema.columns
            WHERE table_schema = 'public'
              AND table_name = $1
            ORDER BY ordinal_position
        "#;

        let column_rows = sqlx::query(column_query)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        if column_rows.is_empty() {
            return Err(DatabaseError::TableNotFound(table.to_string()));
        }

        // Get primary key columns
        let pk_query = r#"
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
              AND tc.table_schema = kcu.table_schema
            WHERE tc.table_schema = 'public'
              AND tc.table_name = $1
              AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
        "#;

        let primary_key_columns: Vec<String> = sqlx::query_scalar(pk_query)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut columns = Vec::with_capacity(column_rows.len());
        for row in &column_rows {
            let name: String = row.try_get("column_name")?;
            let ordinal: i32 = row.try_get("ordinal_position")?;
            let data_type: String = row.try_get("data_type")?;
            let udt_name: String = row.try_get("udt_name")?;
            let is_nullable: String = row.try_get("is_nullable")?;
            let default_value: Option<String> = row.try_get("column_default")?;

            let enum_values = if data_type == "USER-DEFINED" {
                self.enum_values(&udt_name).await?
            } else {
                None
            };

            columns.push(ColumnDescriptor {
                is_primary_key: primary_key_columns.contains(&name),
                name,
                ordinal: ordinal as u32,
                // udt_name is castable (`int4`, `varchar`, `mood`), data_type is not always
                data_type: udt_name,
                nullable: is_nullable == "YES",
                enum_values,
                default_value,
            });
        }

        Ok(columns)
    }

    fn execute<'a>(&'a self, sql: &'a str, binds: &'a [Value]) -> RowCursor<'a> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = Self::bind_value(query, value);
        }

        let mut columns: Option<Arc<[String]>> = None;
        let rows = query.fetch(&self.pool).map(move |row| {
            let row = row?;
            let names = columns
                .get_or_insert_with(|| {
                    row.columns()
                        .iter()
                        .map(|column| column.name().to_string())
                        .collect()
                })
                .clone();
            Self::row_to_result(&row, names)
        });

        RowCursor::new(rows.boxed())
    }

    async fn execute_write(&self, sql: &str, binds: &[Value]) -> Result<u64, DatabaseError> {
        let mut query = sqlx::query(sql);
        for value in binds {
            query = Self::bind_value(query, value);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
