//! SQLite database provider implementation

use crate::database::traits::{DatabaseError, DatabaseProvider, Dialect, ResultRow, RowCursor};
use crate::schema::ColumnDescriptor;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};
use std::sync::Arc;

/// SQLite database provider
pub struct SqliteProvider {
    pool: SqlitePool,
}

impl SqliteProvider {
    /// Create a new SQLite provider
    ///
    /// # Arguments
    ///
    /// * `pool` - SQLite connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Bind a JSON value to a query with the closest native SQLite type
    fn bind_value<'q>(
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
        value: &Value,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(flag) => query.bind(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(integer) => query.bind(integer),
                None => query.bind(number.as_f64().unwrap_or_default()),
            },
            Value::String(text) => query.bind(text.clone()),
            other => query.bind(other.to_string()),
        }
    }

    /// Convert a SQLite row into a `ResultRow` sharing the given column names
    fn row_to_result(row: &SqliteRow, columns: Arc<[String]>) -> Result<ResultRow, DatabaseError> {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..row.columns().len() {
            values.push(Self::extract_column_value(row, index)?);
        }
        Ok(ResultRow::new(columns, values))
    }

    /// Extract a column value from a SQLite row and convert to JSON
    fn extract_column_value(row: &SqliteRow, index: usize) -> Result<Value, DatabaseError> {
        let type_name = row.columns()[index].type_info().name().to_string();

        // Check if the value is NULL first
        if row
            .try_get_raw(index)
            .map_err(|error| DatabaseError::Decode(error.to_string()))?
            .is_null()
        {
            return Ok(Value::Null);
        }

        // SQLite has dynamic typing but reports affinities: INTEGER, REAL, TEXT, BLOB, NULL
        match type_name.as_str() {
            "INTEGER" | "BIGINT" => {
                if let Ok(value) = row.try_get::<i64, _>(index) {
                    return Ok(Value::Number(value.into()));
                }
            }
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                if let Ok(value) = row.try_get::<f64, _>(index) {
                    if let Some(number) = serde_json::Number::from_f64(value) {
                        return Ok(Value::Number(number));
                    }
                }
            }
            "BOOLEAN" | "BOOL" => {
                if let Ok(value) = row.try_get::<bool, _>(index) {
                    return Ok(Value::Bool(value));
                }
            }
            "BLOB" => {
                if let Ok(value) = row.try_get::<Vec<u8>, _>(index) {
                    return Ok(Value::String(format!("[BLOB: {} bytes]", value.len())));
                }
            }
            _ => {
                if let Ok(value) = row.try_get::<String, _>(index) {
                    return Ok(Value::String(value));
                }
            }
        }

        // Fallback: try common types in order
        if let Ok(value) = row.try_get::<i64, _>(index) {
            return Ok(Value::Number(value.into()));
        }
        if let Ok(value) = row.try_get::<f64, _>(index) {
            if let Some(number) = serde_json::Number::from_f64(value) {
                return Ok(Value::Number(number));
            }
        }
        if let Ok(value) = row.try_get::<String, _>(index) {
            return Ok(Value::String(value));
        }

        Ok(Value::Null)
    }
}

#[async_trait]
impl DatabaseProvider for SqliteProvider {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn column_metadata(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DatabaseError> {
        // Get column information using PRAGMA table_info
        let table_info_query = format!("PRAGMA table_info({})", self.quote_identifier(table));
        let column_rows = sqlx::query(&table_info_query)
            .fetch_all(&self.pool)
            .await?;

        if column_rows.is_empty() {
            return Err(DatabaseError::TableNotFound(table.to_string()));
        }

        let mut columns = Vec::with_capacity(column_rows.len());
        for row in column_rows {
            // PRAGMA table_info returns: cid, name, type, notnull, dflt_value, pk
            let column_id: i32 = row.try_get("cid")?;
            let name: String = row.try_get("name")?;
            let data_type: String = row.try_get("type")?;
            let not_null: i32 = row.try_get("notnull")?;
            let default_value: Option<String> = row.try_get("dflt_value").ok().flatten();
            let primary_key: i32 = row.try_get("pk")?;

            columns.push(ColumnDescriptor {
                name,
                ordinal: (column_id + 1) as u32,
                data_type,
                // SQLite reports notnull=0 for INTEGER PRIMARY KEY rowid aliases
                nullable: not_null == 0 && primary_key == 0,
                enum_values: None,
                default_value,
                is_primary_key: primary_key > 0,
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

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn provider() -> SqliteProvider {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, username VARCHAR(32) NOT NULL, bio TEXT, score REAL DEFAULT 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        SqliteProvider::new(pool)
    }

    #[tokio::test]
    async fn test_column_metadata() {
        let provider = provider().await;
        let columns = provider.column_metadata("users").await.unwrap();

        let names: Vec<&str> = columns.iter().map(|column| column.name.as_str()).collect();
        assert_eq!(names, vec!["id", "username", "bio", "score"]);
        assert!(columns[0].is_primary_key);
        assert!(!columns[0].nullable);
        assert!(!columns[1].nullable);
        assert!(columns[2].nullable);
        assert_eq!(columns[3].default_value.as_deref(), Some("0"));
        assert_eq!(columns[1].ordinal, 2);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let provider = provider().await;
        let error = provider.column_metadata("nope").await.unwrap_err();
        assert!(matches!(error, DatabaseError::TableNotFound(_)));
    }

    #[tokio::test]
    async fn test_insert_and_cursor() {
        let provider = provider().await;
        let fields = vec![
            crate::database::FieldValue::new("username", Value::String("sukria".into())),
            crate::database::FieldValue::new("bio", Value::Null),
        ];
        assert_eq!(provider.insert("users", &fields).await.unwrap(), 1);

        let binds = vec![Value::String("sukria".into())];
        let rows = provider
            .execute("SELECT id, username AS name, bio FROM users WHERE username = ?", &binds)
            .collect_rows()
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&Value::from(1)));
        assert_eq!(rows[0].get("name"), Some(&Value::String("sukria".into())));
        assert_eq!(rows[0].get("bio"), Some(&Value::Null));
    }
}
