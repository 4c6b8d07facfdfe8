//! Schema types for dynamic database introspection
//!
//! These types represent table metadata discovered at runtime and drive both
//! the list view (header order) and the add/edit forms (field order and
//! widget inference).

use serde::{Deserialize, Serialize};

/// Introspected metadata for a single table column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,

    /// 1-based position of the column in the table definition
    pub ordinal: u32,

    /// SQL data type as reported by the database (e.g. "INTEGER", "varchar", "mood")
    pub data_type: String,

    /// Whether the column allows NULL values
    pub nullable: bool,

    /// Declared value set for enumerated columns
    pub enum_values: Option<Vec<String>>,

    /// Default value expression (if any)
    pub default_value: Option<String>,

    /// Whether this column is part of the primary key
    pub is_primary_key: bool,
}

/// Coarse classification of a column's SQL type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeAffinity {
    Integer,
    Real,
    Boolean,
    /// Long free-form text (`TEXT` columns)
    LongText,
    /// Raw bytes (`BLOB`, `bytea`); read as a size placeholder, never edited
    Binary,
    Text,
}

impl ColumnDescriptor {
    /// Classify the column's declared type
    ///
    /// Follows the SQLite affinity rules closely enough to also cover the
    /// PostgreSQL type names (`int4`, `float8`, `bool`, ...).
    pub fn affinity(&self) -> TypeAffinity {
        let lower = self.data_type.to_lowercase();
        // Drop length/precision parameters: VARCHAR(32), NUMERIC(10,2)
        let base = lower.split('(').next().unwrap_or_default().trim();

        match base {
            "text" => TypeAffinity::LongText,
            "blob" | "bytea" => TypeAffinity::Binary,
            "bool" | "boolean" => TypeAffinity::Boolean,
            "int" | "int2" | "int4" | "int8" | "integer" | "tinyint" | "smallint" | "mediumint"
            | "bigint" | "unsigned big int" | "serial" | "smallserial" | "bigserial" => {
                TypeAffinity::Integer
            }
            _ if base.starts_with("real")
                || base.starts_with("float")
                || base.starts_with("double")
                || base.starts_with("numeric")
                || base.starts_with("decimal") =>
            {
                TypeAffinity::Real
            }
            _ => TypeAffinity::Text,
        }
    }

    /// Whether values of this column compare numerically
    pub fn is_numeric(&self) -> bool {
        matches!(self.affinity(), TypeAffinity::Integer | TypeAffinity::Real)
    }
}

/// Ordered column set of one table
#[derive(Debug, Clone, Default)]
pub struct TableColumns {
    columns: Vec<ColumnDescriptor>,
}

impl TableColumns {
    /// Build a column set, ordering by ordinal position
    pub fn new(mut columns: Vec<ColumnDescriptor>) -> Self {
        columns.sort_by_key(|column| column.ordinal);
        Self { columns }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn column(name: &str, ordinal: u32, data_type: &str, nullable: bool) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        ordinal,
        data_type: data_type.to_string(),
        nullable,
        enum_values: None,
        default_value: None,
        is_primary_key: false,
    }
}
