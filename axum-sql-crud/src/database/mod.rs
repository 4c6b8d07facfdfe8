//! Database abstraction layer
//!
//! This module provides a database-agnostic interface for schema discovery,
//! row retrieval and writes.

pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export the main trait and its companion types
pub use traits::{
    DatabaseError, DatabaseProvider, Dialect, FieldValue, ResultRow, RowCursor, Statement,
};
