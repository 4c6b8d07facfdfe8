//! # axum-sql-crud
//!
//! Declarative CRUD screens for SQL tables, mounted as Axum routers.
//!
//! ## Features
//!
//! - List view with search, sorting and pagination
//! - Add and edit forms inferred from the table schema, with validation
//! - Record view and delete confirmation
//! - CSV, TSV, JSON and XML downloads of the current list
//! - Foreign key labels, joins, custom columns and row filters
//! - Pluggable authentication and page templates
//! - Support for SQLite and PostgreSQL
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use axum_sql_crud::{CrudLayer, CrudRoutes, CrudSpec, ForeignKey};
//! use sqlx::SqlitePool;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = SqlitePool::connect("sqlite::memory:").await?;
//!
//!     let users = CrudSpec::new("/users", "users")
//!         .record_title("user")
//!         .editable(true)
//!         .addable(true)
//!         .foreign_key("group_id", ForeignKey::new("groups", "id", "name"));
//!
//!     let crud = CrudRoutes::new()
//!         .add(CrudLayer::sqlite(users, pool)?)?
//!         .into_router();
//!
//!     let app = Router::new()
//!         .route("/", get(|| async { "Hello, World!" }))
//!         .merge(crud);
//!
//!     // Serve the application...
//!     Ok(())
//! }
//! ```

// Public modules
pub mod auth;
pub mod database;
pub mod error;
pub mod export;
pub mod form;
pub mod handlers;
pub mod layer;
pub mod query;
pub mod render;
pub mod schema;
pub mod spec;
pub mod template;

// Public exports
pub use auth::{AccessRule, AllowAll, AuthConfig, AuthProvider, Permission};
pub use error::{ConfigError, CrudError};
pub use export::ExportFormat;
pub use form::{SaveAction, SaveContext};
pub use layer::{CrudLayer, CrudRoutes};
pub use schema::{ColumnDescriptor, TableColumns};
pub use spec::{CrudSpec, CustomColumn, ForeignKey, JoinKind, TableJoin, WhereFilter};
pub use template::TemplateRenderer;

// Re-export database providers
pub use database::traits::DatabaseProvider;

#[cfg(feature = "sqlite")]
pub use database::sqlite::SqliteProvider;

#[cfg(feature = "postgres")]
pub use database::postgres::PostgresProvider;
