//! CrudLayer - Axum integration of one CRUD endpoint set
//!
//! A layer owns a validated `CrudSpec`, the database provider and the
//! optional auth and template collaborators, and turns them into a `Router`
//! with the list, add, edit, view and delete routes under the configured prefix.

use crate::auth::{AllowAll, AuthProvider};
use crate::database::traits::DatabaseProvider;
use crate::error::ConfigError;
use crate::form::FormOverrides;
use crate::handlers::{delete, list, record, CrudState};
use crate::spec::CrudSpec;
use crate::template::TemplateRenderer;
use axum::{routing::get, routing::post, Router};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[cfg(feature = "sqlite")]
use crate::database::sqlite::SqliteProvider;

#[cfg(feature = "postgres")]
use crate::database::postgres::PostgresProvider;

/// CRUD screens for one table
///
/// # Example
///
/// ```rust,no_run
/// use axum::Router;
/// use axum_sql_crud::{CrudLayer, CrudSpec};
/// use sqlx::SqlitePool;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = SqlitePool::connect("sqlite::memory:").await?;
/// let spec = CrudSpec::new("/users", "users").editable(true).addable(true);
/// let app = Router::new().merge(CrudLayer::sqlite(spec, pool)?.into_router());
/// # Ok(())
/// # }
/// ```
pub struct CrudLayer<DB: DatabaseProvider> {
    spec: CrudSpec,
    overrides: FormOverrides,
    database: Arc<DB>,
    auth: Arc<dyn AuthProvider>,
    templates: Option<Arc<dyn TemplateRenderer>>,
}

impl<DB: DatabaseProvider> CrudLayer<DB> {
    /// Validate the `CrudSpec` and create a layer
    ///
    /// # Arguments
    ///
    /// * `spec` - Endpoint configuration
    /// * `database` - The database provider implementation
    pub fn new(spec: CrudSpec, database: DB) -> Result<Self, ConfigError> {
        Self::with_shared_database(spec, Arc::new(database))
    }

    /// Like [`CrudLayer::new`], for a provider shared by several layers
    pub fn with_shared_database(spec: CrudSpec, database: Arc<DB>) -> Result<Self, ConfigError> {
        spec.validate()?;
        let overrides = FormOverrides::from_spec(&spec)?;

        Ok(Self {
            spec,
            overrides,
            database,
            auth: Arc::new(AllowAll),
            templates: None,
        })
    }

    /// Use `provider` to answer login and role checks
    pub fn with_auth(mut self, provider: impl AuthProvider) -> Self {
        self.auth = Arc::new(provider);
        self
    }

    /// Render pages through `renderer` when the `CrudSpec` names a template
    pub fn with_templates(mut self, renderer: impl TemplateRenderer) -> Self {
        self.templates = Some(Arc::new(renderer));
        self
    }

    pub fn spec(&self) -> &CrudSpec {
        &self.spec
    }

    /// Convert into an Axum Router that can be merged
    ///
    /// Routes, for prefix `/p`:
    /// - `GET /p` list, search, sort, paginate and download
    /// - `GET /p/view/{id}` and `GET /p/view`
    /// - `GET|POST /p/add` when addable
    /// - `GET|POST /p/edit/{id}` when editable
    /// - `GET /p/delete/{id}` and `POST /p/delete` when deletable
    pub fn into_router(self) -> Router {
        if self.spec.template.is_some() && self.templates.is_none() {
            tracing::warn!(
                prefix = %self.spec.prefix,
                "template configured without a template renderer; using the built-in layout"
            );
        }

        let prefix = self.spec.prefix.clone();
        let spec = &self.spec;

        // Note: Axum 0.8 uses {param} syntax instead of :param
        let mut router = Router::new()
            .route(&prefix, get(list::list_handler::<DB>))
            .route(&format!("{}/view", prefix), get(record::view_missing_handler::<DB>))
            .route(&format!("{}/view/{{id}}", prefix), get(record::view_handler::<DB>));

        if spec.addable {
            router = router.route(
                &format!("{}/add", prefix),
                get(record::add_form_handler::<DB>).post(record::add_submit_handler::<DB>),
            );
        }

        if spec.editable {
            router = router.route(
                &format!("{}/edit/{{id}}", prefix),
                get(record::edit_form_handler::<DB>).post(record::edit_submit_handler::<DB>),
            );
        }

        if spec.deletable {
            router = router
                .route(
                    &format!("{}/delete/{{id}}", prefix),
                    get(delete::delete_confirm_handler::<DB>),
                )
                .route(
                    &format!("{}/delete", prefix),
                    post(delete::delete_submit_handler::<DB>),
                );
        }

        tracing::debug!(
            prefix = %prefix,
            table = %self.spec.table,
            addable = self.spec.addable,
            editable = self.spec.editable,
            deletable = self.spec.deletable,
            "registered crud routes"
        );

        let state = CrudState {
            spec: self.spec,
            overrides: self.overrides,
            database: self.database,
            columns: OnceCell::new(),
            auth: self.auth,
            templates: self.templates,
        };

        router.with_state(Arc::new(state))
    }

    /// Merge this layer's routes into `router`
    pub fn register(self, router: Router) -> Router {
        router.merge(self.into_router())
    }
}

#[cfg(feature = "sqlite")]
impl CrudLayer<SqliteProvider> {
    /// Create a layer over a SQLite pool
    ///
    /// # Arguments
    ///
    /// * `spec` - Endpoint configuration
    /// * `pool` - The SQLite connection pool
    pub fn sqlite(spec: CrudSpec, pool: sqlx::SqlitePool) -> Result<Self, ConfigError> {
        Self::new(spec, SqliteProvider::new(pool))
    }
}

#[cfg(feature = "postgres")]
impl CrudLayer<PostgresProvider> {
    /// Create a layer over a PostgreSQL pool
    ///
    /// # Arguments
    ///
    /// * `spec` - Endpoint configuration
    /// * `pool` - The PostgreSQL connection pool
    pub fn postgres(spec: CrudSpec, pool: sqlx::PgPool) -> Result<Self, ConfigError> {
        Self::new(spec, PostgresProvider::new(pool))
    }
}

/// Collects several layers into one router, refusing duplicate prefixes
#[derive(Default)]
pub struct CrudRoutes {
    router: Router,
    prefixes: HashSet<String>,
}

impl CrudRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<DB: DatabaseProvider>(mut self, layer: CrudLayer<DB>) -> Result<Self, ConfigError> {
        let prefix = layer.spec().prefix.clone();
        if !self.prefixes.insert(prefix.clone()) {
            return Err(ConfigError::DuplicatePrefix(prefix));
        }
        self.router = layer.register(self.router);
        Ok(self)
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}
