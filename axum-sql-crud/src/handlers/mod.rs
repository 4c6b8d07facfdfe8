//! HTTP handlers
//!
//! Handlers are stateless functions over the shared [`CrudState`]; each one
//! runs the auth gate before touching the database.

use crate::auth::{authorize, permits, AuthProvider, Permission};
use crate::database::{DatabaseProvider, ResultRow};
use crate::error::CrudError;
use crate::form::FormOverrides;
use crate::query::record_statement;
use crate::schema::TableColumns;
use crate::spec::CrudSpec;
use crate::template::{render_page, TemplateRenderer};
use axum::http::{header, request::Parts, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub mod delete;
pub mod list;
pub mod record;

/// Everything a request needs, shared read-only by all requests of one layer
pub struct CrudState<DB: DatabaseProvider> {
    pub(crate) spec: CrudSpec,
    pub(crate) overrides: FormOverrides,
    pub(crate) database: Arc<DB>,
    /// Introspected on first use
    pub(crate) columns: OnceCell<TableColumns>,
    pub(crate) auth: Arc<dyn AuthProvider>,
    pub(crate) templates: Option<Arc<dyn TemplateRenderer>>,
}

impl<DB: DatabaseProvider> CrudState<DB> {
    pub(crate) async fn columns(&self) -> Result<&TableColumns, CrudError> {
        self.columns
            .get_or_try_init(|| async {
                let columns = TableColumns::new(self.database.column_metadata(&self.spec.table).await?);
                self.warn_unknown_columns(&columns);
                tracing::debug!(table = %self.spec.table, columns = columns.len(), "introspected table");
                Ok::<_, CrudError>(columns)
            })
            .await
    }

    fn warn_unknown_columns(&self, columns: &TableColumns) {
        let configured = self
            .spec
            .display_columns
            .iter()
            .flatten()
            .chain(self.spec.editable_columns.iter().flatten())
            .chain(self.spec.foreign_keys.keys());
        for name in configured {
            if !columns.contains(name) {
                tracing::warn!(table = %self.spec.table, column = %name, "configured column not found; ignoring");
            }
        }
    }

    pub(crate) async fn authorize(&self, permission: Permission, parts: &Parts) -> Result<(), CrudError> {
        authorize(self.auth.as_ref(), &self.spec.auth, permission, parts).await
    }

    pub(crate) async fn permits(&self, permission: Permission, parts: &Parts) -> bool {
        permits(self.auth.as_ref(), &self.spec.auth, permission, parts).await
    }

    /// Load one record by key, honouring the where filter
    pub(crate) async fn load_record(
        &self,
        columns: &TableColumns,
        id: &str,
        filter: &BTreeMap<String, Value>,
    ) -> Result<Option<ResultRow>, CrudError> {
        let statement = record_statement(&self.spec, columns, self.database.dialect(), id, filter)?;
        let mut rows = self.database.execute(&statement.sql, &statement.binds);
        Ok(rows.next().await.transpose()?)
    }

    /// Full HTML page for a fragment
    pub(crate) fn page(&self, title: &str, content: &str) -> Result<Response, CrudError> {
        let html = render_page(
            self.templates.as_deref(),
            self.spec.template.as_deref(),
            &self.spec.prefix,
            title,
            content,
        )?;
        Ok(Html(html).into_response())
    }
}

/// Record ids are non-negative integers; anything else is treated as absent
pub(crate) fn parse_id(raw: &str) -> Option<String> {
    raw.parse::<u64>().ok().map(|id| id.to_string())
}

pub(crate) fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
