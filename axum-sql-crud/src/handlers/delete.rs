//! Delete confirmation and delete handlers

use crate::auth::Permission;
use crate::database::{DatabaseProvider, FieldValue};
use crate::error::CrudError;
use crate::handlers::{parse_id, redirect, CrudState};
use crate::query::key_value;
use crate::render::{render_delete_confirmation, render_message};
use axum::{
    extract::{Path, State},
    http::request::Parts,
    response::Response,
    Form,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Handler for GET {prefix}/delete/{id}
///
/// Shows a confirmation form that posts the id back to {prefix}/delete.
pub async fn delete_confirm_handler<DB: DatabaseProvider>(
    State(state): State<Arc<CrudState<DB>>>,
    parts: Parts,
    Path(raw_id): Path<String>,
) -> Result<Response, CrudError> {
    state.authorize(Permission::Edit, &parts).await?;

    let spec = &state.spec;
    let id = parse_id(&raw_id).ok_or_else(|| CrudError::NotFound(format!("{} {}", spec.record_title, raw_id)))?;

    state.page(
        &format!("Delete {}", spec.record_title),
        &render_delete_confirmation(spec, &id),
    )
}

/// Handler for POST {prefix}/delete
///
/// Form fields:
/// - record_id: key of the record to delete
///
/// Redirects to the list when a row was removed. An invalid id, a missing
/// record or one hidden by the where filter produce the failure page.
pub async fn delete_submit_handler<DB: DatabaseProvider>(
    State(state): State<Arc<CrudState<DB>>>,
    parts: Parts,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, CrudError> {
    state.authorize(Permission::Edit, &parts).await?;

    let spec = &state.spec;
    let raw_id = form.get("record_id").map(String::as_str).unwrap_or_default();

    if let Some(id) = parse_id(raw_id) {
        if delete_record(&state, &parts, &id).await? {
            tracing::info!(table = %spec.table, id = %id, "record deleted");
            return Ok(redirect(&spec.prefix));
        }
    } else {
        tracing::debug!(table = %spec.table, record_id = %raw_id, "invalid record id");
    }

    state.page(
        &format!("Delete {}", spec.record_title),
        &render_message(spec, &format!("Failed to delete {}", spec.record_title)),
    )
}

/// Delete one visible record; false when nothing was removed
async fn delete_record<DB: DatabaseProvider>(
    state: &CrudState<DB>,
    parts: &Parts,
    id: &str,
) -> Result<bool, CrudError> {
    let spec = &state.spec;
    let columns = state.columns().await?;
    let filter = spec.where_filter.resolve(parts);

    if state.load_record(columns, id, &filter).await?.is_none() {
        tracing::debug!(table = %spec.table, id = %id, "record to delete not found");
        return Ok(false);
    }

    let key = columns
        .get(&spec.key_column)
        .map(|key| FieldValue::typed(key.name.clone(), key_value(key, id), key.data_type.clone()))
        .ok_or_else(|| CrudError::Schema(format!("key column '{}' not found", spec.key_column)))?;

    match state.database.delete(&spec.table, &[key]).await {
        Ok(affected) => Ok(affected > 0),
        Err(error) => {
            tracing::error!(table = %spec.table, id = %id, %error, "delete failed");
            Ok(false)
        }
    }
}
