//! Add, edit and view handlers

use crate::auth::Permission;
use crate::database::{DatabaseProvider, FieldValue};
use crate::error::CrudError;
use crate::form::{initial_values, render_form, save, validate, FieldSpec, FormParams, ValidationErrors};
use crate::handlers::{parse_id, redirect, CrudState};
use crate::query::{compile, key_value, RequestState};
use crate::render::html::escape;
use crate::render::{render_message, render_record};
use axum::{
    extract::{Path, State},
    http::request::Parts,
    response::Response,
    Form,
};
use std::collections::HashMap;
use std::sync::Arc;

impl<DB: DatabaseProvider> CrudState<DB> {
    fn form_page(
        &self,
        title: &str,
        message: Option<&str>,
        fields: &[FieldSpec],
        values: &FormParams,
        errors: &ValidationErrors,
        action: &str,
    ) -> Result<Response, CrudError> {
        let mut content = String::new();
        if let Some(message) = message {
            content.push_str(&format!("<p class=\"error\">{}</p>\n", escape(message)));
        }
        content.push_str(&render_form(fields, values, errors, action, &format!("Save {}", self.spec.record_title)));
        self.page(title, &content)
    }
}

/// Handler for GET {prefix}/add
pub async fn add_form_handler<DB: DatabaseProvider>(
    State(state): State<Arc<CrudState<DB>>>,
    parts: Parts,
) -> Result<Response, CrudError> {
    state.authorize(Permission::Edit, &parts).await?;

    let spec = &state.spec;
    let fields = state.overrides.fields(spec, state.columns().await?);
    let values = initial_values(&fields, None, None, &spec.default_values);

    state.form_page(
        &format!("Add {}", spec.record_title),
        None,
        &fields,
        &values,
        &ValidationErrors::new(),
        &format!("{}/add", spec.prefix),
    )
}

/// Handler for POST {prefix}/add
///
/// Inserts the record and redirects to the list, or redisplays the form
/// with validation messages or the save error.
pub async fn add_submit_handler<DB: DatabaseProvider>(
    State(state): State<Arc<CrudState<DB>>>,
    parts: Parts,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, CrudError> {
    state.authorize(Permission::Edit, &parts).await?;

    let spec = &state.spec;
    let fields = state.overrides.fields(spec, state.columns().await?);
    let submitted = FormParams::new(form);
    let title = format!("Add {}", spec.record_title);
    let action = format!("{}/add", spec.prefix);

    let (message, errors) = match validate(&fields, &submitted) {
        Ok(values) => {
            if save(state.database.as_ref(), spec, None, values).await {
                tracing::info!(table = %spec.table, "record created");
                return Ok(redirect(&spec.prefix));
            }
            (Some(format!("Unable to create {}", spec.record_title)), ValidationErrors::new())
        }
        Err(errors) => (None, errors),
    };

    let values = initial_values(&fields, None, Some(&submitted), &spec.default_values);
    state.form_page(&title, message.as_deref(), &fields, &values, &errors, &action)
}

/// Handler for GET {prefix}/edit/{id}
///
/// Returns 404 when the id is not a non-negative integer or no such record exists.
pub async fn edit_form_handler<DB: DatabaseProvider>(
    State(state): State<Arc<CrudState<DB>>>,
    parts: Parts,
    Path(raw_id): Path<String>,
) -> Result<Response, CrudError> {
    state.authorize(Permission::Edit, &parts).await?;

    let spec = &state.spec;
    let id = parse_id(&raw_id).ok_or_else(|| CrudError::NotFound(format!("{} {}", spec.record_title, raw_id)))?;
    let columns = state.columns().await?;
    let filter = spec.where_filter.resolve(&parts);
    let record = state
        .load_record(columns, &id, &filter)
        .await?
        .ok_or_else(|| CrudError::NotFound(format!("{} {}", spec.record_title, id)))?;

    let fields = state.overrides.fields(spec, columns);
    let stored = FormParams::from_row(&record);
    let values = initial_values(&fields, Some(&stored), None, &spec.default_values);

    state.form_page(
        &format!("Edit {}", spec.record_title),
        None,
        &fields,
        &values,
        &ValidationErrors::new(),
        &format!("{}/edit/{}", spec.prefix, id),
    )
}

/// Handler for POST {prefix}/edit/{id}
pub async fn edit_submit_handler<DB: DatabaseProvider>(
    State(state): State<Arc<CrudState<DB>>>,
    parts: Parts,
    Path(raw_id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, CrudError> {
    state.authorize(Permission::Edit, &parts).await?;

    let spec = &state.spec;
    let id = parse_id(&raw_id).ok_or_else(|| CrudError::NotFound(format!("{} {}", spec.record_title, raw_id)))?;
    let columns = state.columns().await?;
    let filter = spec.where_filter.resolve(&parts);
    let record = state
        .load_record(columns, &id, &filter)
        .await?
        .ok_or_else(|| CrudError::NotFound(format!("{} {}", spec.record_title, id)))?;

    let fields = state.overrides.fields(spec, columns);
    let submitted = FormParams::new(form);
    let title = format!("Edit {}", spec.record_title);
    let action = format!("{}/edit/{}", spec.prefix, id);

    let (message, errors) = match validate(&fields, &submitted) {
        Ok(values) => {
            // The record loaded above, so the key column exists
            let key = columns
                .get(&spec.key_column)
                .map(|key| FieldValue::typed(key.name.clone(), key_value(key, &id), key.data_type.clone()))
                .ok_or_else(|| CrudError::Schema(format!("key column '{}' not found", spec.key_column)))?;
            if save(state.database.as_ref(), spec, Some(key), values).await {
                tracing::info!(table = %spec.table, id = %id, "record updated");
                return Ok(redirect(&spec.prefix));
            }
            (Some(format!("Unable to update {}", spec.record_title)), ValidationErrors::new())
        }
        Err(errors) => (None, errors),
    };

    let stored = FormParams::from_row(&record);
    let values = initial_values(&fields, Some(&stored), Some(&submitted), &spec.default_values);
    state.form_page(&title, message.as_deref(), &fields, &values, &errors, &action)
}

/// Handler for GET {prefix}/view/{id}
pub async fn view_handler<DB: DatabaseProvider>(
    State(state): State<Arc<CrudState<DB>>>,
    parts: Parts,
    Path(raw_id): Path<String>,
) -> Result<Response, CrudError> {
    state.authorize(Permission::View, &parts).await?;

    let spec = &state.spec;
    let id = parse_id(&raw_id).ok_or_else(|| CrudError::NotFound(format!("{} {}", spec.record_title, raw_id)))?;
    let columns = state.columns().await?;
    let filter = spec.where_filter.resolve(&parts);

    let request = RequestState::for_record(&spec.key_column, &id);
    let plan = compile(spec, columns, state.database.dialect(), &request, &filter, false)?;
    let sql = plan.to_sql();
    let html = render_record(spec, &plan, state.database.execute(&sql, &plan.binds))
        .await?
        .ok_or_else(|| CrudError::NotFound(format!("{} {}", spec.record_title, id)))?;

    state.page(&format!("View {}", spec.record_title), &html)
}

/// Handler for GET {prefix}/view without an id
pub async fn view_missing_handler<DB: DatabaseProvider>(
    State(state): State<Arc<CrudState<DB>>>,
    parts: Parts,
) -> Result<Response, CrudError> {
    state.authorize(Permission::View, &parts).await?;

    let spec = &state.spec;
    let content = render_message(
        spec,
        &format!("You need to specify the id of the {} to view.", spec.record_title),
    );
    state.page(&format!("View {}", spec.record_title), &content)
}
