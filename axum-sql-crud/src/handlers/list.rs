//! List view and downloads

use crate::auth::Permission;
use crate::database::DatabaseProvider;
use crate::error::CrudError;
use crate::export::{download_basename, serialize, ExportFormat};
use crate::handlers::CrudState;
use crate::query::{compile, ListParams, RequestState};
use crate::render::html::{escape, link};
use crate::render::{render_download_links, render_pagination, render_search_form, render_table};
use axum::{
    extract::{Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Handler for GET {prefix}
///
/// Renders the list with search, sort and pagination, or encodes the same
/// row set when `format` is given. `downloadable` only controls the links.
///
/// Query parameters:
/// - q: search text
/// - searchfield: column to search (default: key column)
/// - searchtype: e, c, ne, nc, lt, lte, gt, gte (default: c)
/// - o / d: order column and direction
/// - p: zero-based page number
/// - format: csv, tabular, json or xml
pub async fn list_handler<DB: DatabaseProvider>(
    State(state): State<Arc<CrudState<DB>>>,
    parts: Parts,
    Query(params): Query<ListParams>,
) -> Result<Response, CrudError> {
    state.authorize(Permission::View, &parts).await?;

    let spec = &state.spec;
    let columns = state.columns().await?;
    let request = RequestState::from_params(params);
    let filter = spec.where_filter.resolve(&parts);

    if let Some(format) = &request.download_format {
        return download(&state, &request, &filter, format).await;
    }

    let include_actions = spec.editable && state.permits(Permission::Edit, &parts).await;
    let plan = compile(
        spec,
        columns,
        state.database.dialect(),
        &request,
        &filter,
        include_actions,
    )?;
    let sql = plan.to_sql();
    let table = render_table(spec, &plan, &request, state.database.execute(&sql, &plan.binds)).await?;

    let mut content = String::new();
    if spec.addable && state.permits(Permission::Edit, &parts).await {
        content.push_str(&format!(
            "<p class=\"add\">{}</p>\n",
            link(&format!("{}/add", spec.prefix), &format!("Add a new {}", spec.record_title))
        ));
    }
    if spec.searchable {
        content.push_str(&render_search_form(spec, columns, &request));
    }
    content.push_str(&table.html);
    if table.row_count == 0 {
        content.push_str(&format!(
            "<p class=\"empty\">No matching {} found.</p>\n",
            escape(&spec.record_title)
        ));
    }
    content.push_str(&render_pagination(spec, &request, table.row_count));
    if spec.downloadable {
        content.push_str(&render_download_links(spec, &request));
    }

    state.page(&spec.table, &content)
}

async fn download<DB: DatabaseProvider>(
    state: &CrudState<DB>,
    request: &RequestState,
    filter: &std::collections::BTreeMap<String, serde_json::Value>,
    format: &str,
) -> Result<Response, CrudError> {
    let Some(format) = ExportFormat::parse(format) else {
        let codes: Vec<&str> = ExportFormat::ALL.iter().map(|format| format.code()).collect();
        return Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!(
                "Unknown download format '{}'; expected one of: {}",
                format,
                codes.join(", ")
            ),
        )
            .into_response());
    };

    let spec = &state.spec;
    let columns = state.columns().await?;
    let plan = compile(spec, columns, state.database.dialect(), request, filter, false)?;
    let sql = plan.to_sql();
    let rows = state.database.execute(&sql, &plan.binds).collect_rows().await?;

    let column_names: Vec<String> = plan.data_columns().map(|(_, column)| column.alias.clone()).collect();
    let values: Vec<Vec<serde_json::Value>> = rows
        .iter()
        .map(|row| {
            plan.data_columns()
                .map(|(index, _)| row.values().get(index).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    let export = serialize(&values, &column_names, format, &download_basename(&spec.table, request))?;
    tracing::debug!(table = %spec.table, format = format.code(), rows = values.len(), "exported rows");

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, export.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.filename),
            ),
        ],
        export.body,
    )
        .into_response())
}
