//! HTML rendering of the list view

use crate::database::{DatabaseError, ResultRow, RowCursor};
use crate::export::ExportFormat;
use crate::query::{ColumnKind, QueryPlan, RequestState, SearchType, SortDirection};
use crate::render::html::{class_attribute, escape, link, value_to_text};
use crate::schema::TableColumns;
use crate::spec::CrudSpec;
use serde_json::Value;

/// Rendered `<table>` plus the number of rows it holds
#[derive(Debug, Clone)]
pub struct RenderedTable {
    pub html: String,
    pub row_count: usize,
}

/// Drain the cursor into an HTML table laid out by the plan
pub async fn render_table(
    spec: &CrudSpec,
    plan: &QueryPlan,
    state: &RequestState,
    mut rows: RowCursor<'_>,
) -> Result<RenderedTable, DatabaseError> {
    let mut html = format!(
        "<table{}>\n<thead>\n{}</thead>\n<tbody>\n",
        class_attribute(spec.table_css_class.as_deref()),
        render_header(spec, plan, state)
    );

    let mut row_count = 0;
    while let Some(row) = rows.next().await {
        html.push_str(&render_row(spec, plan, &row?));
        row_count += 1;
    }
    html.push_str("</tbody>\n</table>\n");

    Ok(RenderedTable { html, row_count })
}

fn render_header(spec: &CrudSpec, plan: &QueryPlan, state: &RequestState) -> String {
    let mut html = String::from("<tr>");

    for (_, column) in plan.visible_columns() {
        let sort = plan
            .active_sort
            .as_ref()
            .filter(|_| column.kind != ColumnKind::Actions);
        let Some(sort) = sort else {
            html.push_str(&format!("<th>{}</th>", escape(&column.header)));
            continue;
        };

        // Clicking the active column flips it, any other column starts ascending
        if sort.column == column.key {
            let href = state.sort_href(&spec.prefix, &column.key, sort.direction.toggled());
            html.push_str(&format!(
                "<th class=\"sorted\">{} {}</th>",
                link(&href, &column.header),
                sort.direction.arrow()
            ));
        } else {
            let href = state.sort_href(&spec.prefix, &column.key, SortDirection::Asc);
            html.push_str(&format!("<th>{}</th>", link(&href, &column.header)));
        }
    }

    html.push_str("</tr>\n");
    html
}

fn render_row(spec: &CrudSpec, plan: &QueryPlan, row: &ResultRow) -> String {
    let mut html = String::from("<tr>");

    for (index, column) in plan.visible_columns() {
        let value = row.values().get(index).unwrap_or(&Value::Null);
        html.push_str(&format!(
            "<td{}>{}</td>",
            class_attribute(column.css_class.as_deref()),
            render_cell(spec, column.kind, value, row)
        ));
    }

    html.push_str("</tr>\n");
    html
}

/// Cell content; transform output is markup, everything else is escaped text
pub(crate) fn render_cell(spec: &CrudSpec, kind: ColumnKind, value: &Value, row: &ResultRow) -> String {
    match kind {
        ColumnKind::Custom(index) => match spec
            .custom_columns
            .get(index)
            .and_then(|custom| custom.transform.as_ref())
        {
            Some(transform) => transform.apply(value, row),
            None => escape(&value_to_text(value)),
        },
        ColumnKind::Actions => action_links(spec, &value_to_text(value)),
        _ => escape(&value_to_text(value)),
    }
}

fn action_links(spec: &CrudSpec, id: &str) -> String {
    let mut links = vec![
        link(&format!("{}/view/{}", spec.prefix, id), "View"),
        link(&format!("{}/edit/{}", spec.prefix, id), "Edit"),
    ];
    if spec.deletable {
        links.push(link(&format!("{}/delete/{}", spec.prefix, id), "Delete"));
    }
    links.join(" ")
}

/// GET form for the search box, carrying the current ordering
pub fn render_search_form(spec: &CrudSpec, columns: &TableColumns, state: &RequestState) -> String {
    let selected_field = state
        .search_field
        .as_deref()
        .filter(|field| columns.contains(field))
        .unwrap_or(&spec.key_column);

    let mut html = format!(
        "<form method=\"get\" action=\"{}\" class=\"search\">\n<select name=\"searchfield\">",
        escape(&spec.prefix)
    );
    for column in columns.iter() {
        html.push_str(&option(
            &column.name,
            &spec.label_for(&column.name),
            column.name == selected_field,
        ));
    }
    html.push_str("</select>\n<select name=\"searchtype\">");
    for search_type in SearchType::ALL {
        html.push_str(&option(
            search_type.code(),
            search_type.description(),
            search_type == state.search_type,
        ));
    }
    html.push_str(&format!(
        "</select>\n<input type=\"text\" name=\"q\" value=\"{}\">\n",
        escape(state.query_text.as_deref().unwrap_or_default())
    ));
    if let Some(order_column) = &state.order_column {
        html.push_str(&format!(
            "<input type=\"hidden\" name=\"o\" value=\"{}\">\n<input type=\"hidden\" name=\"d\" value=\"{}\">\n",
            escape(order_column),
            state.order_direction
        ));
    }
    html.push_str("<input type=\"submit\" value=\"Search\">\n</form>\n");

    if let Some(query_text) = &state.query_text {
        html.push_str(&format!(
            "<p class=\"search-status\">Showing results matching '{}' ({})</p>\n",
            escape(query_text),
            link(&state.reset_search_href(&spec.prefix), "reset search")
        ));
    }

    html
}

fn option(value: &str, label: &str, selected: bool) -> String {
    format!(
        "<option value=\"{}\"{}>{}</option>",
        escape(value),
        if selected { " selected" } else { "" },
        escape(label)
    )
}

/// Previous / next links; a next page is offered while pages come back full
pub fn render_pagination(spec: &CrudSpec, state: &RequestState, row_count: usize) -> String {
    let Some(page_size) = spec.paginate_size else {
        return String::new();
    };

    let mut links = Vec::new();
    if state.page_number > 0 {
        links.push(link(&state.page_href(&spec.prefix, state.page_number - 1), "Previous"));
    }
    if row_count as u64 == page_size {
        links.push(link(&state.page_href(&spec.prefix, state.page_number + 1), "Next"));
    }

    if links.is_empty() {
        return String::new();
    }
    format!("<p class=\"pagination\">{}</p>\n", links.join(" "))
}

/// One link per export format, each carrying the current view state
pub fn render_download_links(spec: &CrudSpec, state: &RequestState) -> String {
    let links: Vec<String> = ExportFormat::ALL
        .iter()
        .map(|format| link(&state.download_href(&spec.prefix, format.code()), format.label()))
        .collect();
    format!("<p class=\"downloads\">Download as: {}</p>\n", links.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Dialect;
    use crate::query::compile;
    use crate::schema::column;
    use crate::spec::{CustomColumn, ForeignKey};
    use futures_util::stream::{self, StreamExt};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn users() -> TableColumns {
        TableColumns::new(vec![
            column("id", 1, "INTEGER", false),
            column("username", 2, "VARCHAR(32)", false),
        ])
    }

    fn cursor(plan: &QueryPlan, rows: Vec<Vec<Value>>) -> RowCursor<'static> {
        let names: Arc<[String]> = plan.columns.iter().map(|column| column.alias.clone()).collect();
        let rows: Vec<Result<ResultRow, DatabaseError>> = rows
            .into_iter()
            .map(|values| Ok(ResultRow::new(names.clone(), values)))
            .collect();
        RowCursor::new(stream::iter(rows).boxed())
    }

    #[tokio::test]
    async fn test_renders_cells_and_actions() {
        let spec = CrudSpec::new("/users", "users")
            .editable(true)
            .deletable(true)
            .custom_column(
                CustomColumn::new("shout", "username")
                    .transform(|value, row| {
                        format!(
                            "<b>{}</b>#{}",
                            value_to_text(value).to_uppercase(),
                            value_to_text(row.get("id").unwrap_or(&Value::Null))
                        )
                    })
                    .column_class("loud"),
            );
        let state = RequestState::default();
        let plan = compile(&spec, &users(), Dialect::Sqlite, &state, &BTreeMap::new(), true).unwrap();

        let table = render_table(
            &spec,
            &plan,
            &state,
            cursor(&plan, vec![vec![json!(1), json!("<sukria>"), json!("<sukria>"), json!(1)]]),
        )
        .await
        .unwrap();

        assert_eq!(table.row_count, 1);
        assert!(table.html.contains("<td>&lt;sukria&gt;</td>"));
        assert!(table.html.contains("<td class=\"loud\"><b><SUKRIA></b>#1</td>"));
        assert!(table.html.contains(
            "<a href=\"/users/view/1\">View</a> <a href=\"/users/edit/1\">Edit</a> <a href=\"/users/delete/1\">Delete</a>"
        ));
        assert!(table.html.contains("<th>actions</th>"));
    }

    #[tokio::test]
    async fn test_header_sort_links_toggle_relative_to_active_column() {
        let spec = CrudSpec::new("/users", "users").label("username", "Login");
        let state = RequestState {
            order_column: Some("username".into()),
            order_direction: SortDirection::Desc,
            page_number: 1,
            ..RequestState::default()
        };
        let plan = compile(&spec, &users(), Dialect::Sqlite, &state, &BTreeMap::new(), false).unwrap();
        let table = render_table(&spec, &plan, &state, cursor(&plan, vec![])).await.unwrap();

        assert!(table
            .html
            .contains("<th class=\"sorted\"><a href=\"/users?o=username&amp;d=asc&amp;p=1\">Login</a> \u{25BC}</th>"));
        assert!(table
            .html
            .contains("<th><a href=\"/users?o=id&amp;d=asc&amp;p=1\">id</a></th>"));
        assert_eq!(table.row_count, 0);
    }

    #[tokio::test]
    async fn test_foreign_label_is_escaped() {
        let columns = TableColumns::new(vec![
            column("id", 1, "INTEGER", false),
            column("group_id", 2, "INTEGER", true),
        ]);
        let spec = CrudSpec::new("/users", "users")
            .sortable(false)
            .foreign_key("group_id", ForeignKey::new("groups", "id", "name"));
        let state = RequestState::default();
        let plan = compile(&spec, &columns, Dialect::Sqlite, &state, &BTreeMap::new(), false).unwrap();
        let table = render_table(
            &spec,
            &plan,
            &state,
            cursor(&plan, vec![vec![json!(1), json!("A&B"), json!(7)]]),
        )
        .await
        .unwrap();

        assert!(table.html.contains("<th>group_id</th>"));
        assert!(table.html.contains("<tr><td>1</td><td>A&amp;B</td></tr>"));
        assert!(!table.html.contains("group_id_key"));
    }

    #[test]
    fn test_pagination_links() {
        let spec = CrudSpec::new("/users", "users").paginate(5);
        let state = RequestState {
            page_number: 1,
            ..RequestState::default()
        };
        let html = render_pagination(&spec, &state, 5);
        assert!(html.contains("<a href=\"/users\">Previous</a>"));
        assert!(html.contains("<a href=\"/users?p=2\">Next</a>"));

        let html = render_pagination(&spec, &RequestState::default(), 3);
        assert!(html.is_empty());

        let unpaginated = CrudSpec::new("/users", "users");
        assert!(render_pagination(&unpaginated, &state, 5).is_empty());
    }

    #[test]
    fn test_search_form_keeps_ordering() {
        let spec = CrudSpec::new("/users", "users");
        let state = RequestState {
            search_field: Some("username".into()),
            query_text: Some("big\"presh".into()),
            order_column: Some("id".into()),
            order_direction: SortDirection::Desc,
            ..RequestState::default()
        };
        let html = render_search_form(&spec, &users(), &state);

        assert!(html.contains("<option value=\"username\" selected>username</option>"));
        assert!(html.contains("<option value=\"c\" selected>contains</option>"));
        assert!(html.contains("value=\"big&quot;presh\""));
        assert!(html.contains("<input type=\"hidden\" name=\"d\" value=\"desc\">"));
        assert!(html.contains("<a href=\"/users?o=id&amp;d=desc\">reset search</a>"));
    }

    #[test]
    fn test_download_links() {
        let spec = CrudSpec::new("/users", "users");
        let html = render_download_links(&spec, &RequestState::default());
        assert!(html.contains("<a href=\"/users?format=csv\">CSV</a>"));
        assert!(html.contains("<a href=\"/users?format=tabular\">TSV</a>"));
        assert!(html.contains("<a href=\"/users?format=xml\">XML</a>"));
    }
}
