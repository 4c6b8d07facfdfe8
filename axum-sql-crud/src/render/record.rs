//! Single-record pages: detail view and delete confirmation

use crate::database::{DatabaseError, RowCursor};
use crate::query::QueryPlan;
use crate::render::html::{class_attribute, escape, link};
use crate::render::table::render_cell;
use crate::spec::CrudSpec;
use serde_json::Value;

/// Two-column field/value table for the first row of the cursor
///
/// Returns `None` when the query matched nothing.
pub async fn render_record(
    spec: &CrudSpec,
    plan: &QueryPlan,
    mut rows: RowCursor<'_>,
) -> Result<Option<String>, DatabaseError> {
    let Some(row) = rows.next().await else {
        return Ok(None);
    };
    let row = row?;

    let mut html = String::from("<table class=\"record\">\n");
    for (index, column) in plan.data_columns() {
        let value = row.values().get(index).unwrap_or(&Value::Null);
        html.push_str(&format!(
            "<tr><th>{}</th><td{}>{}</td></tr>\n",
            escape(&column.header),
            class_attribute(column.css_class.as_deref()),
            render_cell(spec, column.kind, value, &row)
        ));
    }
    html.push_str("</table>\n");
    html.push_str(&format!("<p>{}</p>\n", link(&spec.prefix, "Back to list")));

    Ok(Some(html))
}

/// POST form asking to confirm deletion of one record
pub fn render_delete_confirmation(spec: &CrudSpec, id: &str) -> String {
    format!(
        "<form method=\"post\" action=\"{action}\">\n\
         <p>Do you really wish to delete {title} {id}?</p>\n\
         <input type=\"hidden\" name=\"record_id\" value=\"{id}\">\n\
         <input type=\"submit\" value=\"Delete {title}\">\n\
         </form>\n\
         <p>{back}</p>\n",
        action = escape(&format!("{}/delete", spec.prefix)),
        title = escape(&spec.record_title),
        id = escape(id),
        back = link(&spec.prefix, "Cancel")
    )
}

/// A short status message with a link back to the list
pub fn render_message(spec: &CrudSpec, message: &str) -> String {
    format!(
        "<p class=\"message\">{}</p>\n<p>{}</p>\n",
        escape(message),
        link(&spec.prefix, "Back to list")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Dialect, ResultRow};
    use crate::query::{compile, RequestState};
    use crate::schema::{column, TableColumns};
    use futures_util::stream::{self, StreamExt};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_render_record() {
        let columns = TableColumns::new(vec![
            column("id", 1, "INTEGER", false),
            column("username", 2, "VARCHAR(32)", false),
        ]);
        let spec = CrudSpec::new("/users", "users").label("username", "Login");
        let state = RequestState::for_record("id", "2");
        let plan = compile(&spec, &columns, Dialect::Sqlite, &state, &BTreeMap::new(), false).unwrap();

        let names: Arc<[String]> = vec!["id".to_string(), "username".to_string()].into();
        let rows = vec![Ok(ResultRow::new(names, vec![json!(2), json!("bigpresh")]))];
        let html = render_record(&spec, &plan, RowCursor::new(stream::iter(rows).boxed()))
            .await
            .unwrap()
            .unwrap();

        assert!(html.contains("<tr><th>id</th><td>2</td></tr>"));
        assert!(html.contains("<tr><th>Login</th><td>bigpresh</td></tr>"));

        let empty = render_record(&spec, &plan, RowCursor::new(stream::iter(Vec::new()).boxed()))
            .await
            .unwrap();
        assert!(empty.is_none());
    }

    #[test]
    fn test_delete_confirmation_posts_record_id() {
        let spec = CrudSpec::new("/users", "users").record_title("user");
        let html = render_delete_confirmation(&spec, "2");
        assert!(html.contains("action=\"/users/delete\""));
        assert!(html.contains("<input type=\"hidden\" name=\"record_id\" value=\"2\">"));
        assert!(html.contains("delete user 2?"));
    }
}
