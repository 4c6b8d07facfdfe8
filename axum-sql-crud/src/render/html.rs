//! HTML primitives shared by the renderers

use serde_json::Value;

/// Escape text for use in element content and double-quoted attributes
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Plain-text form of a column value; NULL renders as the empty string
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// `class="..."` attribute, or nothing
pub fn class_attribute(class: Option<&str>) -> String {
    match class {
        Some(class) if !class.is_empty() => format!(" class=\"{}\"", escape(class)),
        _ => String::new(),
    }
}

/// `<a href="...">label</a>` with both parts escaped
pub fn link(href: &str, label: &str) -> String {
    format!("<a href=\"{}\">{}</a>", escape(href), escape(label))
}

/// Wrap a fragment in the built-in page layout
pub fn layout(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; margin: 2em; }}
table {{ border-collapse: collapse; }}
th, td {{ border: 1px solid #ccc; padding: 0.3em 0.6em; text-align: left; }}
th.sorted {{ background: #eef; }}
.error {{ color: #b00; }}
.pagination a, .downloads a {{ margin-right: 1em; }}
</style>
</head>
<body>
<h1>{title}</h1>
{content}
</body>
</html>
"#,
        title = escape(title),
        content = content
    )
}
