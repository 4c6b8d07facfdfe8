//! Page templating collaborator
//!
//! Handlers produce HTML fragments. When a `CrudSpec` names a template and a
//! renderer is attached, the fragment is handed to the renderer; otherwise
//! it is wrapped in the built-in layout.

use crate::error::CrudError;
use crate::render::html::layout;
use serde_json::{json, Value};

pub type TemplateResult = Result<String, Box<dyn std::error::Error + Send + Sync>>;

/// Renders a named template with a set of variables
pub trait TemplateRenderer: Send + Sync + 'static {
    /// # Arguments
    ///
    /// * `template` - Template name from `CrudSpec::template`
    /// * `variables` - Object with `title`, `content` (HTML) and `prefix`
    fn render(&self, template: &str, variables: &Value) -> TemplateResult;
}

impl<F> TemplateRenderer for F
where
    F: Fn(&str, &Value) -> TemplateResult + Send + Sync + 'static,
{
    fn render(&self, template: &str, variables: &Value) -> TemplateResult {
        self(template, variables)
    }
}

/// Produce the full page for a fragment
pub fn render_page(
    renderer: Option<&dyn TemplateRenderer>,
    template: Option<&str>,
    prefix: &str,
    title: &str,
    content: &str,
) -> Result<String, CrudError> {
    match (renderer, template) {
        (Some(renderer), Some(template)) => {
            let variables = json!({
                "title": title,
                "content": content,
                "prefix": prefix,
            });
            renderer
                .render(template, &variables)
                .map_err(|error| CrudError::Template(format!("{}: {}", template, error)))
        }
        _ => Ok(layout(title, content)),
    }
}
