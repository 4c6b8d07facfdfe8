//! Typed errors and HTTP mapping.

use crate::database::DatabaseError;
use crate::export::ExportError;
use crate::render::html::escape;
use axum::{
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

/// Problems with a `CrudSpec`, detected when a layer is constructed
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid identifier for {context}: '{value}'")]
    InvalidIdentifier { context: String, value: String },
    #[error("invalid prefix '{0}': must start with '/' and contain no spaces")]
    InvalidPrefix(String),
    #[error("invalid validation rule for column {column}: {message}")]
    InvalidValidationRule { column: String, message: String },
    #[error("unknown input type '{input_type}' for column {column}")]
    UnknownInputType { column: String, input_type: String },
    #[error("duplicate prefix: {0}")]
    DuplicatePrefix(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

/// Request-time failures, converted to a response at the handler boundary
#[derive(Error, Debug)]
pub enum CrudError {
    #[error("schema error: {0}")]
    Schema(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied")]
    Forbidden,
    #[error("login required")]
    LoginRequired { login_url: String },
    #[error("template error: {0}")]
    Template(String),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

impl From<DatabaseError> for CrudError {
    fn from(error: DatabaseError) -> Self {
        CrudError::Schema(error.to_string())
    }
}

impl IntoResponse for CrudError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            // Driver and template details stay in the log
            CrudError::Schema(_) | CrudError::Template(_) | CrudError::Export(_) => {
                tracing::error!(error = %self, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            CrudError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            CrudError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            CrudError::LoginRequired { login_url } => {
                return (StatusCode::FOUND, [(header::LOCATION, login_url.clone())]).into_response();
            }
        };

        let body = format!(
            "<!DOCTYPE html>\n<html><head><title>{code}</title></head><body><h1>{code}</h1><p>{message}</p></body></html>",
            code = status,
            message = escape(&message)
        );
        (status, Html(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            CrudError::NotFound("7".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(CrudError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            CrudError::Schema("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let response = CrudError::LoginRequired {
            login_url: "/login?return_url=%2Fusers".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/login?return_url=%2Fusers"
        );
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let response = CrudError::Schema("no such table: secret_audit_log".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("Internal server error"));
        assert!(!body.contains("secret_audit_log"));
    }

    #[test]
    fn test_database_error_becomes_schema_error() {
        let error: CrudError = DatabaseError::TableNotFound("users".into()).into();
        assert!(matches!(error, CrudError::Schema(message) if message.contains("users")));
    }
}
