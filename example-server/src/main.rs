use async_trait::async_trait;
use axum::{extract::State, http::request::Parts, http::StatusCode, routing::get, Router};
use axum_sql_crud::{
    AccessRule, AuthConfig, AuthProvider, CrudLayer, CrudRoutes, CrudSpec, CustomColumn, ForeignKey,
    SqliteProvider,
};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod database;

#[derive(Clone)]
struct ApplicationState {
    pool: SqlitePool,
}

/// Demo identity: logged in when an `x-user` header is present, roles from a
/// comma separated `x-roles` header
struct HeaderAuth;

#[async_trait]
impl AuthProvider for HeaderAuth {
    async fn is_logged_in(&self, parts: &Parts) -> bool {
        parts.headers.contains_key("x-user")
    }

    async fn user_has_role(&self, parts: &Parts, role: &str) -> bool {
        parts
            .headers
            .get("x-roles")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|roles| roles.split(',').any(|candidate| candidate.trim() == role))
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("axum_sql_crud=debug,tower_http=info,example_server=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./example.db?mode=rwc".to_string());
    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:3000".to_string());

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    database::setup(&pool).await.expect("Failed to setup database");

    let specs = match std::env::var("CRUD_CONFIG") {
        Ok(path) => load_specs(&path),
        Err(_) => builtin_specs(),
    };

    // All layers share one provider
    let provider = Arc::new(SqliteProvider::new(pool.clone()));
    let mut routes = CrudRoutes::new();
    for spec in specs {
        let prefix = spec.prefix.clone();
        let layer = CrudLayer::with_shared_database(spec, provider.clone())
            .unwrap_or_else(|e| panic!("Invalid CRUD configuration for {}: {}", prefix, e))
            .with_auth(HeaderAuth);
        routes = routes
            .add(layer)
            .unwrap_or_else(|e| panic!("Invalid CRUD configuration for {}: {}", prefix, e));
        tracing::info!("CRUD screens available at http://{}{}", bind_address, prefix);
    }

    let application_state = ApplicationState { pool };

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/api/health", get(health_handler))
        .with_state(application_state)
        .merge(routes.into_router())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", bind_address, e));

    tracing::info!("Server running at http://{}", bind_address);

    axum::serve(listener, app).await.expect("Server error");
}

/// Specs from a JSON file holding an array of spec objects
fn load_specs(path: &str) -> Vec<CrudSpec> {
    let raw = std::fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path, e));
    serde_json::from_str(&raw).unwrap_or_else(|e| panic!("Failed to parse {}: {}", path, e))
}

fn builtin_specs() -> Vec<CrudSpec> {
    let users = CrudSpec::new("/users", "users")
        .record_title("user")
        .editable(true)
        .addable(true)
        .deletable(true)
        .downloadable(true)
        .paginate(20)
        .display_columns(["id", "username", "email", "group_id", "is_active"])
        .label("group_id", "Group")
        .foreign_key("group_id", ForeignKey::new("groups", "id", "name"))
        .custom_column(
            CustomColumn::new("Mail", "email")
                .transform(|value, _row| match value.as_str() {
                    Some(email) if !email.is_empty() => {
                        let email = email.replace('&', "&amp;").replace('<', "&lt;").replace('"', "&quot;");
                        format!("<a href=\"mailto:{email}\">{email}</a>")
                    }
                    _ => String::new(),
                })
                .column_class("mail"),
        )
        .auth(AuthConfig {
            edit: AccessRule::any_role(["admin"]),
            ..AuthConfig::default()
        })
        .post_save(|context| {
            tracing::info!(table = %context.table, action = ?context.action, success = ?context.success, "user saved");
        });

    let products = CrudSpec::new("/products", "products")
        .record_title("product")
        .editable(true)
        .addable(true)
        .downloadable(true)
        .paginate(25);

    let orders = CrudSpec::new("/orders", "orders")
        .record_title("order")
        .editable(true)
        .deletable(true)
        .foreign_key("user_id", ForeignKey::new("users", "id", "username"))
        .foreign_key("product_id", ForeignKey::new("products", "id", "name"))
        .auth(AuthConfig {
            all: AccessRule::login(),
            ..AuthConfig::default()
        });

    vec![users, products, orders]
}

async fn root_handler() -> &'static str {
    "Welcome to axum-sql-crud example server"
}

async fn health_handler(
    State(state): State<ApplicationState>,
) -> Result<(StatusCode, &'static str), StatusCode> {
    sqlx::query("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok((StatusCode::OK, "Server is healthy"))
}
