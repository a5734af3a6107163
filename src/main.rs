use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use fieldops_api::database::manager::DatabaseManager;
use fieldops_api::middleware::{jwt_auth_middleware, tenant_gate_middleware};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = fieldops_api::config::config();
    tracing::info!("Starting FieldOps API in {:?} mode", config.environment);

    let app = app();

    // Allow tests or deployments to override port via env
    let port = std::env::var("FIELDOPS_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("FieldOps API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app() -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Public auth routes
        .merge(auth_public_routes())
        // Protected API behind JWT auth + tenant gate
        .merge(api_routes())
        // Tenant administration (JWT auth + root access, no tenant binding)
        .merge(root_routes())
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn auth_public_routes() -> Router {
    use fieldops_api::handlers::public::auth;

    Router::new().route("/auth/login/:tenant/:user", post(auth::session_login))
}

fn api_routes() -> Router {
    use fieldops_api::handlers::protected::{auth, data};

    Router::new()
        .route("/api/auth/whoami", get(auth::session_whoami))
        .route(
            "/api/data/objects",
            get(data::object_list).post(data::object_create),
        )
        // Layer order matters: jwt_auth runs first, the gate needs its claims
        // .layer(from_fn(tenant_gate_middleware))
        .layer(from_fn(jwt_auth_middleware))
}

fn root_routes() -> Router {
    use fieldops_api::handlers::root::tenant;

    Router::new()
        .route(
            "/api/root/tenant",
            get(tenant::tenant_list),
        )
        .route(
            "/api/root/tenant/:name",
            get(tenant::tenant_show).delete(tenant::tenant_delete),
        )
        .route("/api/root/tenant/:name/restore", post(tenant::tenant_restore))
        .layer(from_fn(jwt_auth_middleware))
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "FieldOps API",
            "version": version,
            "description": "Multi-tenant field operations backend",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "public_auth": "/auth/login/:tenant/:user (public - token acquisition)",
                "auth": "/api/auth/whoami (protected)",
                "data": "/api/data/objects (protected)",
                "root": "/api/root/tenant (restricted, requires root access)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
