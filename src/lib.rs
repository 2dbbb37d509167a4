use axum::routing::{delete, get, post, put};
use axum::Router;
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod policy;
pub mod services;

pub fn app() -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(public_auth_routes())
        // Protected API
        .merge(protected_routes())
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn public_auth_routes() -> Router {
    use handlers::public::auth;

    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/invitations/accept", post(auth::accept_invitation))
}

fn protected_routes() -> Router {
    use handlers::protected::{auth, departments, invitations, notifications, orgs, projects, tickets};

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami))
        // Organizations
        .route("/api/orgs", get(orgs::list))
        .route("/api/orgs/:id", get(orgs::get))
        .route("/api/orgs/:id/members", get(orgs::members))
        // Departments
        .route(
            "/api/orgs/:id/departments",
            get(departments::list).post(departments::create),
        )
        .route("/api/departments/:id", delete(departments::delete))
        // Projects
        .route("/api/orgs/:id/projects", get(projects::list).post(projects::create))
        .route(
            "/api/projects/:id",
            get(projects::get).put(projects::update).delete(projects::delete),
        )
        .route(
            "/api/projects/:id/members",
            get(projects::members).post(projects::add_member),
        )
        .route("/api/projects/:id/members/:user_id", delete(projects::remove_member))
        .route("/api/projects/:id/shares", post(projects::add_share))
        .route("/api/projects/:id/shares/:department_id", delete(projects::remove_share))
        // Tickets
        .route("/api/projects/:id/tickets", get(tickets::list).post(tickets::create))
        .route(
            "/api/tickets/:id",
            get(tickets::get).put(tickets::update).delete(tickets::delete),
        )
        .route("/api/tickets/:id/assign", post(tickets::assign))
        .route("/api/tickets/:id/activity", get(tickets::activity))
        // Lookup tables
        .route("/api/orgs/:id/statuses", get(tickets::statuses))
        .route("/api/orgs/:id/priorities", get(tickets::priorities))
        // Invitations
        .route(
            "/api/orgs/:id/invitations",
            get(invitations::list).post(invitations::create),
        )
        .route("/api/invitations/:id", delete(invitations::revoke))
        // Notifications
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/:id/read", put(notifications::mark_read))
        // Bearer-token auth for everything above
        .layer(axum::middleware::from_fn(middleware::jwt_auth_middleware))
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Opsboard API",
            "version": version,
            "description": "Multi-tenant ticketing and project management API",
            "endpoints": {
                "home": "/ (public)",
                "auth": "/auth/register, /auth/login, /auth/refresh, /auth/invitations/accept (public)",
                "orgs": "/api/orgs[/:id] (protected)",
                "departments": "/api/orgs/:id/departments, /api/departments/:id (protected)",
                "projects": "/api/orgs/:id/projects, /api/projects/:id[/members|/shares] (protected)",
                "tickets": "/api/projects/:id/tickets, /api/tickets/:id[/assign|/activity] (protected)",
                "lookups": "/api/orgs/:id/statuses, /api/orgs/:id/priorities (protected)",
                "invitations": "/api/orgs/:id/invitations (protected)",
                "notifications": "/api/notifications (protected)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match db::Db::health_check().await {
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
