//! BOMFlow API Library
//!
//! Core of the BOMFlow backend: catalog (materials, assemblies, groups,
//! templates), pricing roll-up, projects with timelines, uploads and
//! WhatsApp notifications.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer};
use utoipa::ToSchema;

use crate::auth::consts as perm;
use crate::auth::AuthRouterExt;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
    pub auth: Arc<auth::AuthService>,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        assert!(!response.success);
        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
    }
}

/// Routes mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    let users = handlers::users::user_routes().with_permission(perm::USERS_MANAGE);

    let catalog_read = Router::new()
        .merge(handlers::materials::read_routes())
        .merge(handlers::assembly_categories::read_routes())
        .merge(handlers::assemblies::read_routes())
        .merge(handlers::assembly_groups::read_routes())
        .merge(handlers::templates::read_routes())
        .with_permission(perm::CATALOG_READ);

    let catalog_write = Router::new()
        .merge(handlers::materials::write_routes())
        .merge(handlers::assembly_categories::write_routes())
        .merge(handlers::assemblies::write_routes())
        .merge(handlers::assembly_groups::write_routes())
        .merge(handlers::templates::write_routes())
        .with_permission(perm::CATALOG_WRITE);

    let projects_read = Router::new()
        .merge(handlers::clients::read_routes())
        .merge(handlers::projects::read_routes())
        .merge(handlers::timelines::read_routes())
        .merge(handlers::uploads::read_routes())
        .with_permission(perm::PROJECTS_READ);

    let projects_write = Router::new()
        .merge(handlers::clients::write_routes())
        .merge(handlers::projects::write_routes())
        .merge(handlers::timelines::write_routes())
        .merge(handlers::uploads::write_routes())
        .with_permission(perm::PROJECTS_WRITE);

    let notifications_read = Router::new()
        .route("/notifications", get(handlers::notifications::list_notifications))
        .with_permission(perm::PROJECTS_READ);

    let notifications_send = Router::new()
        .route(
            "/notifications/whatsapp",
            post(handlers::notifications::send_whatsapp),
        )
        .with_permission(perm::NOTIFICATIONS_SEND);

    // Verified by token / signature instead of a session
    let whatsapp_webhook = Router::new().route(
        "/webhooks/whatsapp",
        get(handlers::notifications::verify_webhook)
            .post(handlers::notifications::receive_webhook),
    );

    let session = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/password", post(handlers::auth::change_own_password))
        .with_auth();

    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .route("/auth/login", post(handlers::auth::login))
        .merge(session)
        .nest("/users", users)
        .merge(catalog_read)
        .merge(catalog_write)
        .merge(projects_read)
        .merge(projects_write)
        .merge(notifications_read)
        .merge(notifications_send)
        .merge(whatsapp_webhook)
}

/// Builds the complete application router with shared middleware.
pub fn app_router(state: AppState, cors_layer: CorsLayer) -> Router {
    let auth_service = state.auth.clone();
    let body_limit = state.config.max_upload_bytes + 64 * 1024;

    Router::<AppState>::new()
        .route("/", get(|| async { "bomflow-api up" }))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .layer(axum::middleware::from_fn(
            middleware_helpers::security_headers_middleware,
        ))
        // Inject AuthService into request extensions for auth middleware
        .layer(axum::middleware::from_fn_with_state(
            auth_service,
            |axum::extract::State(auth): axum::extract::State<Arc<auth::AuthService>>,
             mut req: axum::http::Request<axum::body::Body>,
             next: axum::middleware::Next| async move {
                req.extensions_mut().insert(auth);
                next.run(req).await
            },
        ))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "bomflow-api",
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
            "whatsapp": if state.config.whatsapp_enabled { "enabled" } else { "disabled" },
        },
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
