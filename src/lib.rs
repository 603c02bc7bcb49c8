//! Reservation API Library
//!
//! Product reservations for in-store pickup: intake, staff order views and
//! queued customer/staff notifications.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod message_queue;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::message_queue::MessageQueue;
use crate::notifications::EMAIL_TOPIC;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub queue: Arc<dyn MessageQueue>,
}

impl AppState {
    /// Builds the services for `db` and `queue`.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), &config, queue.clone());
        Self {
            db,
            config,
            services,
            queue,
        }
    }
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

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// Zero-based index of `page`, or `None` when the page starts past the last of `total` items.
pub fn page_index(page: u64, limit: u64, total: u64) -> Option<u64> {
    let index = page.max(1) - 1;
    index
        .checked_mul(limit)
        .filter(|offset| *offset < total)
        .map(|_| index)
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, page: u64, limit: u64, total: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
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

    #[test]
    fn page_index_stops_at_the_last_item() {
        assert_eq!(page_index(1, 10, 21), Some(0));
        assert_eq!(page_index(0, 10, 21), Some(0));
        assert_eq!(page_index(3, 10, 21), Some(2));
        assert_eq!(page_index(4, 10, 21), None);
        assert_eq!(page_index(1, 10, 0), None);
        assert_eq!(page_index(u64::MAX, 10, 21), None);
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(PaginatedResponse::new(vec![1, 2], 1, 10, 21).total_pages, 3);
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 1, 10, 0).total_pages, 0);
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 2, 10, 10).total_pages, 1);
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Every `/api/v1` route.
pub fn api_v1_routes() -> Router<AppState> {
    let intake = Router::new()
        .route(
            "/reserve",
            get(handlers::reservations::reservation_form)
                .post(handlers::reservations::create_reservation),
        )
        .route("/check-status", get(handlers::reservations::check_status));

    // static segments win over `:order_id`
    let staff = Router::new()
        .route("/reservations", get(handlers::orders::dashboard))
        .route("/reservations/pending", get(handlers::orders::list_pending))
        .route(
            "/reservations/processing",
            get(handlers::orders::list_processing),
        )
        .route(
            "/reservations/ready-to-pickup",
            get(handlers::orders::list_ready_to_pickup),
        )
        .route(
            "/reservations/completed",
            get(handlers::orders::list_completed),
        )
        .route(
            "/reservations/cancelled",
            get(handlers::orders::list_cancelled),
        )
        .route("/reservations/all", get(handlers::orders::list_all))
        .route(
            "/reservations/:order_id",
            get(handlers::orders::reservation_detail),
        );

    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(intake)
        .merge(staff)
}

/// The API with request ids, HTTP tracing and Swagger UI, bound to `state`.
pub fn app_router(state: AppState) -> Router {
    Router::<AppState>::new()
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/v1/status",
    summary = "Service status",
    responses((status = 200, description = "Build and environment information", body = ApiResponse<Value>)),
    tag = "Health"
)]
async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git": option_env!("GIT_HASH").unwrap_or("unknown"),
        "service": "reservation-api",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
    });

    Ok(Json(ApiResponse::success(status_data)))
}

#[utoipa::path(
    get,
    path = "/api/v1/health",
    summary = "Health check",
    responses((status = 200, description = "Database and notification queue health", body = ApiResponse<Value>)),
    tag = "Health"
)]
async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match crate::db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    };

    let (queue_status, pending_emails) = match state.queue.pending(EMAIL_TOPIC).await {
        Ok(pending) => ("healthy", Some(pending)),
        Err(e) => {
            ::tracing::warn!(error = %e, "Notification queue health probe failed");
            ("unhealthy", None)
        }
    };

    let health_data = json!({
        "status": if db_status == "healthy" && queue_status == "healthy" { "healthy" } else { "unhealthy" },
        "checks": {
            "database": db_status,
            "message_queue": queue_status,
        },
        "pending_emails": pending_emails,
        "timestamp": Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
