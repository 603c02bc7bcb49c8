use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::Utc;

use super::common::PageQuery;
use crate::entities::order::{Model as OrderModel, OrderStatus};
use crate::services::orders::{DashboardSummary, OrderWithReservation, ReservationDetail};
use crate::{errors::ServiceError, ApiResponse, AppState, PaginatedResponse};

type OrderPage = Json<ApiResponse<PaginatedResponse<OrderModel>>>;

async fn list_in_status(
    state: &AppState,
    status: OrderStatus,
    query: PageQuery,
) -> Result<OrderPage, ServiceError> {
    let page = state
        .services
        .orders
        .list_by_status(status, query.page())
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

/// Dashboard: status counts, recent activity and the recent order feed.
#[utoipa::path(
    get,
    path = "/api/v1/reservations",
    summary = "Reservation dashboard",
    description = "Current order count per status, counts updated in the last 4 hours, and the orders updated in that window",
    responses(
        (status = 200, description = "Dashboard computed", body = ApiResponse<DashboardSummary>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "reservations"
)]
pub async fn dashboard(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DashboardSummary>>, ServiceError> {
    let summary = state.services.orders.dashboard(Utc::now()).await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations/pending",
    summary = "List pending orders",
    params(PageQuery),
    responses(
        (status = 200, description = "Page of pending orders, most recently updated first", body = ApiResponse<PaginatedResponse<OrderModel>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "reservations"
)]
pub async fn list_pending(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<OrderPage, ServiceError> {
    list_in_status(&state, OrderStatus::Pending, query).await
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations/processing",
    summary = "List processing orders",
    params(PageQuery),
    responses(
        (status = 200, description = "Page of processing orders, most recently updated first", body = ApiResponse<PaginatedResponse<OrderModel>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "reservations"
)]
pub async fn list_processing(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<OrderPage, ServiceError> {
    list_in_status(&state, OrderStatus::Processing, query).await
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations/ready-to-pickup",
    summary = "List orders ready to pick up",
    params(PageQuery),
    responses(
        (status = 200, description = "Page of orders ready for pickup, most recently updated first", body = ApiResponse<PaginatedResponse<OrderModel>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "reservations"
)]
pub async fn list_ready_to_pickup(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<OrderPage, ServiceError> {
    list_in_status(&state, OrderStatus::ReadyToPickup, query).await
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations/completed",
    summary = "List completed orders",
    params(PageQuery),
    responses(
        (status = 200, description = "Page of completed orders, most recently updated first", body = ApiResponse<PaginatedResponse<OrderModel>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "reservations"
)]
pub async fn list_completed(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<OrderPage, ServiceError> {
    list_in_status(&state, OrderStatus::Completed, query).await
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations/cancelled",
    summary = "List cancelled orders",
    params(PageQuery),
    responses(
        (status = 200, description = "Page of cancelled orders, most recently updated first", body = ApiResponse<PaginatedResponse<OrderModel>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "reservations"
)]
pub async fn list_cancelled(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<OrderPage, ServiceError> {
    list_in_status(&state, OrderStatus::Cancelled, query).await
}

/// Every order regardless of status, each with its reservation.
#[utoipa::path(
    get,
    path = "/api/v1/reservations/all",
    summary = "List all orders",
    params(PageQuery),
    responses(
        (status = 200, description = "Page of orders with their reservation", body = ApiResponse<PaginatedResponse<OrderWithReservation>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "reservations"
)]
pub async fn list_all(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderWithReservation>>>, ServiceError> {
    let page = state.services.orders.list_all(query.page()).await?;
    Ok(Json(ApiResponse::success(page)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations/{order_id}",
    summary = "Reservation detail",
    description = "The reservation for an order with its line items priced at current product prices",
    params(("order_id" = i32, Path, description = "Order identifier")),
    responses(
        (status = 200, description = "Reservation detail", body = ApiResponse<ReservationDetail>),
        (status = 404, description = "Order or reservation not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "reservations"
)]
pub async fn reservation_detail(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
) -> Result<Json<ApiResponse<ReservationDetail>>, ServiceError> {
    let detail = state.services.orders.reservation_detail(order_id).await?;
    Ok(Json(ApiResponse::success(detail)))
}
