use axum::{
    extract::{Query, State},
    http::{header::REFERER, HeaderMap},
    response::{IntoResponse, Json, Redirect, Response},
    Form,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::{form_urlencoded, Url};
use utoipa::{IntoParams, ToSchema};

use super::common::PageQuery;
use crate::errors::{FieldErrors, ServiceError};
use crate::services::products::CatalogItem;
use crate::services::reservations::{ReservationForm, ReservationStatus};
use crate::{ApiResponse, AppState, PaginatedResponse};

/// Where the form lives; rejected submissions go back here when no usable Referer is sent.
pub const RESERVE_PATH: &str = "/api/v1/reserve";
pub const CHECK_STATUS_PATH: &str = "/api/v1/check-status";
pub const CREATED_MESSAGE: &str =
    "Reservation created successfully! You can check your status using the transaction key.";

/// Products offered on the reservation form.
#[utoipa::path(
    get,
    path = "/api/v1/reserve",
    summary = "Reservation form catalog",
    description = "Products with their stock, nine per page",
    params(PageQuery),
    responses(
        (status = 200, description = "Catalog page", body = ApiResponse<PaginatedResponse<CatalogItem>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "reservations"
)]
pub async fn reservation_form(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<CatalogItem>>>, ServiceError> {
    let catalog = state.services.products.catalog_page(query.page()).await?;
    Ok(Json(ApiResponse::success(catalog)))
}

/// Form-encoded reservation submission.
#[derive(Debug, Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct ReservationFormBody {
    #[schema(example = "Jane Doe")]
    name: String,
    #[schema(example = "09171234567")]
    contact_number: String,
    #[schema(example = "jane@example.com")]
    email: String,
    coupon: Option<String>,
    #[schema(example = "2024-06-11")]
    pick_up_date: String,
    /// Sent as `products[<product id>]=<quantity>` pairs.
    #[serde(rename = "products[id]")]
    products: Option<u32>,
}

#[utoipa::path(
    post,
    path = "/api/v1/reserve",
    summary = "Create reservation",
    description = "Stores the order, its lines and the reservation atomically, then queues the confirmation and staff emails",
    request_body(content = ReservationFormBody, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Created: redirects to the status page with the transaction key. Rejected: redirects back to the form with errors[field] and old[field] query pairs",
            headers(("Location" = String, description = "Redirect target"))
        ),
        (status = 404, description = "A selected product does not exist", body = crate::errors::ErrorResponse),
        (status = 409, description = "No unique transaction key could be allocated", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    tag = "reservations"
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, ServiceError> {
    let form = ReservationForm::from_pairs(pairs);
    let today = Local::now().date_naive();

    match state
        .services
        .reservations
        .create_reservation(&form, today)
        .await
    {
        Ok(receipt) => {
            let target = append_query(
                CHECK_STATUS_PATH,
                &[
                    ("transaction_key".to_string(), receipt.transaction_key),
                    ("success".to_string(), CREATED_MESSAGE.to_string()),
                ],
            );
            Ok(Redirect::to(&target).into_response())
        }
        Err(ServiceError::FieldErrors(errors)) => {
            let back = back_target(&headers);
            info!(redirect_to = %back, fields = %errors, "Redirecting rejected reservation back to form");
            Ok(Redirect::to(&append_query(&back, &error_pairs(&errors, &form))).into_response())
        }
        Err(other) => Err(other),
    }
}

/// Query parameters for the status page.
#[derive(Debug, Deserialize, IntoParams)]
pub struct CheckStatusQuery {
    /// Key printed on the confirmation email
    pub transaction_key: Option<String>,
    /// Flash message echoed back after a successful reservation
    pub success: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckStatusResponse {
    #[serde(flatten)]
    pub reservation: ReservationStatus,
    pub message: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/check-status",
    summary = "Check reservation status",
    params(CheckStatusQuery),
    responses(
        (status = 200, description = "Reservation status", body = ApiResponse<CheckStatusResponse>),
        (status = 400, description = "transaction_key missing", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown transaction key", body = crate::errors::ErrorResponse),
    ),
    tag = "reservations"
)]
pub async fn check_status(
    State(state): State<AppState>,
    Query(query): Query<CheckStatusQuery>,
) -> Result<Json<ApiResponse<CheckStatusResponse>>, ServiceError> {
    let key = query
        .transaction_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ServiceError::ValidationError("transaction_key is required".to_string()))?;

    let reservation = state
        .services
        .reservations
        .find_by_transaction_key(key)
        .await?;

    Ok(Json(ApiResponse::success(CheckStatusResponse {
        reservation,
        message: query.success,
    })))
}

/// Same-origin path and query of the Referer, minus any earlier error echo.
fn back_target(headers: &HeaderMap) -> String {
    let Some(referer) = headers.get(REFERER).and_then(|v| v.to_str().ok()) else {
        return RESERVE_PATH.to_string();
    };

    let parsed = if referer.starts_with('/') && !referer.starts_with("//") {
        Url::parse("http://localhost")
            .and_then(|base| base.join(referer))
            .ok()
    } else {
        Url::parse(referer).ok()
    };

    let Some(url) = parsed else {
        return RESERVE_PATH.to_string();
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.starts_with("errors[") && !key.starts_with("old["))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    append_query(url.path(), &kept)
}

fn error_pairs(errors: &FieldErrors, form: &ReservationForm) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = errors
        .iter()
        .filter_map(|(field, messages)| {
            messages
                .first()
                .map(|message| (format!("errors[{}]", field), message.clone()))
        })
        .collect();

    pairs.extend(
        form.old_input()
            .into_iter()
            .map(|(field, value)| (format!("old[{}]", field), value)),
    );
    pairs
}

fn append_query(path: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return path.to_string();
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}{query}")
}
