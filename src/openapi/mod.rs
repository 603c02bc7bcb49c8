use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Reservation API",
        version = "0.1.0",
        description = r#"
# Reservation API

Customers reserve products for in-store pickup; staff follow each order
through its statuses.

## Order statuses

`pending` → `processing` → `ready to pickup` → `completed`, with
`cancelled` reachable from any non-terminal status.

## Creating a reservation

`POST /api/v1/reserve` takes a form-encoded body with product lines sent as
`products[<id>]=<quantity>`. It answers with a `303 See Other`: to the status
page on success, or back to the form with `errors[field]` and `old[field]`
query pairs when fields are rejected.

## Error Handling

JSON endpoints report failures as:

```json
{
  "error": "Not Found",
  "message": "Not found: Order 42 not found",
  "request_id": "5c1f...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

Listings take a 1-based `page` query parameter. Order listings hold 10
orders per page, the reservation-form catalog 9 products.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "reservations", description = "Reservation intake and order tracking"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Intake
        crate::handlers::reservations::reservation_form,
        crate::handlers::reservations::create_reservation,
        crate::handlers::reservations::check_status,
        // Staff views
        crate::handlers::orders::dashboard,
        crate::handlers::orders::list_pending,
        crate::handlers::orders::list_processing,
        crate::handlers::orders::list_ready_to_pickup,
        crate::handlers::orders::list_completed,
        crate::handlers::orders::list_cancelled,
        crate::handlers::orders::list_all,
        crate::handlers::orders::reservation_detail,
        // Health
        crate::api_status,
        crate::health_check,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,

            // Domain types
            crate::entities::order::Model,
            crate::entities::order::OrderStatus,
            crate::entities::order_detail::Model,
            crate::entities::reservation::Model,
            crate::services::orders::DashboardSummary,
            crate::services::orders::ReservationDetail,
            crate::services::products::CatalogItem,
            crate::services::reservations::ReservationStatus,
            crate::handlers::reservations::CheckStatusResponse,
            crate::handlers::reservations::ReservationFormBody,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
