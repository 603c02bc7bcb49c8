mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::TestApp;
use reservation_api::entities::OrderStatus;
use reservation_api::services::orders::{RecentCounts, StatusCounts};
use rust_decimal_macros::dec;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
}

async fn seed_mixed(app: &TestApp) {
    let at_boundary = app
        .seed_order("EDGE01", OrderStatus::Pending, dec!(100), now() - Duration::hours(4))
        .await;
    app.seed_detail(at_boundary.id, 1, 2, dec!(100)).await;

    app.seed_order(
        "STALE1",
        OrderStatus::Processing,
        dec!(40),
        now() - Duration::hours(4) - Duration::seconds(1),
    )
    .await;
    app.seed_order("CANC01", OrderStatus::Cancelled, dec!(15), now() - Duration::hours(1))
        .await;
    app.seed_order("DONE01", OrderStatus::Completed, dec!(70), now() - Duration::hours(10))
        .await;
    app.seed_order("READY1", OrderStatus::ReadyToPickup, dec!(25), now() - Duration::minutes(30))
        .await;
}

#[tokio::test]
async fn counts_every_status_and_windows_recent_updates() {
    let app = TestApp::new().await;
    app.seed_product(1, "Pan de Coco", dec!(50), None).await;
    seed_mixed(&app).await;

    let summary = app.state.services.orders.dashboard(now()).await.unwrap();

    assert_eq!(
        summary.counts,
        StatusCounts {
            pending: 1,
            processing: 1,
            ready_to_pickup: 1,
            completed: 1,
            cancelled: 1,
            total: 5,
        }
    );
    assert_eq!(
        summary.recent_updates,
        RecentCounts {
            pending: 1,
            processing: 0,
            ready_to_pickup: 1,
            completed: 0,
            cancelled: 1,
        }
    );
    assert_eq!(summary.window_start, now() - Duration::hours(4));
}

#[tokio::test]
async fn recent_feed_is_newest_first_with_details() {
    let app = TestApp::new().await;
    app.seed_product(1, "Pan de Coco", dec!(50), None).await;
    seed_mixed(&app).await;

    let summary = app.state.services.orders.dashboard(now()).await.unwrap();

    let keys: Vec<&str> = summary
        .recent_orders
        .iter()
        .map(|o| o.order.transaction_key.as_str())
        .collect();
    assert_eq!(keys, vec!["READY1", "CANC01", "EDGE01"]);

    let edge = &summary.recent_orders[2];
    assert_eq!(edge.order_details.len(), 1);
    assert_eq!(edge.order_details[0].quantity, 2);
    assert!(summary.recent_orders[0].order_details.is_empty());
}

#[tokio::test]
async fn empty_store_has_zero_counts() {
    let app = TestApp::new().await;

    let summary = app.state.services.orders.dashboard(now()).await.unwrap();
    assert_eq!(summary.counts, StatusCounts::default());
    assert_eq!(summary.recent_updates, RecentCounts::default());
    assert!(summary.recent_orders.is_empty());
}

#[tokio::test]
async fn dashboard_route_reports_counts() {
    let app = TestApp::new().await;
    app.seed_order("LIVE01", OrderStatus::Pending, dec!(10), Utc::now())
        .await;

    let (status, body) = app.get_json("/api/v1/reservations").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["counts"]["pending"], 1);
    assert_eq!(body["data"]["counts"]["total"], 1);
    assert_eq!(body["data"]["recent_updates"]["pending"], 1);
    assert_eq!(
        body["data"]["recent_orders"][0]["transaction_key"],
        "LIVE01"
    );
}
