mod common;

use axum::http::StatusCode;
use chrono::{NaiveDate, TimeZone, Utc};
use common::TestApp;
use reservation_api::entities::OrderStatus;
use rust_decimal_macros::dec;

fn pick_up() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

#[tokio::test]
async fn detail_prices_lines_at_current_product_price() {
    let app = TestApp::new().await;
    let cake = app
        .seed_product(5, "Ube Cake", dec!(1250), Some("images/ube.png"))
        .await;
    app.seed_product(7, "Ensaymada", dec!(45), None).await;

    let order = app
        .seed_order(
            "DTL001",
            OrderStatus::ReadyToPickup,
            dec!(2545),
            Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap(),
        )
        .await;
    app.seed_detail(order.id, 5, 2, dec!(2500)).await;
    app.seed_detail(order.id, 7, 1, dec!(45)).await;
    app.seed_reservation(&order, "Jane Doe", pick_up()).await;

    app.set_product_price(cake, dec!(1300)).await;

    let (status, body) = app
        .get_json(&format!("/api/v1/reservations/{}", order.id))
        .await;
    assert_eq!(status, StatusCode::OK);

    let data = &body["data"];
    assert_eq!(data["reservation"]["status"], "ready to pickup");
    assert_eq!(data["reservation"]["name"], "Jane Doe");
    assert_eq!(data["reservation"]["order"]["transaction_key"], "DTL001");
    assert_eq!(
        data["reservation"]["order"]["order_details"][0]["product"]["name"],
        "Ube Cake"
    );

    let lines = data["order_details"].as_array().expect("line summaries");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["product_name"], "Ube Cake");
    assert_eq!(lines[0]["product_price"], "1,300.00");
    assert_eq!(lines[0]["quantity"], 2);
    assert_eq!(lines[0]["subtotal"], "2,600.00");
    assert_eq!(lines[0]["product_image"], "https://shop.test/images/ube.png");

    assert_eq!(lines[1]["product_price"], "45.00");
    assert_eq!(lines[1]["subtotal"], "45.00");
    assert!(lines[1]["product_image"].is_null());
}

#[tokio::test]
async fn thousands_are_grouped_in_line_prices() {
    let app = TestApp::new().await;
    app.seed_product(3, "Lechon Belly", dec!(1250), None).await;
    let order = app
        .seed_order("DTL002", OrderStatus::Pending, dec!(1250), Utc::now())
        .await;
    app.seed_detail(order.id, 3, 1, dec!(1250)).await;
    app.seed_reservation(&order, "Juan Cruz", pick_up()).await;

    let detail = app
        .state
        .services
        .orders
        .reservation_detail(order.id)
        .await
        .unwrap();

    assert_eq!(detail.order_details[0].product_price, "1,250.00");
    assert_eq!(detail.order_details[0].subtotal, "1,250.00");
    assert_eq!(detail.reservation.status, OrderStatus::Pending);
    assert_eq!(detail.reservation.reservation.transaction_key, "DTL002");
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;

    let (status, body) = app.get_json("/api/v1/reservations/4242").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn order_without_reservation_is_not_found() {
    let app = TestApp::new().await;
    let order = app
        .seed_order("NORSV1", OrderStatus::Pending, dec!(0), Utc::now())
        .await;

    let (status, _) = app
        .get_json(&format!("/api/v1/reservations/{}", order.id))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_numeric_order_id_is_rejected() {
    let app = TestApp::new().await;

    let response = app.get("/api/v1/reservations/abc").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
