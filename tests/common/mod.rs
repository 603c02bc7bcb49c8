#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use reservation_api::{
    app_router,
    config::AppConfig,
    db,
    entities::{inventory, order, order_detail, product, reservation, setting, OrderStatus},
    message_queue::InMemoryMessageQueue,
    notifications::{InMemoryMailer, NotificationWorker, ReservationEmail},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use serde_json::Value;
use tower::ServiceExt;

pub const STAFF_EMAIL: &str = "staff@shop.test";
pub const APP_URL: &str = "https://shop.test";

/// Application wired against a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub queue: Arc<InMemoryMessageQueue>,
    pub mailer: InMemoryMailer,
    pub worker: NotificationWorker,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_mailer(InMemoryMailer::new()).await
    }

    /// Same as [`TestApp::new`] but delivering through `mailer`.
    pub async fn with_mailer(mailer: InMemoryMailer) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
            STAFF_EMAIL.to_string(),
        );
        cfg.app_url = APP_URL.to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let queue = Arc::new(InMemoryMessageQueue::new());
        let worker = NotificationWorker::new(
            queue.clone(),
            Arc::new(mailer.clone()),
            Duration::from_millis(10),
            Duration::ZERO,
        );

        let state = AppState::new(Arc::new(pool), cfg, queue.clone());
        let router = app_router(state.clone());

        Self {
            router,
            state,
            queue,
            mailer,
            worker,
        }
    }

    pub fn db(&self) -> &sea_orm::DatabaseConnection {
        &self.state.db
    }

    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.request(
            Request::builder()
                .method(Method::GET)
                .uri(uri)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
    }

    /// GET returning status and parsed JSON body.
    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let response = self.get(uri).await;
        let status = response.status();
        (status, body_json(response).await)
    }

    /// Form-encoded POST, optionally with a Referer.
    pub async fn post_form(&self, uri: &str, pairs: &[(&str, &str)], referer: Option<&str>) -> Response {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(referer) = referer {
            builder = builder.header(header::REFERER, referer);
        }
        self.request(builder.body(Body::from(body)).expect("failed to build request"))
            .await
    }

    /// Runs the notification worker once and returns every email delivered so far.
    pub async fn deliver_emails(&self) -> Vec<ReservationEmail> {
        self.worker
            .drain_once()
            .await
            .expect("notification worker pass failed");
        self.mailer.sent().await
    }

    pub async fn seed_product(&self, id: i32, name: &str, price: Decimal, img_path: Option<&str>) -> product::Model {
        product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            price: Set(price),
            img_path: Set(img_path.map(str::to_string)),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed product")
    }

    pub async fn seed_inventory(&self, product_id: i32, quantity: i32) -> inventory::Model {
        inventory::ActiveModel {
            product_id: Set(product_id),
            quantity: Set(quantity),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed inventory")
    }

    pub async fn set_product_price(&self, product: product::Model, price: Decimal) {
        let mut active: product::ActiveModel = product.into();
        active.price = Set(price);
        active.update(self.db()).await.expect("update product price");
    }

    pub async fn seed_setting(&self, key: &str, value: &str) {
        setting::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed setting");
    }

    /// Order with explicit timestamps so window and ordering tests are deterministic.
    pub async fn seed_order(
        &self,
        transaction_key: &str,
        status: OrderStatus,
        total: Decimal,
        updated_at: DateTime<Utc>,
    ) -> order::Model {
        order::ActiveModel {
            transaction_key: Set(transaction_key.to_string()),
            status: Set(status),
            total_amount: Set(total),
            created_at: Set(updated_at),
            updated_at: Set(updated_at),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed order")
    }

    pub async fn seed_detail(&self, order_id: i32, product_id: i32, quantity: i32, amount: Decimal) -> order_detail::Model {
        order_detail::ActiveModel {
            order_id: Set(order_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            amount: Set(amount),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed order detail")
    }

    pub async fn seed_reservation(&self, order: &order::Model, name: &str, pick_up_date: NaiveDate) -> reservation::Model {
        reservation::ActiveModel {
            transaction_key: Set(order.transaction_key.clone()),
            name: Set(name.to_string()),
            contact_number: Set("09171234567".to_string()),
            email: Set("customer@example.com".to_string()),
            coupon: Set(None),
            pick_up_date: Set(pick_up_date),
            order_id: Set(order.id),
            ..Default::default()
        }
        .insert(self.db())
        .await
        .expect("seed reservation")
    }

    pub async fn row_counts(&self) -> (u64, u64, u64) {
        let orders = order::Entity::find().count(self.db()).await.expect("count orders");
        let details = order_detail::Entity::find()
            .count(self.db())
            .await
            .expect("count order details");
        let reservations = reservation::Entity::find()
            .count(self.db())
            .await
            .expect("count reservations");
        (orders, details, reservations)
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect without Location")
        .to_str()
        .expect("non-ascii Location")
        .to_string()
}

/// Query pairs of a redirect target.
pub fn query_pairs(location: &str) -> Vec<(String, String)> {
    let query = location.split_once('?').map(|(_, q)| q).unwrap_or("");
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

pub fn query_value(location: &str, key: &str) -> Option<String> {
    query_pairs(location)
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}
