pub mod common;
pub mod orders;
pub mod reservations;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::message_queue::MessageQueue;
use crate::notifications::NotificationDispatcher;
use crate::services::{
    orders::OrderService, products::ProductService, reservations::ReservationService,
    settings::SettingsService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub products: Arc<ProductService>,
    pub reservations: Arc<ReservationService>,
}

impl AppServices {
    /// Wires every service against one pool. Email jobs go to `queue`.
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig, queue: Arc<dyn MessageQueue>) -> Self {
        let settings = SettingsService::new(db_pool.clone(), &config.staff_notification_email);
        let dispatcher = NotificationDispatcher::new(queue, config.notification_max_retries);

        Self {
            orders: Arc::new(OrderService::new(db_pool.clone(), &config.app_url)),
            products: Arc::new(ProductService::new(db_pool.clone(), &config.app_url)),
            reservations: Arc::new(ReservationService::new(db_pool, settings, dispatcher)),
        }
    }
}
