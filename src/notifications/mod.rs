/*!
 * # Notifications
 *
 * Reservation emails are rendered here, queued on the shared message
 * queue by [`NotificationDispatcher`] and delivered in the background by
 * [`NotificationWorker`], which retries failed sends with exponential
 * backoff.
 */

mod email;
mod mailer;
mod worker;

pub use email::ReservationEmail;
pub use mailer::{mailer_from_config, InMemoryMailer, LogMailer, Mailer, SmtpMailer};
pub use worker::{DrainReport, NotificationDispatcher, NotificationWorker, EMAIL_TOPIC};

use crate::errors::ServiceError;
use crate::message_queue::MessageQueueError;
use thiserror::Error;

/// Notification errors
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
    #[error("Mail transport error: {0}")]
    Transport(String),
    #[error("Mail configuration error: {0}")]
    Configuration(String),
    #[error("Queue error: {0}")]
    Queue(#[from] MessageQueueError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NotificationError {
    /// Whether another attempt could succeed. Bad addresses and payloads fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, NotificationError::Transport(_) | NotificationError::Queue(_))
    }
}

impl From<NotificationError> for ServiceError {
    fn from(err: NotificationError) -> Self {
        ServiceError::NotificationError(err.to_string())
    }
}
