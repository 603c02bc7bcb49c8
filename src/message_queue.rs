/*!
 * # Message Queue
 *
 * Topic-addressed queue used to hand work from request handlers to
 * background workers. Messages are leased by `subscribe` and settled
 * with `ack`; a retry is published again as a new delivery.
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

const DEFAULT_MAX_SIZE: usize = 1000;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Message queue errors
#[derive(Error, Debug)]
pub enum MessageQueueError {
    #[error("Queue is full")]
    QueueFull,
    #[error("Unknown message: {0}")]
    UnknownMessage(Uuid),
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for MessageQueueError {
    fn from(err: serde_json::Error) -> Self {
        MessageQueueError::SerializationError(err.to_string())
    }
}

impl From<MessageQueueError> for crate::errors::ServiceError {
    fn from(err: MessageQueueError) -> Self {
        crate::errors::ServiceError::QueueError(err.to_string())
    }
}

/// Message envelope for queue items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Not handed out by `subscribe` before this instant.
    #[serde(default)]
    pub deliver_after: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            deliver_after: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Copy of this message scheduled for another delivery attempt.
    pub fn next_attempt(&self, deliver_after: DateTime<Utc>) -> Self {
        Self {
            retry_count: self.retry_count + 1,
            deliver_after: Some(deliver_after),
            ..self.clone()
        }
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.deliver_after.map_or(true, |at| at <= now)
    }
}

/// Message queue trait for different implementations
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError>;
    /// Leases the oldest due message on `topic`, if any.
    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError>;
    async fn ack(&self, message_id: &Uuid) -> Result<(), MessageQueueError>;
    /// Messages waiting on `topic`, leased ones excluded.
    async fn pending(&self, topic: &str) -> Result<usize, MessageQueueError>;
}

#[derive(Debug, Default)]
struct QueueState {
    topics: HashMap<String, VecDeque<Message>>,
    in_flight: HashMap<Uuid, Message>,
}

/// In-memory message queue implementation
#[derive(Debug, Clone)]
pub struct InMemoryMessageQueue {
    state: Arc<Mutex<QueueState>>,
    max_size: usize,
}

impl Default for InMemoryMessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            max_size,
        }
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish(&self, message: Message) -> Result<(), MessageQueueError> {
        let mut state = self.state.lock().await;
        let queue = state.topics.entry(message.topic.clone()).or_default();

        if queue.len() >= self.max_size {
            return Err(MessageQueueError::QueueFull);
        }

        queue.push_back(message);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Option<Message>, MessageQueueError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let leased = state.topics.get_mut(topic).and_then(|queue| {
            let position = queue.iter().position(|m| m.is_due(now))?;
            queue.remove(position)
        });

        if let Some(message) = &leased {
            state.in_flight.insert(message.id, message.clone());
        }
        Ok(leased)
    }

    async fn ack(&self, message_id: &Uuid) -> Result<(), MessageQueueError> {
        let mut state = self.state.lock().await;
        state
            .in_flight
            .remove(message_id)
            .map(|_| ())
            .ok_or(MessageQueueError::UnknownMessage(*message_id))
    }

    async fn pending(&self, topic: &str) -> Result<usize, MessageQueueError> {
        let state = self.state.lock().await;
        Ok(state.topics.get(topic).map_or(0, VecDeque::len))
    }
}
