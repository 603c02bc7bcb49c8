use super::{Mailer, NotificationError, ReservationEmail};
use crate::message_queue::{Message, MessageQueue};
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Queue topic carrying serialized [`ReservationEmail`]s.
pub const EMAIL_TOPIC: &str = "notifications.email";

/// Publishes email jobs for the worker to deliver.
#[derive(Clone)]
pub struct NotificationDispatcher {
    queue: Arc<dyn MessageQueue>,
    max_retries: u32,
}

impl NotificationDispatcher {
    pub fn new(queue: Arc<dyn MessageQueue>, max_retries: u32) -> Self {
        Self { queue, max_retries }
    }

    #[instrument(skip(self, email), fields(kind = email.kind(), transaction_key = email.transaction_key()))]
    pub async fn enqueue(&self, email: &ReservationEmail) -> Result<(), NotificationError> {
        let payload = serde_json::to_value(email)?;
        let message = Message::new(EMAIL_TOPIC, payload).with_max_retries(self.max_retries);
        let message_id = message.id;

        self.queue.publish(message).await?;

        counter!("reservation_notifications.enqueued", 1);
        debug!(%message_id, "Email job queued");
        Ok(())
    }
}

/// Outcome of one [`NotificationWorker::drain_once`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub retried: usize,
    pub dropped: usize,
}

/// Background consumer of [`EMAIL_TOPIC`].
#[derive(Clone)]
pub struct NotificationWorker {
    queue: Arc<dyn MessageQueue>,
    mailer: Arc<dyn Mailer>,
    poll_interval: Duration,
    backoff_base: Duration,
}

impl NotificationWorker {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        mailer: Arc<dyn Mailer>,
        poll_interval: Duration,
        backoff_base: Duration,
    ) -> Self {
        Self {
            queue,
            mailer,
            poll_interval,
            backoff_base,
        }
    }

    /// Delay before the attempt following `retry_count` earlier retries: `base × 2^retry_count`.
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(retry_count))
    }

    /// Handles every message that is due right now.
    pub async fn drain_once(&self) -> Result<DrainReport, NotificationError> {
        let mut report = DrainReport::default();

        while let Some(message) = self.queue.subscribe(EMAIL_TOPIC).await? {
            // settle the lease first; a retry goes back as a new delivery
            self.queue.ack(&message.id).await?;

            let email: ReservationEmail = match serde_json::from_value(message.payload.clone()) {
                Ok(email) => email,
                Err(e) => {
                    error!(message_id = %message.id, error = %e, "Discarding unreadable email job");
                    report.dropped += 1;
                    continue;
                }
            };

            match self.mailer.send(&email).await {
                Ok(()) => {
                    counter!("reservation_notifications.sent", 1);
                    info!(
                        kind = email.kind(),
                        transaction_key = email.transaction_key(),
                        attempt = message.retry_count + 1,
                        "Email delivered"
                    );
                    report.delivered += 1;
                }
                Err(e) if e.is_retryable() && message.can_retry() => {
                    let delay = self.backoff_for(message.retry_count);
                    let now = Utc::now();
                    let deliver_after = chrono::Duration::from_std(delay)
                        .ok()
                        .and_then(|d| now.checked_add_signed(d))
                        .unwrap_or(now);

                    warn!(
                        kind = email.kind(),
                        transaction_key = email.transaction_key(),
                        retry = message.retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Email delivery failed, scheduling retry"
                    );
                    counter!("reservation_notifications.retried", 1);
                    self.queue.publish(message.next_attempt(deliver_after)).await?;
                    report.retried += 1;
                }
                Err(e) => {
                    counter!("reservation_notifications.failed", 1);
                    error!(
                        kind = email.kind(),
                        transaction_key = email.transaction_key(),
                        attempts = message.retry_count + 1,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Email delivery failed permanently, dropping"
                    );
                    report.dropped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Polls until `shutdown` flips to `true` or its sender goes away.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Notification worker started"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_once().await {
                        error!(error = %e, "Notification worker pass failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Notification worker stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_queue::InMemoryMessageQueue;
    use crate::notifications::InMemoryMailer;
    use chrono::NaiveDate;

    fn email() -> ReservationEmail {
        ReservationEmail::Confirmation {
            to: "jane@example.com".into(),
            transaction_key: "AB12CD".into(),
            pick_up_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        }
    }

    fn setup(
        mailer: InMemoryMailer,
        max_retries: u32,
        backoff_base: Duration,
    ) -> (Arc<InMemoryMessageQueue>, NotificationDispatcher, NotificationWorker) {
        let queue = Arc::new(InMemoryMessageQueue::new());
        let dispatcher = NotificationDispatcher::new(queue.clone(), max_retries);
        let worker = NotificationWorker::new(
            queue.clone(),
            Arc::new(mailer),
            Duration::from_millis(10),
            backoff_base,
        );
        (queue, dispatcher, worker)
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let (_, _, worker) = setup(InMemoryMailer::new(), 3, Duration::from_millis(100));
        assert_eq!(worker.backoff_for(0), Duration::from_millis(100));
        assert_eq!(worker.backoff_for(1), Duration::from_millis(200));
        assert_eq!(worker.backoff_for(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn delivers_queued_email() {
        let mailer = InMemoryMailer::new();
        let (queue, dispatcher, worker) = setup(mailer.clone(), 3, Duration::ZERO);

        dispatcher.enqueue(&email()).await.unwrap();
        let report = worker.drain_once().await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(mailer.sent().await, vec![email()]);
        assert_eq!(queue.pending(EMAIL_TOPIC).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_delivered() {
        let mailer = InMemoryMailer::failing_first(2);
        let (_, dispatcher, worker) = setup(mailer.clone(), 3, Duration::ZERO);

        dispatcher.enqueue(&email()).await.unwrap();
        let report = worker.drain_once().await.unwrap();

        assert_eq!(
            report,
            DrainReport {
                delivered: 1,
                retried: 2,
                dropped: 0
            }
        );
        assert_eq!(mailer.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_drop_the_job() {
        let mailer = InMemoryMailer::failing_first(10);
        let (queue, dispatcher, worker) = setup(mailer.clone(), 2, Duration::ZERO);

        dispatcher.enqueue(&email()).await.unwrap();
        let report = worker.drain_once().await.unwrap();

        assert_eq!(report.retried, 2);
        assert_eq!(report.dropped, 1);
        assert!(mailer.sent().await.is_empty());
        assert_eq!(queue.pending(EMAIL_TOPIC).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn undeliverable_address_is_dropped_without_retry() {
        let mailer = InMemoryMailer::failing_first(0);
        let (queue, dispatcher, worker) = setup(mailer.clone(), 3, Duration::ZERO);
        let bad = ReservationEmail::Confirmation {
            to: "not an address".into(),
            transaction_key: "AB12CD".into(),
            pick_up_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        };

        dispatcher.enqueue(&bad).await.unwrap();
        dispatcher.enqueue(&email()).await.unwrap();
        let report = worker.drain_once().await.unwrap();

        assert_eq!(
            report,
            DrainReport {
                delivered: 1,
                retried: 0,
                dropped: 1
            }
        );
        assert_eq!(mailer.sent().await, vec![email()]);
        assert_eq!(queue.pending(EMAIL_TOPIC).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn retry_waits_for_backoff() {
        let mailer = InMemoryMailer::failing_first(1);
        let (queue, dispatcher, worker) = setup(mailer.clone(), 3, Duration::from_secs(3600));

        dispatcher.enqueue(&email()).await.unwrap();
        let report = worker.drain_once().await.unwrap();

        assert_eq!(report.retried, 1);
        assert_eq!(queue.pending(EMAIL_TOPIC).await.unwrap(), 1);
        assert_eq!(worker.drain_once().await.unwrap(), DrainReport::default());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let mailer = InMemoryMailer::new();
        let (_, dispatcher, worker) = setup(mailer.clone(), 3, Duration::ZERO);
        let (tx, rx) = watch::channel(false);

        dispatcher.enqueue(&email()).await.unwrap();
        let handle = worker.spawn(rx);

        tokio::time::timeout(Duration::from_secs(5), async {
            while mailer.sent().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
