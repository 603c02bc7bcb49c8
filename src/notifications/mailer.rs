use super::{NotificationError, ReservationEmail};
use crate::config::AppConfig;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Delivers a rendered [`ReservationEmail`].
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &ReservationEmail) -> Result<(), NotificationError>;
}

/// Picks the transport named by `mail_transport`.
pub fn mailer_from_config(config: &AppConfig) -> Result<Arc<dyn Mailer>, NotificationError> {
    if config.uses_smtp() {
        let host = config.smtp_host.clone().ok_or_else(|| {
            NotificationError::Configuration("smtp_host is required for smtp transport".into())
        })?;
        let mailer = SmtpMailer::new(
            host,
            config.smtp_port,
            config.smtp_username.clone(),
            config.smtp_password.clone(),
            &config.mail_from,
        )?;
        info!(host = %mailer.host, port = mailer.port, "Using SMTP mail transport");
        Ok(Arc::new(mailer))
    } else {
        info!("Using log mail transport");
        Ok(Arc::new(LogMailer::new(&config.mail_from)))
    }
}

/// SMTP relay transport backed by lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        from: &str,
    ) -> Result<Self, NotificationError> {
        let from = parse_mailbox(from)?;
        let credentials = username.map(|user| Credentials::new(user, password.unwrap_or_default()));

        Ok(Self {
            host,
            port,
            credentials,
            from,
        })
    }

    /// A fresh transport per message; the relay connection is not pooled.
    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotificationError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
            .map_err(|e| NotificationError::Transport(format!("SMTP relay error: {e}")))?
            .port(self.port);
        if let Some(credentials) = &self.credentials {
            builder = builder.credentials(credentials.clone());
        }
        Ok(builder.build())
    }

    fn build_message(&self, email: &ReservationEmail) -> Result<Message, NotificationError> {
        Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(email.recipient())?)
            .subject(email.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body())
            .map_err(|e| NotificationError::Transport(format!("Failed to build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &ReservationEmail) -> Result<(), NotificationError> {
        let message = self.build_message(email)?;
        let transport = self.build_transport()?;

        transport
            .send(message)
            .await
            .map_err(|e| NotificationError::Transport(format!("Failed to send email: {e}")))?;

        debug!(kind = email.kind(), to = email.recipient(), "Email handed to SMTP relay");
        Ok(())
    }
}

/// Writes emails to the log instead of sending them.
#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &ReservationEmail) -> Result<(), NotificationError> {
        info!(
            from = %self.from,
            to = email.recipient(),
            subject = %email.subject(),
            body = %email.body(),
            "Email (log transport)"
        );
        Ok(())
    }
}

/// Keeps sent emails in memory. Can be told to fail a number of sends first.
///
/// Recipients are checked the way the SMTP transport checks them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    sent: Arc<Mutex<Vec<ReservationEmail>>>,
    failures_left: Arc<AtomicUsize>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `failures` sends return a transport error.
    pub fn failing_first(failures: usize) -> Self {
        let mailer = Self::default();
        mailer.failures_left.store(failures, Ordering::SeqCst);
        mailer
    }

    pub async fn sent(&self) -> Vec<ReservationEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, email: &ReservationEmail) -> Result<(), NotificationError> {
        parse_mailbox(email.recipient())?;

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NotificationError::Transport("simulated outage".into()));
        }

        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse()
        .map_err(|e| NotificationError::InvalidAddress(format!("{address}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn confirmation(to: &str) -> ReservationEmail {
        ReservationEmail::Confirmation {
            to: to.into(),
            transaction_key: "AB12CD".into(),
            pick_up_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn in_memory_mailer_fails_then_records() {
        let mailer = InMemoryMailer::failing_first(1);
        let email = confirmation("jane@example.com");

        assert!(mailer.send(&email).await.is_err());
        mailer.send(&email).await.unwrap();
        assert_eq!(mailer.sent().await, vec![email]);
    }

    #[tokio::test]
    async fn in_memory_mailer_rejects_bad_recipients() {
        let mailer = InMemoryMailer::new();
        let err = mailer.send(&confirmation("not an address")).await.unwrap_err();
        assert!(matches!(err, NotificationError::InvalidAddress(_)));
        assert!(!err.is_retryable());
        assert!(mailer.sent().await.is_empty());
    }

    #[test]
    fn smtp_message_carries_subject_and_recipient() {
        let mailer = SmtpMailer::new(
            "smtp.shop.test".into(),
            587,
            Some("user".into()),
            Some("secret".into()),
            "Shop <no-reply@shop.test>",
        )
        .unwrap();

        let message = mailer.build_message(&confirmation("jane@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: jane@example.com"));
        assert!(raw.contains("Subject: Reservation Confirmation - AB12CD"));
    }

    #[test]
    fn invalid_recipient_is_rejected_before_sending() {
        let mailer =
            SmtpMailer::new("smtp.shop.test".into(), 587, None, None, "no-reply@shop.test").unwrap();
        let err = mailer.build_message(&confirmation("not an address")).unwrap_err();
        assert!(matches!(err, NotificationError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        LogMailer::new("no-reply@shop.test")
            .send(&confirmation("jane@example.com"))
            .await
            .unwrap();
    }
}
