use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_APP_URL: &str = "http://localhost:8080";
const DEFAULT_MAIL_TRANSPORT: &str = "log";
const DEFAULT_MAIL_FROM: &str = "no-reply@localhost";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_NOTIFICATION_MAX_RETRIES: u32 = 3;
const DEFAULT_NOTIFICATION_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_NOTIFICATION_BACKOFF_BASE_MS: u64 = 1_000;
const DEFAULT_MESSAGE_QUEUE_CAPACITY: usize = 1_000;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Public base URL used to build absolute product image links
    #[serde(default = "default_app_url")]
    #[validate(url)]
    pub app_url: String,

    /// Recipient of new-reservation alerts when no `email` setting is stored.
    /// Required: there is no built-in fallback address.
    #[validate(email)]
    pub staff_notification_email: String,

    /// Email transport: "log" or "smtp"
    #[serde(default = "default_mail_transport")]
    #[validate(custom = "validate_mail_transport")]
    pub mail_transport: String,

    /// Sender address for outbound email
    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    /// SMTP relay host (required when mail_transport = "smtp")
    #[serde(default)]
    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,

    /// Delivery attempts after the first failure before an email is dropped
    #[serde(default = "default_notification_max_retries")]
    pub notification_max_retries: u32,

    /// How often the notification worker polls the queue
    #[serde(default = "default_notification_poll_interval_ms")]
    #[validate(range(min = 10))]
    pub notification_poll_interval_ms: u64,

    /// Base delay for exponential redelivery backoff
    #[serde(default = "default_notification_backoff_base_ms")]
    pub notification_backoff_base_ms: u64,

    /// Maximum queued messages per topic
    #[serde(default = "default_message_queue_capacity")]
    #[validate(range(min = 1))]
    pub message_queue_capacity: usize,
}

impl AppConfig {
    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Creates a new configuration with defaults for everything optional
    pub fn new(
        database_url: String,
        host: String,
        port: u16,
        environment: String,
        staff_notification_email: String,
    ) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            app_url: default_app_url(),
            staff_notification_email,
            mail_transport: default_mail_transport(),
            mail_from: default_mail_from(),
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            notification_max_retries: default_notification_max_retries(),
            notification_poll_interval_ms: default_notification_poll_interval_ms(),
            notification_backoff_base_ms: default_notification_backoff_base_ms(),
            message_queue_capacity: default_message_queue_capacity(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn uses_smtp(&self) -> bool {
        self.mail_transport.eq_ignore_ascii_case("smtp")
    }

    pub fn notification_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.notification_poll_interval_ms)
    }

    pub fn notification_backoff_base(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.notification_backoff_base_ms)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        let smtp_host_missing = self
            .smtp_host
            .as_deref()
            .map(|host| host.trim().is_empty())
            .unwrap_or(true);
        if self.uses_smtp() && smtp_host_missing {
            let mut err = ValidationError::new("smtp_host_required");
            err.message = Some("Set APP__SMTP_HOST when APP__MAIL_TRANSPORT=smtp".into());
            errors.add("smtp_host", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_app_url() -> String {
    DEFAULT_APP_URL.to_string()
}

fn default_mail_transport() -> String {
    DEFAULT_MAIL_TRANSPORT.to_string()
}

fn default_mail_from() -> String {
    DEFAULT_MAIL_FROM.to_string()
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_notification_max_retries() -> u32 {
    DEFAULT_NOTIFICATION_MAX_RETRIES
}

fn default_notification_poll_interval_ms() -> u64 {
    DEFAULT_NOTIFICATION_POLL_INTERVAL_MS
}

fn default_notification_backoff_base_ms() -> u64 {
    DEFAULT_NOTIFICATION_BACKOFF_BASE_MS
}

fn default_message_queue_capacity() -> usize {
    DEFAULT_MESSAGE_QUEUE_CAPACITY
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_mail_transport(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "log" | "smtp" => Ok(()),
        _ => {
            let mut err = ValidationError::new("mail_transport");
            err.message = Some("Must be one of: log, smtp".into());
            Err(err)
        }
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("reservation_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads configuration from `config/` plus `APP__*` environment variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Loads configuration using `dir` as the config file directory.
pub fn load_config_from(dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            dir.display()
        );
    }

    // staff_notification_email has no default; it must come from a file or APP__STAFF_NOTIFICATION_EMAIL.
    let config = Config::builder()
        .set_default("database_url", "sqlite://reservations.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(dir.join("default")).required(false))
        .add_source(File::from(dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config
        .get_string("staff_notification_email")
        .map(|v| v.trim().is_empty())
        .unwrap_or(true)
    {
        error!("Staff notification email is not configured. Set APP__STAFF_NOTIFICATION_EMAIL.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "staff_notification_email is required but not configured. Set APP__STAFF_NOTIFICATION_EMAIL environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
