use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_CURRENCY: &str = "INR";
const CONFIG_DIR: &str = "config";
const DEFAULT_GATEWAY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_GATEWAY_INITIAL_BACKOFF_MS: u64 = 100;
const DEFAULT_GATEWAY_MAX_BACKOFF_MS: u64 = 5_000;

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_env")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to create the database schema on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Currency code used for quotes and gateway charges
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Payment gateway base URL for intent creation
    pub gateway_base_url: String,

    /// Optional API key sent with outbound gateway requests
    #[serde(default)]
    pub gateway_api_key: Option<String>,

    /// Shared secret used to verify payment callback signatures
    #[validate(length(min = 16))]
    pub gateway_webhook_secret: String,

    /// Bounded retry policy for outbound intent creation
    #[serde(default = "default_gateway_max_attempts")]
    pub gateway_max_attempts: u32,
    #[serde(default = "default_gateway_initial_backoff_ms")]
    pub gateway_initial_backoff_ms: u64,
    #[serde(default = "default_gateway_max_backoff_ms")]
    pub gateway_max_backoff_ms: u64,

    /// DB pool sizing
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_env() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_gateway_max_attempts() -> u32 {
    DEFAULT_GATEWAY_MAX_ATTEMPTS
}
fn default_gateway_initial_backoff_ms() -> u64 {
    DEFAULT_GATEWAY_INITIAL_BACKOFF_MS
}
fn default_gateway_max_backoff_ms() -> u64 {
    DEFAULT_GATEWAY_MAX_BACKOFF_MS
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
    pub fn new(
        database_url: String,
        gateway_base_url: String,
        gateway_webhook_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            currency: default_currency(),
            gateway_base_url,
            gateway_api_key: None,
            gateway_webhook_secret,
            gateway_max_attempts: default_gateway_max_attempts(),
            gateway_initial_backoff_ms: default_gateway_initial_backoff_ms(),
            gateway_max_backoff_ms: default_gateway_max_backoff_ms(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn gateway_initial_backoff(&self) -> Duration {
        Duration::from_millis(self.gateway_initial_backoff_ms)
    }

    pub fn gateway_max_backoff(&self) -> Duration {
        Duration::from_millis(self.gateway_max_backoff_ms)
    }
}

/// Loads configuration from layered files plus `APP_`-prefixed environment
/// variables, then validates it.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = cfg.try_deserialize()?;
    app_config
        .validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;

    Ok(app_config)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
