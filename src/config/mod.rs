use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub lessons: LessonConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub payments: PaymentConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Pricing and cancellation policy for private lessons
#[derive(Debug, Clone, Deserialize)]
pub struct LessonConfig {
    /// Income credited to a teacher for each completed lesson
    #[serde(default = "default_flat_rate")]
    pub flat_rate_per_lesson: i64,
    /// Minimum notice (in hours) a student must give to cancel
    #[serde(default = "default_cancellation_window_hours")]
    pub cancellation_window_hours: i64,
}

impl Default for LessonConfig {
    fn default() -> Self {
        Self {
            flat_rate_per_lesson: default_flat_rate(),
            cancellation_window_hours: default_cancellation_window_hours(),
        }
    }
}

fn default_flat_rate() -> i64 {
    50
}

fn default_cancellation_window_hours() -> i64 {
    24
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a writer waits for the SQLite write lock
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Attempts per operation before a contention error is surfaced
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff between attempts, doubled each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    25
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentConfig {
    /// Secret for verifying payment webhook signatures (HMAC-SHA256).
    /// Webhooks are rejected while unset.
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_reconciler_enabled")]
    pub enabled: bool,
    #[serde(default = "default_reconciler_interval")]
    pub interval_seconds: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: default_reconciler_enabled(),
            interval_seconds: default_reconciler_interval(),
        }
    }
}

fn default_reconciler_enabled() -> bool {
    true
}

fn default_reconciler_interval() -> u64 {
    300
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}
