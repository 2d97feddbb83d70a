use serde::{Deserialize, Serialize};

/// Main configuration structure for fieldflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Credentials accepted on the periodic invocation endpoint
    #[serde(default)]
    pub cron: CronConfig,

    /// Dedup windows and retry limits
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Queue consumer settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Outbound integration gateway
    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".fieldflow/fieldflow.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// sqlx connection URL for the configured path.
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// Rotation policy for file output (daily, hourly, never)
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: true,
            rotation: default_rotation(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Credentials for the periodic invocation endpoint.
///
/// A request is authorized by `Authorization: Bearer <secret>`. Setting
/// `trusted_header` (for example `x-cloudscheduler`) also admits requests
/// carrying that header; only enable it behind a proxy that strips the
/// header from outside traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CronConfig {
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub trusted_header: Option<String>,

    #[serde(default = "default_trusted_header_value")]
    pub trusted_header_value: String,
}

fn default_trusted_header_value() -> String {
    "true".to_string()
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            secret: None,
            trusted_header: None,
            trusted_header_value: default_trusted_header_value(),
        }
    }
}

/// Dedup windows and retry limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AutomationConfig {
    /// Attempts before a queue entry is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Window for suppressing repeated (type, entity) triggers
    #[serde(default = "default_trigger_dedup_secs")]
    pub trigger_dedup_secs: u64,

    /// Dedup window for queued actions
    #[serde(default = "default_action_dedup_secs")]
    pub action_dedup_secs: u64,

    /// Dedup window for zero-delay push notifications
    #[serde(default = "default_push_dedup_secs")]
    pub push_dedup_secs: u64,

    /// Width of the appointment reminder window
    #[serde(default = "default_reminder_window_minutes")]
    pub reminder_window_minutes: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_trigger_dedup_secs() -> u64 {
    5
}

const fn default_action_dedup_secs() -> u64 {
    600
}

const fn default_push_dedup_secs() -> u64 {
    30
}

const fn default_reminder_window_minutes() -> u64 {
    5
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            trigger_dedup_secs: default_trigger_dedup_secs(),
            action_dedup_secs: default_action_dedup_secs(),
            push_dedup_secs: default_push_dedup_secs(),
            reminder_window_minutes: default_reminder_window_minutes(),
        }
    }
}

/// Queue consumer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Maximum entries claimed per drain
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Entries executed concurrently within a drain
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

const fn default_batch_size() -> usize {
    25
}

const fn default_concurrency() -> usize {
    4
}

const fn default_poll_interval_ms() -> u64 {
    5000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Outbound integration gateway used by the HTTP action dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IntegrationsConfig {
    /// Base URL; actions are POSTed to `{base_url}/{action-type}`.
    /// When unset the worker runs in log-only mode.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    15
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}
