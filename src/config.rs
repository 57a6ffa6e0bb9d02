use std::path::PathBuf;

use tracing::trace;

use crate::throttle::GateMode;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
    // Future: Postgres, Mongo, etc.
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./klaxon.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Number of processing workers draining the inbound queue
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bound of the inbound queue; publishers block once it fills
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Fallback timeout in seconds for alerts that carry none
    #[serde(default = "default_alert_timeout")]
    pub alert_timeout: i64,

    /// Fallback timeout in seconds for heartbeats that carry none
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout: i64,

    /// History entries kept per alarm (oldest dropped first)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Lifecycle model name, resolved via [`crate::lifecycle::from_name`]
    #[serde(default = "default_alarm_model")]
    pub alarm_model: String,

    #[serde(default)]
    pub destinations: Destinations,

    /// Storage configuration (optional - defaults to in-memory)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Names of the message bus destinations the engine talks to
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Destinations {
    #[serde(default = "default_inbound")]
    pub inbound: String,
    #[serde(default = "default_notify")]
    pub notify: String,
    #[serde(default = "default_audit")]
    pub audit: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Destinations {
            inbound: default_inbound(),
            notify: default_notify(),
            audit: default_audit(),
        }
    }
}

/// Producer-side repeat suppression, applied before events reach the bus
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Whether repeats are tracked per severity or per value
    #[serde(default = "default_gate_mode")]
    pub mode: GateMode,

    /// Every n-th suppressed repeat is let through regardless
    #[serde(default = "default_gate_threshold")]
    pub threshold: u64,

    /// A repeat is also let through after this long without a send
    #[serde(default = "default_gate_duration")]
    pub duration_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            enabled: false,
            mode: default_gate_mode(),
            threshold: default_gate_threshold(),
            duration_secs: default_gate_duration(),
        }
    }
}

/// Token bucket cap on notification fan-out
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Bucket size, i.e. the largest burst of notifications allowed
    #[serde(default = "default_rate_limit")]
    pub limit: usize,

    /// One token is returned to the bucket at this interval
    #[serde(default = "default_rate_refill")]
    pub refill_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            enabled: false,
            limit: default_rate_limit(),
            refill_secs: default_rate_refill(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_alert_timeout() -> i64 {
    86_400
}

fn default_heartbeat_timeout() -> i64 {
    86_400
}

fn default_history_limit() -> usize {
    100
}

fn default_alarm_model() -> String {
    "standard".to_string()
}

fn default_inbound() -> String {
    "alerts".to_string()
}

fn default_notify() -> String {
    "notify".to_string()
}

fn default_audit() -> String {
    "logger".to_string()
}

fn default_gate_mode() -> GateMode {
    GateMode::Severity
}

fn default_gate_threshold() -> u64 {
    10
}

fn default_gate_duration() -> u64 {
    3600
}

fn default_rate_limit() -> usize {
    20
}

fn default_rate_refill() -> u64 {
    30
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
