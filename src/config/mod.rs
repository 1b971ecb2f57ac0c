//! Configuration management for the playbook engine
//!
//! Handles server binding, the SQLite location, and the runtime knobs of the
//! execution engine (retry backoff, default action timeout, SLA monitoring).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Execution engine configuration
    pub engine: EngineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL for definitions, executions and audit events
    /// (default: "sqlite://data/playbooks.db")
    pub url: String,
}

/// Runtime knobs for the execution state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base delay of the exponential retry backoff, in milliseconds
    pub retry_base_ms: u64,
    /// Upper bound for a single backoff delay, in milliseconds
    pub retry_ceiling_ms: u64,
    /// Timeout applied to actions that do not declare `timeout_seconds`
    pub default_timeout_secs: u64,
    /// Cron expression (with seconds) for the SLA monitor job
    pub sla_schedule: String,
    /// Whether the SLA monitor job is started with the server
    pub sla_monitor_enabled: bool,
}

impl EngineConfig {
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn retry_ceiling(&self) -> Duration {
        Duration::from_millis(self.retry_ceiling_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_base_ms: env_or("PLAYBOOK_RETRY_BASE_MS", 500),
            retry_ceiling_ms: env_or("PLAYBOOK_RETRY_CEILING_MS", 30_000),
            default_timeout_secs: env_or("PLAYBOOK_DEFAULT_TIMEOUT_SECS", 300),
            sla_schedule: std::env::var("PLAYBOOK_SLA_SCHEDULE")
                .unwrap_or_else(|_| "0 * * * * *".to_string()),
            sla_monitor_enabled: env_or("PLAYBOOK_SLA_MONITOR", true),
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("PLAYBOOK_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("PLAYBOOK_PORT", 3010),
            },
            database: DatabaseConfig {
                url: std::env::var("PLAYBOOK_DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/playbooks.db".to_string()),
            },
            engine: EngineConfig::default(),
        }
    }
}

/// Read and parse an environment variable, falling back on absence or parse failure
fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(fallback)
}
