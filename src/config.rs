//! Configuration for the Prahari client
//!
//! Loads configuration from a TOML file with the parameters needed to reach
//! the hospital feed, the pager, the model artifact, and the durable state
//! files.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub pager: PagerConfig,
    pub model: ModelConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
}

/// Hospital MLLP feed connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// MLLP feed address, e.g. `hospital:8440`
    pub address: String,
    /// Socket read buffer size in bytes
    pub read_buffer: usize,
    /// Delay between reconnect attempts, seconds
    pub reconnect_delay_secs: u64,
    /// Reconnect budget. Process-lifetime: the counter is deliberately NOT
    /// reset between connections, carried over from the original deployment.
    pub reconnect_budget: u32,
}

/// Paging service connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PagerConfig {
    /// Pager address, e.g. `pager:8441`
    pub address: String,
    /// Retry bound for connection-level failures
    pub max_attempts: u32,
    /// Delay between retries, seconds
    pub retry_delay_secs: u64,
}

/// Classifier artifact
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Path to the JSON model artifact, loaded once at startup
    pub path: String,
    /// Expected-AKI CSV for evaluation mode summaries (optional)
    pub expected_aki_csv: Option<String>,
}

/// Durable state files
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    /// Full-database snapshot, written after every processed frame
    pub snapshot_path: String,
    /// Historical results CSV (cold bootstrap)
    pub history_csv: String,
    /// Recovery log of PAS admission pairs (cold bootstrap)
    pub recovery_log: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Defaults matching the standard deployment layout. Suitable for
    /// development; production deployments use a TOML file.
    pub fn deployment_defaults() -> Self {
        Self {
            feed: FeedConfig {
                address: "localhost:8440".to_string(),
                read_buffer: 1024,
                reconnect_delay_secs: 3,
                reconnect_budget: 100,
            },
            pager: PagerConfig {
                address: "localhost:8441".to_string(),
                max_attempts: 100,
                retry_delay_secs: 5,
            },
            model: ModelConfig {
                path: "trained_model.json".to_string(),
                expected_aki_csv: None,
            },
            state: StateConfig {
                snapshot_path: "/state/database.json".to_string(),
                history_csv: "/hospital-history/history.csv".to_string(),
                recovery_log: "backup.txt".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::deployment_defaults()
    }
}
