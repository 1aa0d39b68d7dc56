use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::utils::error::ConfigError;

/// What the display sink does when it is full and a new record arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Empty the whole view, then append
    #[default]
    BulkClear,
    /// Drop only the oldest record, then append
    SlidingWindow,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Index of the interface to capture from, prompted for when absent
    pub interface: Option<usize>,

    /// BPF filter expression, prompted for when absent; empty captures all
    pub filter: Option<String>,

    /// Enable promiscuous mode
    pub promiscuous: bool,

    /// Bytes captured per frame
    pub snaplen: i32,

    /// Device read timeout, bounds how long a stop request can go unseen
    pub read_timeout_ms: u64,

    /// Main-thread poll interval for keyboard input and redraws
    pub poll_interval_ms: u64,

    /// Capacity of the rolling table
    pub max_rows: usize,

    /// What happens when the table is full
    pub eviction: EvictionPolicy,

    /// Stop after this many frames
    pub max_packets: Option<u64>,

    /// Key that cancels capture (matched case-insensitively)
    pub cancel_key: char,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            interface: None,
            filter: None,
            promiscuous: true,
            snaplen: 65535,
            read_timeout_ms: 1000,
            poll_interval_ms: 100,
            max_rows: 20,
            eviction: EvictionPolicy::BulkClear,
            max_packets: None,
            cancel_key: 'q',
        }
    }
}

impl AppConfig {
    /// Load a JSON config file; keys it omits keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rows == 0 {
            return Err(ConfigError::Invalid("max_rows must be at least 1".to_string()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read_timeout_ms must be greater than 0".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be greater than 0".to_string()));
        }
        if self.snaplen <= 0 {
            return Err(ConfigError::Invalid("snaplen must be positive".to_string()));
        }
        if self.max_packets == Some(0) {
            return Err(ConfigError::Invalid("count must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
