use thiserror::Error;

use crate::capture::session::SessionState;

/// Errors raised while choosing what to capture from
#[derive(Error, Debug)]
pub enum SetupError {
    /// pcap reported no capture-capable interfaces
    #[error("No network interfaces found")]
    NoInterfaces,

    /// Operator picked an index outside the listed range
    #[error("Invalid interface index {index}: expected a value between 0 and {}", .count.saturating_sub(1))]
    InvalidIndex { index: usize, count: usize },

    /// Device listing itself failed
    #[error("Failed to list capture devices: {0}")]
    Enumeration(#[from] pcap::Error),
}

/// Errors raised while acquiring the capture device
#[derive(Error, Debug)]
pub enum OpenError {
    /// The device handle could not be created
    #[error("Failed to create capture from device {device}: {source}")]
    Device {
        device: String,
        #[source]
        source: pcap::Error,
    },

    /// The handle was created but could not be activated (permissions, driver)
    #[error("Failed to activate capture on {device}: {source}. Run with capture privileges and make sure libpcap/Npcap is installed")]
    Activate {
        device: String,
        #[source]
        source: pcap::Error,
    },

    /// The filter could not be applied to the opened device
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// The session was not idle
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors raised while compiling or applying a capture filter
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid filter expression '{expression}': {reason}")]
    Compile { expression: String, reason: String },
}

/// Lifecycle misuse or abnormal end of a capture session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cannot {op} a session in state {state}")]
    InvalidState { op: &'static str, state: SessionState },

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Capture thread panicked")]
    CaptureThreadPanicked,

    #[error("Capture failed after {frames_delivered} packets: too many consecutive read errors")]
    ReadFailed { frames_delivered: u64 },
}

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
