use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use chrono::{DateTime, Utc};

use crate::models::packet::{DecodedRecord, TransportProtocol};

/// Statistics for one capture session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaptureStats {
    /// Total number of records appended
    pub total_packets: u64,

    /// Total wire bytes of appended records
    pub total_bytes: u64,

    /// Records per transport tag
    pub protocols: BTreeMap<TransportProtocol, u64>,

    /// Records dropped from the view by eviction
    pub evicted: u64,

    /// Time of the first appended record
    pub start_time: Option<DateTime<Utc>>,

    /// Time of the most recent appended record
    pub last_time: Option<DateTime<Utc>>,
}

impl CaptureStats {
    /// Account for one appended record
    pub fn record(&mut self, record: &DecodedRecord) {
        self.total_packets += 1;
        self.total_bytes += record.length as u64;
        *self.protocols.entry(record.protocol).or_insert(0) += 1;
        if self.start_time.is_none() {
            self.start_time = Some(record.timestamp);
        }
        self.last_time = Some(record.timestamp);
    }

    /// Packets per second between the first and last record
    pub fn packet_rate(&self) -> f64 {
        match (self.start_time, self.last_time) {
            (Some(start), Some(last)) => {
                let elapsed_secs = last.signed_duration_since(start).num_milliseconds() as f64 / 1000.0;
                if elapsed_secs > 0.0 {
                    self.total_packets as f64 / elapsed_secs
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}
