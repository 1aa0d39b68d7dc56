use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::models::config::EvictionPolicy;
use crate::models::packet::DecodedRecord;
use crate::models::stats::CaptureStats;

struct SinkInner {
    rows: VecDeque<DecodedRecord>,
    stats: CaptureStats,
}

/// Bounded, ordered view of the most recent decoded records
///
/// The capture thread appends and the render loop takes snapshots. Every
/// access goes through one mutex, so eviction plus append is a single
/// atomic step and a snapshot never sees half of it.
pub struct DisplaySink {
    max_rows: usize,
    policy: EvictionPolicy,
    inner: Mutex<SinkInner>,
}

impl DisplaySink {
    /// A sink holding at most `max_rows` records (at least one)
    pub fn new(max_rows: usize, policy: EvictionPolicy) -> Self {
        let max_rows = if max_rows == 0 {
            warn!("Display capacity of 0 rows requested, using 1");
            1
        } else {
            max_rows
        };

        Self {
            max_rows,
            policy,
            inner: Mutex::new(SinkInner {
                rows: VecDeque::with_capacity(max_rows),
                stats: CaptureStats::default(),
            }),
        }
    }

    /// Append a record, evicting first if the view is full
    pub fn append(&self, record: DecodedRecord) {
        let mut inner = self.inner.lock();

        if inner.rows.len() >= self.max_rows {
            let evicted = match self.policy {
                EvictionPolicy::BulkClear => {
                    let count = inner.rows.len();
                    inner.rows.clear();
                    count
                }
                EvictionPolicy::SlidingWindow => inner.rows.pop_front().map_or(0, |_| 1),
            };
            inner.stats.evicted += evicted as u64;
            debug!("Evicted {} record(s) before appending #{}", evicted, record.seq);
        }

        inner.stats.record(&record);
        inner.rows.push_back(record);
    }

    /// Copy of the current view, oldest first
    pub fn snapshot(&self) -> Vec<DecodedRecord> {
        self.inner.lock().rows.iter().cloned().collect()
    }

    /// Copy of the running statistics
    pub fn stats(&self) -> CaptureStats {
        self.inner.lock().stats.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }
}
