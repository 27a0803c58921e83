//! Liveness tracking for the ping/pong gate.
//!
//! The subscriber records every inbound ping; the publisher consults the
//! tracker before sending ad-hoc events. One atomic timestamp, no lock.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Time of the most recent inbound ping.
#[derive(Debug, Default)]
pub struct LivenessTracker {
    /// Epoch millis of the last ping; 0 until the first one arrives.
    last_ping_at: AtomicI64,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, now_ms: i64) {
        self.last_ping_at.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_ping_at(&self) -> Option<i64> {
        match self.last_ping_at.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }

    /// True when a ping was seen and it is older than `threshold_ms`.
    pub fn is_stale(&self, now_ms: i64, threshold_ms: i64) -> bool {
        match self.last_ping_at() {
            Some(last) => last < now_ms - threshold_ms,
            None => false,
        }
    }
}
