//! Update statistics for the running daemon.
//!
//! Counters live for the lifetime of the process only; nothing is persisted.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Rolling counters for completed ticks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub success: u64,
    pub fail: u64,
    /// Failures since the last success
    pub consecutive_fail: u64,
    /// Duration of the most recent completed tick
    pub last_duration: Duration,
    /// Last token observed on a successful tick
    pub last_token: String,
    /// Time of the last successful tick
    pub last_update: Option<DateTime<Utc>>,
}

impl UpdateStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful tick. An empty token leaves `last_token` as is.
    pub fn record_success(&mut self, duration: Duration, token: &str) {
        self.success += 1;
        self.consecutive_fail = 0;
        self.last_duration = duration;
        if !token.is_empty() {
            self.last_token = token.to_string();
        }
        self.last_update = Some(Utc::now());
    }

    pub fn record_failure(&mut self, duration: Duration) {
        self.fail += 1;
        self.consecutive_fail += 1;
        self.last_duration = duration;
    }

    /// Number of ticks that ran to completion
    pub fn completed_ticks(&self) -> u64 {
        self.success + self.fail
    }

    /// RFC 3339 timestamp of the last success, or "never"
    pub fn last_update_display(&self) -> String {
        self.last_update
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    }
}
