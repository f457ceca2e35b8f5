use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NagStatus {
    Stopped,
    Armed,
    Firing,
}

impl Default for NagStatus {
    fn default() -> Self {
        NagStatus::Stopped
    }
}

/// Bookkeeping for one armed stretch of the reminder loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NagCycle {
    pub status: NagStatus,
    pub armed_at: Option<DateTime<Utc>>,
    pub last_fired_at: Option<DateTime<Utc>>,
    /// Ticks that found unread missed calls.
    pub fired_count: u32,
    /// Of those, ticks that stayed quiet (call in progress, sound off, audio failed).
    pub quiet_count: u32,
}

impl NagCycle {
    pub fn armed(now: DateTime<Utc>) -> Self {
        Self {
            status: NagStatus::Armed,
            armed_at: Some(now),
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.status != NagStatus::Stopped
    }

    pub fn record_fire(&mut self, now: DateTime<Utc>, sounded: bool) {
        self.status = NagStatus::Armed;
        self.fired_count += 1;
        self.last_fired_at = Some(now);
        if !sounded {
            self.quiet_count += 1;
        }
    }
}
