//! Session history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One finished focus session. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSession {
    pub id: String,
    pub date: DateTime<Utc>,
    pub duration_seconds: u64,
    pub completed: bool,
    pub breaks_taken: u32,
}

impl CompletedSession {
    pub fn new(date: DateTime<Utc>, duration_seconds: u64, completed: bool, breaks_taken: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            date,
            duration_seconds,
            completed,
            breaks_taken,
        }
    }

    /// "1h 5m" or "25m".
    pub fn duration_label(&self) -> String {
        let hours = self.duration_seconds / 3600;
        let minutes = (self.duration_seconds % 3600) / 60;
        if hours > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{minutes}m")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_sessions: u64,
    pub completed_sessions: u64,
}

impl HistoryStats {
    /// Whole percent of sessions that ran to the end. Zero with no history.
    pub fn success_rate(&self) -> u8 {
        if self.total_sessions == 0 {
            return 0;
        }
        ((self.completed_sessions * 100) / self.total_sessions) as u8
    }
}
