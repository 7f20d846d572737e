//! OS-level app blocking, seen from the session side.
//!
//! The real shield lives behind platform APIs. Sessions only need to turn
//! it on for a number of minutes and turn it off again.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BlockingError;

/// Opaque tokens naming what to block. Their meaning belongs to the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockSelection {
    pub applications: Vec<String>,
    pub categories: Vec<String>,
    pub web_domains: Vec<String>,
}

impl BlockSelection {
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty() && self.categories.is_empty() && self.web_domains.is_empty()
    }
}

#[async_trait]
pub trait AppBlocker: Send + Sync {
    async fn start_blocking(
        &self,
        selection: &BlockSelection,
        duration_minutes: u32,
    ) -> Result<(), BlockingError>;

    async fn stop_blocking(&self);
}

/// Blocker for hosts without a shield. Only logs.
#[derive(Debug, Default)]
pub struct LogOnlyBlocker;

#[async_trait]
impl AppBlocker for LogOnlyBlocker {
    async fn start_blocking(
        &self,
        selection: &BlockSelection,
        duration_minutes: u32,
    ) -> Result<(), BlockingError> {
        log::info!(
            "blocking {} apps, {} categories, {} domains for {} min",
            selection.applications.len(),
            selection.categories.len(),
            selection.web_domains.len(),
            duration_minutes
        );
        Ok(())
    }

    async fn stop_blocking(&self) {
        log::info!("blocking lifted");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockerCall {
    Start { minutes: u32 },
    Stop,
}

/// In-memory blocker that records calls and can be told to refuse.
#[derive(Debug, Default)]
pub struct RecordingBlocker {
    calls: Mutex<Vec<BlockerCall>>,
    refuse_with_authorization: Mutex<bool>,
}

impl RecordingBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_authorization(&self, denied: bool) {
        *lock(&self.refuse_with_authorization) = denied;
    }

    pub fn calls(&self) -> Vec<BlockerCall> {
        lock(&self.calls).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl AppBlocker for RecordingBlocker {
    async fn start_blocking(
        &self,
        _selection: &BlockSelection,
        duration_minutes: u32,
    ) -> Result<(), BlockingError> {
        if *lock(&self.refuse_with_authorization) {
            return Err(BlockingError::NotAuthorized);
        }
        lock(&self.calls).push(BlockerCall::Start {
            minutes: duration_minutes,
        });
        Ok(())
    }

    async fn stop_blocking(&self) {
        lock(&self.calls).push(BlockerCall::Stop);
    }
}

/// Whole minutes to block for, rounded up so the shield never lifts early.
pub fn blocking_minutes(remaining_secs: u64) -> u32 {
    let minutes = remaining_secs.div_ceil(60);
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_round_up() {
        assert_eq!(blocking_minutes(0), 0);
        assert_eq!(blocking_minutes(1), 1);
        assert_eq!(blocking_minutes(60), 1);
        assert_eq!(blocking_minutes(61), 2);
        assert_eq!(blocking_minutes(1500), 25);
    }

    #[test]
    fn empty_selection() {
        assert!(BlockSelection::default().is_empty());
        let selection = BlockSelection {
            web_domains: vec!["news.example".into()],
            ..Default::default()
        };
        assert!(!selection.is_empty());
    }

    #[tokio::test]
    async fn recording_blocker_tracks_calls_and_refusals() {
        let blocker = RecordingBlocker::new();
        blocker
            .start_blocking(&BlockSelection::default(), 25)
            .await
            .unwrap();
        blocker.stop_blocking().await;
        assert_eq!(
            blocker.calls(),
            vec![BlockerCall::Start { minutes: 25 }, BlockerCall::Stop]
        );

        blocker.deny_authorization(true);
        let err = blocker
            .start_blocking(&BlockSelection::default(), 5)
            .await
            .unwrap_err();
        assert!(err.is_authorization());
    }
}
