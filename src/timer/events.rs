use serde::Serialize;

use crate::{error::VerificationErrorKind, models::CompletedSession};

use super::SessionSnapshot;

/// Published by the controller. Subscribers observe; they never mutate.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    StateChanged {
        snapshot: SessionSnapshot,
    },
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        remaining_seconds: u64,
        break_remaining_seconds: Option<u64>,
    },
    BreakStarted {
        seconds: u32,
    },
    BreakEnded {
        early: bool,
    },
    #[serde(rename_all = "camelCase")]
    VerificationCompleted {
        score: f64,
        allow_break: bool,
        reason: String,
        break_seconds: u32,
    },
    VerificationFailed {
        kind: VerificationErrorKind,
        message: String,
    },
    BlockingFailed {
        authorization: bool,
        message: String,
    },
    SessionFinished {
        session: CompletedSession,
    },
}
