//! Error types for focus sessions and their collaborators.
//!
//! Each collaborator gets its own enum so callers can present distinct UI:
//! a verification failure is retryable, an authorization failure needs an
//! OS permission prompt, a validation failure never touched any state.

use serde::Serialize;
use thiserror::Error;

/// Coarse grouping of [`VerificationError`] used to pick a UI treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationErrorKind {
    /// Endpoint missing or unusable. Fix the settings, not the network.
    Configuration,
    /// Network failure, timeout or non-2xx status. Safe to retry.
    Transport,
    /// The judge answered with something we refuse to trust. Safe to retry.
    Protocol,
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("verification endpoint is not configured; set verification.base_url in settings")]
    NotConfigured,

    #[error("invalid verification endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("verification request timed out after {0}s")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx status. `message` comes from an `{"error": ...}` body when present.
    #[error("{}", server_message(.status, .message))]
    Server { status: u16, message: Option<String> },

    #[error("failed to parse verification response: {0}")]
    MalformedBody(String),

    #[error("score {0} out of valid range (0.0-1.0)")]
    ScoreOutOfRange(f64),
}

fn server_message(status: &u16, message: &Option<String>) -> String {
    match message {
        Some(message) => format!("server error: {message}"),
        None => format!("HTTP {status}"),
    }
}

impl VerificationError {
    pub fn kind(&self) -> VerificationErrorKind {
        match self {
            VerificationError::NotConfigured | VerificationError::InvalidEndpoint(_) => {
                VerificationErrorKind::Configuration
            }
            VerificationError::Timeout(_)
            | VerificationError::Transport(_)
            | VerificationError::Server { .. } => VerificationErrorKind::Transport,
            VerificationError::MalformedBody(_) | VerificationError::ScoreOutOfRange(_) => {
                VerificationErrorKind::Protocol
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() != VerificationErrorKind::Configuration
    }
}

/// Failures of the OS app-blocking collaborator.
#[derive(Debug, Error)]
pub enum BlockingError {
    #[error("screen time permission required; enable it in system settings")]
    NotAuthorized,

    #[error("no apps or categories selected; configure blocked items first")]
    NoSelection,

    #[error("blocking system error: {0}")]
    System(String),
}

impl BlockingError {
    pub fn is_authorization(&self) -> bool {
        matches!(self, BlockingError::NotAuthorized)
    }
}

/// Failure to recognise text in one image.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ImageFailure {
    #[error("image {index}: invalid image format ({reason})")]
    InvalidImage { index: usize, reason: String },

    #[error("image {index}: no text found")]
    NoTextFound { index: usize },

    #[error("image {index}: text recognition failed ({reason})")]
    RecognitionFailed { index: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("could not read text from any of the {} images", .0.len())]
    AllImagesFailed(Vec<ImageFailure>),

    #[error("text recognition worker failed: {0}")]
    Worker(String),
}

/// Rejected at the boundary before any state is touched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("session goal must not be empty")]
    EmptyGoal,

    #[error("session duration must be greater than zero")]
    NonPositiveDuration,

    #[error("session duration is too long")]
    DurationTooLong,

    #[error("provide a progress note or at least one image with text")]
    EmptyEvidence,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: &'static str,
    },

    #[error("a verification request is already in flight")]
    VerificationInFlight,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Blocking(#[from] BlockingError),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_prefers_body_message() {
        let with_body = VerificationError::Server {
            status: 500,
            message: Some("model overloaded".into()),
        };
        assert_eq!(with_body.to_string(), "server error: model overloaded");

        let bare = VerificationError::Server {
            status: 502,
            message: None,
        };
        assert_eq!(bare.to_string(), "HTTP 502");
    }

    #[test]
    fn kinds_split_configuration_transport_protocol() {
        assert_eq!(
            VerificationError::NotConfigured.kind(),
            VerificationErrorKind::Configuration
        );
        assert_eq!(
            VerificationError::Timeout(30).kind(),
            VerificationErrorKind::Transport
        );
        assert_eq!(
            VerificationError::ScoreOutOfRange(1.5).kind(),
            VerificationErrorKind::Protocol
        );
        assert!(!VerificationError::NotConfigured.is_retryable());
        assert!(VerificationError::MalformedBody("eof".into()).is_retryable());
    }
}
