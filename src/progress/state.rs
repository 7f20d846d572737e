use serde::{Deserialize, Serialize};

pub const INITIAL_SUMMARY: &str = "Session just started. No progress has been made yet.";

/// Running record of one focus session's goal and verified progress.
///
/// Mutated once per successful verification call, whether or not the judge
/// granted a break, so the next delta never re-counts evidence that was
/// already submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgressState {
    session_goal: String,
    state_summary: String,
    break_number: u32,
    last_evidence_text: String,
}

impl SessionProgressState {
    pub fn new(session_goal: impl Into<String>) -> Self {
        Self {
            session_goal: session_goal.into(),
            state_summary: INITIAL_SUMMARY.to_string(),
            break_number: 0,
            last_evidence_text: String::new(),
        }
    }

    pub fn session_goal(&self) -> &str {
        &self.session_goal
    }

    pub fn state_summary(&self) -> &str {
        &self.state_summary
    }

    pub fn break_number(&self) -> u32 {
        self.break_number
    }

    pub fn last_evidence_text(&self) -> &str {
        &self.last_evidence_text
    }

    /// Applies the judge's verdict. `submitted_evidence` is the full
    /// cumulative text sent in that call, not the delta.
    pub fn record_verification(
        &mut self,
        updated_summary: impl Into<String>,
        submitted_evidence: impl Into<String>,
    ) {
        self.state_summary = updated_summary.into();
        self.break_number = self.break_number.saturating_add(1);
        self.last_evidence_text = submitted_evidence.into();
    }
}
