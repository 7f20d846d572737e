use serde::{Deserialize, Serialize};

use crate::progress::SessionProgressState;

/// Note sent to the judge when the user submitted images only.
pub const IMAGES_ONLY_NOTE: &str = "(User provided images only)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub session_goal: String,
    pub session_state_summary: String,
    pub user_progress_note: String,
    pub scraped_text_delta: String,
}

impl VerificationRequest {
    /// Snapshot of `state` plus this cycle's fresh evidence.
    pub fn from_state(state: &SessionProgressState, user_note: &str, delta: String) -> Self {
        let user_progress_note = if user_note.trim().is_empty() {
            IMAGES_ONLY_NOTE.to_string()
        } else {
            user_note.to_string()
        };

        Self {
            session_goal: state.session_goal().to_string(),
            session_state_summary: state.state_summary().to_string(),
            user_progress_note,
            scraped_text_delta: delta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub score: f64,
    pub allow_break: bool,
    pub reason: String,
    pub updated_summary: String,
}

impl VerificationResponse {
    pub fn score_in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.score)
    }
}

/// Optional body of a non-2xx answer.
#[derive(Debug, Deserialize)]
pub(crate) struct ServerErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_wire_field_names() {
        let state = SessionProgressState::new("Finish report");
        let request = VerificationRequest::from_state(&state, "Wrote 3 paragraphs", "Wrote 3 paragraphs".into());

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "sessionGoal": "Finish report",
                "sessionStateSummary": "Session just started. No progress has been made yet.",
                "userProgressNote": "Wrote 3 paragraphs",
                "scrapedTextDelta": "Wrote 3 paragraphs",
            })
        );
    }

    #[test]
    fn blank_note_is_replaced_for_image_only_submissions() {
        let state = SessionProgressState::new("Finish report");
        let request = VerificationRequest::from_state(&state, "   ", "ocr text".into());
        assert_eq!(request.user_progress_note, IMAGES_ONLY_NOTE);
    }

    #[test]
    fn response_requires_all_four_fields() {
        let missing = json!({"score": 0.7, "allowBreak": true, "reason": "ok"});
        assert!(serde_json::from_value::<VerificationResponse>(missing).is_err());

        let complete = json!({
            "score": 0.7,
            "allowBreak": true,
            "reason": "ok",
            "updatedSummary": "s",
        });
        let parsed: VerificationResponse = serde_json::from_value(complete).unwrap();
        assert!(parsed.score_in_range());
    }

    #[test]
    fn score_range_is_inclusive() {
        let mut response = VerificationResponse {
            score: 0.0,
            allow_break: false,
            reason: String::new(),
            updated_summary: String::new(),
        };
        assert!(response.score_in_range());
        response.score = 1.0;
        assert!(response.score_in_range());
        response.score = 1.5;
        assert!(!response.score_in_range());
        response.score = -0.01;
        assert!(!response.score_in_range());
        response.score = f64::NAN;
        assert!(!response.score_in_range());
    }
}
