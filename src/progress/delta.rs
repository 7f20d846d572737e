//! Append detection for evidence submitted across repeated break requests.
//!
//! This is not a diff. When the new text does not contain the previous
//! submission verbatim, everything counts as new.

use super::SessionProgressState;

pub const EVIDENCE_SEPARATOR: &str = "\n\n";

/// Returns the portion of `new_evidence` not already seen in `state`.
pub fn compute_delta(state: &SessionProgressState, new_evidence: &str) -> String {
    let last = state.last_evidence_text();
    if last.is_empty() {
        return new_evidence.to_string();
    }

    if new_evidence.contains(last) {
        return new_evidence.replace(last, "").trim().to_string();
    }

    new_evidence.to_string()
}

/// Joins the written note and extracted image text into the cumulative
/// evidence for one submission. Blank parts are dropped.
pub fn combine_evidence(note: &str, image_text: &str) -> String {
    [note, image_text]
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(EVIDENCE_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_evidence(evidence: &str) -> SessionProgressState {
        let mut state = SessionProgressState::new("Finish report");
        if !evidence.is_empty() {
            state.record_verification("summary", evidence);
        }
        state
    }

    #[test]
    fn first_submission_is_returned_verbatim() {
        let state = state_with_evidence("");
        assert_eq!(compute_delta(&state, "  Wrote intro \n"), "  Wrote intro \n");
        assert_eq!(compute_delta(&state, ""), "");
    }

    #[test]
    fn appended_text_is_isolated_and_trimmed() {
        let state = state_with_evidence("Wrote intro");
        assert_eq!(
            compute_delta(&state, "Wrote introAdded conclusion"),
            "Added conclusion"
        );

        let state = state_with_evidence("Wrote 3 paragraphs");
        assert_eq!(
            compute_delta(&state, "Wrote 3 paragraphs and fixed formatting"),
            "and fixed formatting"
        );
    }

    #[test]
    fn edited_evidence_counts_entirely_as_new() {
        let state = state_with_evidence("Wrote 3 paragraphs");
        assert_eq!(
            compute_delta(&state, "Rewrote the opening"),
            "Rewrote the opening"
        );
    }

    #[test]
    fn resubmitting_identical_evidence_yields_empty_delta() {
        let state = state_with_evidence("Wrote 3 paragraphs");
        assert_eq!(compute_delta(&state, "Wrote 3 paragraphs"), "");
    }

    #[test]
    fn every_occurrence_of_previous_text_is_removed() {
        let state = state_with_evidence("done");
        assert_eq!(compute_delta(&state, "done, more, done"), ", more,");
    }

    #[test]
    fn combine_drops_blank_parts() {
        assert_eq!(combine_evidence("note", "ocr"), "note\n\nocr");
        assert_eq!(combine_evidence("  ", "ocr"), "ocr");
        assert_eq!(combine_evidence("note", "\n"), "note");
        assert_eq!(combine_evidence("", ""), "");
    }
}
