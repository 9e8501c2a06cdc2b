//! Validation verdicts and the marker-based response parser.
//!
//! The validator capability replies with free text containing a literal
//! `APPROVED` / `REJECTED` marker (the review-prompt contract). Anything
//! without a clear `APPROVED` is treated as rejected.

use serde::{Deserialize, Serialize};

/// How the validator judged an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    /// Meets the requirements; the refinement loop may finish.
    Approved,
    /// Does not meet the requirements; feedback drives another iteration.
    Rejected,
    /// Visual rendering failed and validation fell back to text-only
    /// analysis. Routed like a rejection, but flagged for observability.
    DegradedError,
}

/// Per-dimension reviewer notes, parsed best-effort from the response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionNotes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_design: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functional_completeness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responsiveness: Option<String>,
}

/// The validator's structured judgment of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: VerdictOutcome,
    /// Free-text feedback, fed back into the next designer call.
    pub feedback: String,
    pub notes: DimensionNotes,
    /// True when visual rendering failed and only the artifact's source
    /// text was analyzed.
    pub degraded: bool,
}

impl Verdict {
    /// Whether the refinement loop should stop successfully.
    pub fn is_approved(&self) -> bool {
        self.outcome == VerdictOutcome::Approved
    }

    /// Build a verdict from a validator response.
    ///
    /// `degraded` marks a text-only fallback: such verdicts are never
    /// `Approved` because nothing visual was actually checked.
    pub fn from_response(text: &str, degraded: bool) -> Self {
        let approved = contains_marker(text, "APPROVED") && !contains_marker(text, "REJECTED");
        let outcome = if degraded {
            VerdictOutcome::DegradedError
        } else if approved {
            VerdictOutcome::Approved
        } else {
            VerdictOutcome::Rejected
        };
        Self {
            outcome,
            feedback: text.trim().to_string(),
            notes: parse_notes(text),
            degraded,
        }
    }
}

fn contains_marker(text: &str, marker: &str) -> bool {
    text.to_uppercase().contains(marker)
}

/// Pull out `dimension: note` lines, case-insensitively.
fn parse_notes(text: &str) -> DimensionNotes {
    let mut notes = DimensionNotes::default();
    for line in text.lines() {
        let lower = line.to_lowercase();
        if let Some((_, rest)) = line.split_once(':') {
            let note = rest.trim();
            if note.is_empty() {
                continue;
            }
            if lower.starts_with("visual design") {
                notes.visual_design = Some(note.to_string());
            } else if lower.starts_with("functional completeness") {
                notes.functional_completeness = Some(note.to_string());
            } else if lower.starts_with("responsiveness") {
                notes.responsiveness = Some(note.to_string());
            }
        }
    }
    notes
}
