//! Iterative design/validate refinement engine.
//!
//! A refinement session drives the generate -> render -> validate ->
//! route loop for one design task, consuming the orchestrator's execution
//! contract for both the designer and (through the visual validation
//! adapter) the validator capability.
//!
//! # State machine
//!
//! ```text
//! Init -> Designing -> Validating -> Approved        (terminal)
//!              ^            |
//!              |            +-> Designing            (rejected, budget left)
//!              |            +-> Exhausted            (rejected at the limit)
//!              +------------+-> Error                (unrecoverable failure)
//! ```
//!
//! Iterations within a session are strictly sequential; history is
//! append-only and the artifact validated in iteration *k* is exactly the
//! artifact the designer produced in iteration *k*.

pub mod artifact;
pub mod session;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorDescriptor;
use crate::validation::Verdict;

pub use artifact::Artifact;
pub use session::{SessionHandle, start_refinement};

/// Configuration for one refinement session.
#[derive(Debug, Clone)]
pub struct RefinementConfig {
    /// Backend that provides the designer capability.
    pub designer_backend: String,
    /// Iteration budget. The session exhausts after this many rejected
    /// iterations.
    pub max_iterations: u32,
    /// Timeout for designer calls; `None` uses the backend default.
    pub designer_timeout: Option<Duration>,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            designer_backend: "designer".to_string(),
            max_iterations: 5,
            designer_timeout: None,
        }
    }
}

/// States of the refinement state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    Designing,
    Validating,
    Approved,
    Exhausted,
    Error,
}

impl SessionState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Exhausted | Self::Error)
    }
}

/// Progress event phases surfaced to session observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Designing,
    Validating,
    Complete,
    Error,
}

/// One progress event. The stream is finite and ends with exactly one
/// terminal event (`Complete` or `Error`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub iteration: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// One completed iteration: the artifact the designer produced and the
/// verdict the validator returned for it. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub artifact: Artifact,
    pub verdict: Verdict,
}

/// Terminal outcome of a refinement session.
#[derive(Debug, Clone, PartialEq)]
pub enum RefinementOutcome {
    /// The validator approved the artifact.
    Approved {
        artifact: Artifact,
        iterations: u32,
        history: Vec<IterationRecord>,
    },
    /// The iteration budget ran out; the last artifact and feedback are
    /// returned unapproved.
    Exhausted {
        artifact: Artifact,
        feedback: String,
        iterations: u32,
        history: Vec<IterationRecord>,
    },
    /// An unrecoverable failure (or cancellation) ended the session.
    Error {
        error: ErrorDescriptor,
        iterations: u32,
        history: Vec<IterationRecord>,
    },
}

impl RefinementOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    /// Iterations completed before the session terminated.
    pub fn iterations(&self) -> u32 {
        match self {
            Self::Approved { iterations, .. }
            | Self::Exhausted { iterations, .. }
            | Self::Error { iterations, .. } => *iterations,
        }
    }

    pub fn history(&self) -> &[IterationRecord] {
        match self {
            Self::Approved { history, .. }
            | Self::Exhausted { history, .. }
            | Self::Error { history, .. } => history,
        }
    }
}
