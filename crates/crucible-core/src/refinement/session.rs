//! The session driver: runs the refinement state machine to a terminal
//! outcome.
//!
//! `start_refinement` spawns the driver task and returns a
//! [`SessionHandle`] with an awaitable result, a finite progress-event
//! stream, and a cancellation hook. Cancelling mid-loop aborts the
//! in-flight execution (killing its process tree and releasing its
//! admission slot) and terminates the session as an error.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::envelope::ExecutionRequest;
use crate::error::ErrorDescriptor;
use crate::orchestrator::Orchestrator;
use crate::validation::{VerdictOutcome, VisualValidator};

use super::artifact::{Artifact, build_designer_input};
use super::{
    IterationRecord, Phase, ProgressEvent, RefinementConfig, RefinementOutcome, SessionState,
};

/// Handle to a running refinement session.
pub struct SessionHandle {
    id: Uuid,
    events: Option<mpsc::Receiver<ProgressEvent>>,
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<RefinementOutcome>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Take the progress-event stream. Lazy and finite: events are
    /// produced as the session advances, and exactly one terminal event
    /// (`Complete` or `Error`) closes the stream. Can be taken once.
    pub fn events(&mut self) -> Option<ReceiverStream<ProgressEvent>> {
        self.events.take().map(ReceiverStream::new)
    }

    /// Request cancellation. The session terminates as `Error` once the
    /// in-flight call has been torn down.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the terminal outcome.
    pub async fn result(self) -> RefinementOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => RefinementOutcome::Error {
                error: ErrorDescriptor::new(
                    "AGENT_EXECUTION_ERROR",
                    format!("refinement session task failed: {e}"),
                ),
                iterations: 0,
                history: Vec::new(),
            },
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").field("id", &self.id).finish()
    }
}

/// Start a refinement session for `requirements`.
pub fn start_refinement(
    orchestrator: Arc<Orchestrator>,
    validator: Arc<VisualValidator>,
    requirements: impl Into<String>,
    config: RefinementConfig,
) -> SessionHandle {
    let id = Uuid::new_v4();
    let requirements = requirements.into();
    let cancel = CancellationToken::new();
    // Buffered so the driver never blocks on an observer that lags by a
    // couple of events; a dropped receiver is tolerated entirely.
    let (tx, rx) = mpsc::channel(config.max_iterations as usize * 2 + 4);

    let token = cancel.clone();
    let join = tokio::spawn(async move {
        let outcome = drive(&orchestrator, &validator, &requirements, &config, &tx, &token).await;
        info!(
            session = %id,
            approved = outcome.is_approved(),
            iterations = outcome.iterations(),
            "refinement session terminated"
        );
        outcome
    });

    SessionHandle {
        id,
        events: Some(rx),
        cancel,
        join,
    }
}

/// Mutable loop state threaded between the machine's phases.
struct DriveState {
    history: Vec<IterationRecord>,
    iteration: u32,
    feedback: Option<String>,
    current: Option<Artifact>,
    outcome: Option<RefinementOutcome>,
}

/// Run the state machine to a terminal [`SessionState`].
///
/// Each loop turn handles exactly one state and returns the successor;
/// terminal states stop the loop and must have stored the outcome.
async fn drive(
    orchestrator: &Orchestrator,
    validator: &VisualValidator,
    requirements: &str,
    config: &RefinementConfig,
    tx: &mpsc::Sender<ProgressEvent>,
    cancel: &CancellationToken,
) -> RefinementOutcome {
    let mut state = SessionState::Init;
    let mut s = DriveState {
        history: Vec::new(),
        iteration: 0,
        feedback: None,
        current: None,
        outcome: None,
    };

    while !state.is_terminal() {
        state = match state {
            SessionState::Init => init(config, tx, &mut s).await,
            SessionState::Designing => {
                designing(orchestrator, requirements, config, tx, cancel, &mut s).await
            }
            SessionState::Validating => {
                validating(orchestrator, validator, requirements, config, tx, cancel, &mut s)
                    .await
            }
            // Unreachable: the loop condition stops on terminal states.
            terminal => terminal,
        };
    }

    s.outcome.unwrap_or_else(|| RefinementOutcome::Error {
        error: ErrorDescriptor::new(
            "AGENT_EXECUTION_ERROR",
            "refinement session terminated without an outcome",
        ),
        iterations: s.iteration,
        history: s.history,
    })
}

/// Validate the session configuration before any backend work starts.
async fn init(
    config: &RefinementConfig,
    tx: &mpsc::Sender<ProgressEvent>,
    s: &mut DriveState,
) -> SessionState {
    if config.max_iterations == 0 {
        let error =
            ErrorDescriptor::new("CONFIGURATION_ERROR", "max_iterations must be positive");
        s.outcome = Some(failed(tx, s.iteration, std::mem::take(&mut s.history), error).await);
        return SessionState::Error;
    }
    SessionState::Designing
}

/// One designer call: produce the next artifact or terminate.
async fn designing(
    orchestrator: &Orchestrator,
    requirements: &str,
    config: &RefinementConfig,
    tx: &mpsc::Sender<ProgressEvent>,
    cancel: &CancellationToken,
    s: &mut DriveState,
) -> SessionState {
    emit(
        tx,
        ProgressEvent {
            phase: Phase::Designing,
            iteration: s.iteration + 1,
            feedback: s.feedback.clone(),
        },
    )
    .await;

    let input = build_designer_input(requirements, s.current.as_ref(), s.feedback.as_deref());
    let mut request = ExecutionRequest::execute(config.designer_backend.clone(), input);
    if let Some(timeout) = config.designer_timeout {
        request = request.with_timeout(timeout);
    }

    let result = tokio::select! {
        result = orchestrator.execute(request) => result,
        _ = cancel.cancelled() => {
            s.outcome = Some(cancelled(tx, s.iteration, std::mem::take(&mut s.history)).await);
            return SessionState::Error;
        }
    };

    if !result.is_success() {
        let error = result.error.unwrap_or_else(|| {
            ErrorDescriptor::new("AGENT_EXECUTION_ERROR", "designer returned no error")
        });
        s.outcome = Some(failed(tx, s.iteration, std::mem::take(&mut s.history), error).await);
        return SessionState::Error;
    }

    let output = result.output.unwrap_or(serde_json::Value::Null);
    let Some(artifact) = Artifact::from_designer_output(&output) else {
        let error = ErrorDescriptor::new(
            "AGENT_EXECUTION_ERROR",
            format!(
                "designer '{}' produced no parseable artifact",
                config.designer_backend
            ),
        );
        s.outcome = Some(failed(tx, s.iteration, std::mem::take(&mut s.history), error).await);
        return SessionState::Error;
    };

    s.iteration += 1;
    s.current = Some(artifact);
    SessionState::Validating
}

/// One validator call: route the verdict to approval, another design
/// pass, or exhaustion.
async fn validating(
    orchestrator: &Orchestrator,
    validator: &VisualValidator,
    requirements: &str,
    config: &RefinementConfig,
    tx: &mpsc::Sender<ProgressEvent>,
    cancel: &CancellationToken,
    s: &mut DriveState,
) -> SessionState {
    emit(
        tx,
        ProgressEvent {
            phase: Phase::Validating,
            iteration: s.iteration,
            feedback: None,
        },
    )
    .await;

    // A Validating entry always follows a successful design pass.
    let artifact = s.current.clone().unwrap_or_default();

    let verdict = tokio::select! {
        verdict = validator.validate(orchestrator, &artifact, requirements) => verdict,
        _ = cancel.cancelled() => {
            s.outcome = Some(cancelled(tx, s.iteration, std::mem::take(&mut s.history)).await);
            return SessionState::Error;
        }
    };

    let verdict = match verdict {
        Ok(verdict) => verdict,
        Err(error) => {
            s.outcome =
                Some(failed(tx, s.iteration, std::mem::take(&mut s.history), error).await);
            return SessionState::Error;
        }
    };

    if verdict.degraded {
        // Surfaced loudly, not just as a flag in the history.
        warn!(
            iteration = s.iteration,
            "validation degraded to text-only analysis for this iteration"
        );
    }

    s.history.push(IterationRecord {
        iteration: s.iteration,
        artifact: artifact.clone(),
        verdict: verdict.clone(),
    });

    match verdict.outcome {
        VerdictOutcome::Approved => {
            emit(
                tx,
                ProgressEvent {
                    phase: Phase::Complete,
                    iteration: s.iteration,
                    feedback: Some(verdict.feedback),
                },
            )
            .await;
            s.outcome = Some(RefinementOutcome::Approved {
                artifact,
                iterations: s.iteration,
                history: std::mem::take(&mut s.history),
            });
            SessionState::Approved
        }
        VerdictOutcome::Rejected | VerdictOutcome::DegradedError => {
            if s.iteration >= config.max_iterations {
                emit(
                    tx,
                    ProgressEvent {
                        phase: Phase::Complete,
                        iteration: s.iteration,
                        feedback: Some(verdict.feedback.clone()),
                    },
                )
                .await;
                s.outcome = Some(RefinementOutcome::Exhausted {
                    artifact,
                    feedback: verdict.feedback,
                    iterations: s.iteration,
                    history: std::mem::take(&mut s.history),
                });
                return SessionState::Exhausted;
            }
            s.feedback = Some(verdict.feedback);
            SessionState::Designing
        }
    }
}

async fn cancelled(
    tx: &mpsc::Sender<ProgressEvent>,
    iteration: u32,
    history: Vec<IterationRecord>,
) -> RefinementOutcome {
    let error = ErrorDescriptor::new("AGENT_EXECUTION_ERROR", "refinement session cancelled");
    failed(tx, iteration, history, error).await
}

async fn failed(
    tx: &mpsc::Sender<ProgressEvent>,
    iteration: u32,
    history: Vec<IterationRecord>,
    error: ErrorDescriptor,
) -> RefinementOutcome {
    emit(
        tx,
        ProgressEvent {
            phase: Phase::Error,
            iteration,
            feedback: Some(error.to_string()),
        },
    )
    .await;
    RefinementOutcome::Error {
        error,
        iterations: iteration,
        history,
    }
}

/// Best-effort send: a caller that dropped the event stream does not
/// stall the session.
async fn emit(tx: &mpsc::Sender<ProgressEvent>, event: ProgressEvent) {
    let _ = tx.send(event).await;
}
