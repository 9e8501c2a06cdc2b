//! Core engine for crucible: agent backend execution and iterative
//! design refinement.
//!
//! Two layers:
//!
//! - **Execution**: [`Orchestrator`] routes [`ExecutionRequest`]s to
//!   registered [`BackendSpec`]s, gates concurrency through an
//!   [`AdmissionController`], and runs backend programs as isolated
//!   subprocesses with scratch-directory file exchange. Every outcome
//!   is an [`ExecutionResult`] envelope; process-level failures are
//!   mapped to stable [`ExecutionError`] codes, never panics.
//!
//! - **Refinement**: [`start_refinement`] drives a design/validate loop
//!   on top of the execution layer. A designer backend produces an
//!   [`Artifact`], the [`VisualValidator`] renders it in a headless
//!   browser and asks a validator backend for a [`Verdict`], and
//!   rejection feedback is routed into the next design iteration until
//!   approval or the iteration budget runs out.

pub mod admission;
pub mod backend;
pub mod config;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod refinement;
pub mod validation;

pub use admission::{AdmissionController, Permit};
pub use backend::{BackendRegistry, BackendRegistryBuilder, BackendSpec, DEFAULT_BACKEND_TIMEOUT};
pub use envelope::{
    ExecOverrides, ExecutionRequest, ExecutionResult, ExecutionStatus, Operation,
};
pub use error::{ErrorDescriptor, ExecutionError};
pub use orchestrator::{HealthStatus, Orchestrator, OrchestratorConfig};
pub use refinement::{
    Artifact, IterationRecord, Phase, ProgressEvent, RefinementConfig, RefinementOutcome,
    SessionHandle, SessionState, start_refinement,
};
pub use validation::{
    ChromiumRenderer, Renderer, ValidationConfig, Verdict, VerdictOutcome, VisualValidator,
};
