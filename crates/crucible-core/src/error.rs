//! The execution error taxonomy.
//!
//! Every failure that crosses the orchestrator boundary is one of these
//! kinds. Backend-specific failures (process crashes, malformed output,
//! rendering errors) are remapped here before they reach a caller -- no
//! adapter-specific error shape ever escapes past the result envelope.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical error kinds for agent execution.
///
/// Each variant carries a stable machine-readable code (see
/// [`ExecutionError::code`]) alongside the human-readable display message.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The requested backend is not in the registry. No process is spawned.
    #[error("unsupported backend: {0}")]
    FrameworkNotFound(String),

    /// The backend is registered but its program could not be found.
    #[error("backend '{backend}' program not found: {program}")]
    AgentNotFound { backend: String, program: String },

    /// The backend process failed: non-zero exit, spawn failure, or
    /// unparseable output.
    #[error("agent execution failed: {message}")]
    AgentExecution {
        message: String,
        /// Captured diagnostic output (stderr), when available.
        detail: Option<String>,
    },

    /// The backend exceeded its wall-clock timeout. The process tree has
    /// already been terminated when this error surfaces.
    #[error("agent execution timed out after {0:?}")]
    AgentTimeout(Duration),

    /// Request-level input validation failed.
    #[error("input validation failed: {0}")]
    Validation(String),

    /// Configuration overrides failed schema validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The admission controller rejected the request. No process was
    /// started.
    #[error("resource limit: {0}")]
    ResourceLimit(String),
}

impl ExecutionError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FrameworkNotFound(_) => "FRAMEWORK_NOT_FOUND",
            Self::AgentNotFound { .. } => "AGENT_NOT_FOUND",
            Self::AgentExecution { .. } => "AGENT_EXECUTION_ERROR",
            Self::AgentTimeout(_) => "AGENT_TIMEOUT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::ResourceLimit(_) => "RESOURCE_LIMIT_ERROR",
        }
    }

    /// Convert into the serializable descriptor carried by result envelopes.
    pub fn descriptor(&self) -> ErrorDescriptor {
        let detail = match self {
            Self::AgentExecution { detail, .. } => detail.clone(),
            _ => None,
        };
        ErrorDescriptor {
            code: self.code().to_string(),
            message: self.to_string(),
            detail,
        }
    }
}

/// Serializable error shape carried by [`crate::envelope::ExecutionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Machine-readable kind, e.g. `AGENT_TIMEOUT`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional diagnostic detail (captured stderr or similar).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorDescriptor {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            detail: None,
        }
    }
}

impl std::fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
