//! The result envelope: request and result shapes shared by every backend.
//!
//! Heterogeneous backend outputs and failures are normalized into
//! [`ExecutionResult`] at the orchestrator boundary. The envelope holds
//! exactly one of `output` / `error`, never both, never neither -- the
//! constructors are the only way to build one.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorDescriptor, ExecutionError};

/// The normalized operations every backend supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Run an agent with an input payload.
    Execute,
    /// List the agents/capabilities the backend provides.
    ListCapabilities,
    /// Validate a configuration against the backend's schema.
    ValidateConfig,
    /// Probe backend liveness.
    HealthCheck,
}

impl Operation {
    /// All four normalized operations, the default set for a registration.
    pub const ALL: [Operation; 4] = [
        Operation::Execute,
        Operation::ListCapabilities,
        Operation::ValidateConfig,
        Operation::HealthCheck,
    ];
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Execute => "execute",
            Operation::ListCapabilities => "list_capabilities",
            Operation::ValidateConfig => "validate_config",
            Operation::HealthCheck => "health_check",
        };
        f.write_str(s)
    }
}

/// Per-request configuration overrides.
///
/// An explicit struct with named optional fields, validated against its
/// schema at request time. There is deliberately no free-form map here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecOverrides {
    /// Model identifier the backend should use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature, `0.0..=2.0`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Upper bound on generated tokens, must be positive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl ExecOverrides {
    /// Validate the overrides. Called once when the request is admitted.
    pub fn validate(&self) -> Result<(), ExecutionError> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) || t.is_nan() {
                return Err(ExecutionError::Configuration(format!(
                    "temperature {t} out of range 0.0..=2.0"
                )));
            }
        }
        if let Some(m) = self.max_output_tokens {
            if m == 0 {
                return Err(ExecutionError::Configuration(
                    "max_output_tokens must be positive".to_string(),
                ));
            }
        }
        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                return Err(ExecutionError::Configuration(
                    "model must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A single execution request. Immutable once submitted: the orchestrator
/// takes it by value and never hands it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Registered backend identifier.
    pub backend: String,
    /// Which normalized operation to run.
    pub operation: Operation,
    /// Opaque input payload, marshalled to the backend unmodified.
    pub input: Value,
    /// Optional per-request configuration overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<ExecOverrides>,
    /// Wall-clock timeout. `None` uses the backend's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Whether the backend should emit incremental output.
    #[serde(default)]
    pub streaming: bool,
}

impl ExecutionRequest {
    /// Build an `Execute` request with defaults for the optional fields.
    pub fn execute(backend: impl Into<String>, input: Value) -> Self {
        Self {
            backend: backend.into(),
            operation: Operation::Execute,
            input,
            overrides: None,
            timeout: None,
            streaming: false,
        }
    }

    /// Build a request for an arbitrary operation with a null payload.
    pub fn operation(backend: impl Into<String>, operation: Operation) -> Self {
        Self {
            backend: backend.into(),
            operation,
            input: Value::Null,
            overrides: None,
            timeout: None,
            streaming: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_overrides(mut self, overrides: ExecOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }
}

/// Terminal status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
    Timeout,
}

/// The canonical result shape returned for every execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Present iff `status == Success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Present iff `status != Success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
    /// Wall-clock time spent on the request.
    pub execution_time: Duration,
    pub backend: String,
    pub operation: Operation,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Build a success envelope.
    pub fn success(
        backend: impl Into<String>,
        operation: Operation,
        output: Value,
        execution_time: Duration,
    ) -> Self {
        Self {
            status: ExecutionStatus::Success,
            output: Some(output),
            error: None,
            execution_time,
            backend: backend.into(),
            operation,
            completed_at: Utc::now(),
        }
    }

    /// Build a failure envelope from a taxonomy error. Timeouts get the
    /// distinct `Timeout` status; everything else is `Failure`.
    pub fn from_error(
        backend: impl Into<String>,
        operation: Operation,
        error: &ExecutionError,
        execution_time: Duration,
    ) -> Self {
        let status = match error {
            ExecutionError::AgentTimeout(_) => ExecutionStatus::Timeout,
            _ => ExecutionStatus::Failure,
        };
        Self {
            status,
            output: None,
            error: Some(error.descriptor()),
            execution_time,
            backend: backend.into(),
            operation,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Code of the carried error, if any.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_has_output_and_no_error() {
        let result = ExecutionResult::success(
            "designer",
            Operation::Execute,
            json!({"html": "<p>hi</p>"}),
            Duration::from_millis(120),
        );
        assert!(result.is_success());
        assert!(result.output.is_some());
        assert!(result.error.is_none());
    }

    #[test]
    fn failure_envelope_has_error_and_no_output() {
        let err = ExecutionError::AgentExecution {
            message: "exited with status 2".into(),
            detail: None,
        };
        let result =
            ExecutionResult::from_error("designer", Operation::Execute, &err, Duration::ZERO);
        assert_eq!(result.status, ExecutionStatus::Failure);
        assert!(result.output.is_none());
        assert_eq!(result.error_code(), Some("AGENT_EXECUTION_ERROR"));
    }

    #[test]
    fn timeout_gets_distinct_status() {
        let err = ExecutionError::AgentTimeout(Duration::from_secs(2));
        let result =
            ExecutionResult::from_error("slow", Operation::Execute, &err, Duration::from_secs(2));
        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(result.error_code(), Some("AGENT_TIMEOUT"));
    }

    #[test]
    fn overrides_accept_valid_values() {
        let overrides = ExecOverrides {
            model: Some("qwen-turbo".into()),
            temperature: Some(0.3),
            max_output_tokens: Some(2000),
        };
        assert!(overrides.validate().is_ok());
    }

    #[test]
    fn overrides_reject_out_of_range_temperature() {
        let overrides = ExecOverrides {
            temperature: Some(3.5),
            ..Default::default()
        };
        let err = overrides.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn overrides_reject_zero_max_tokens() {
        let overrides = ExecOverrides {
            max_output_tokens: Some(0),
            ..Default::default()
        };
        assert!(overrides.validate().is_err());
    }

    #[test]
    fn operation_display_is_snake_case() {
        assert_eq!(Operation::ListCapabilities.to_string(), "list_capabilities");
        assert_eq!(Operation::Execute.to_string(), "execute");
    }

    #[test]
    fn request_builder_defaults() {
        let req = ExecutionRequest::execute("designer", json!({"requirements": "a page"}));
        assert_eq!(req.operation, Operation::Execute);
        assert!(req.timeout.is_none());
        assert!(!req.streaming);
    }
}
