//! The execution orchestrator: admission-gated, adapter-agnostic dispatch
//! to registered backends.
//!
//! `execute()` is the sole entry point. It resolves the backend spec,
//! acquires an admission permit (cheap-failing before any process starts),
//! runs the process execution adapter, and maps every outcome -- success
//! or any taxonomy error -- into the canonical result envelope. It never
//! returns `Err`; failures are data.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::admission::AdmissionController;
use crate::backend::BackendRegistry;
use crate::envelope::{ExecutionRequest, ExecutionResult, Operation};
use crate::error::ExecutionError;
use crate::executor;

/// Timeout for health probes, deliberately short.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum number of concurrently in-flight executions.
    pub max_concurrent: usize,
    /// How long `execute()` may wait for an admission slot.
    pub admission_wait: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            admission_wait: Duration::from_secs(30),
        }
    }
}

/// Health probe outcome for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub backend: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Adapter-agnostic execution orchestrator.
///
/// Holds the read-only [`BackendRegistry`] (dependency-injected, never a
/// global) and the [`AdmissionController`]. Cheap to share via `Arc`.
pub struct Orchestrator {
    registry: Arc<BackendRegistry>,
    admission: AdmissionController,
}

impl Orchestrator {
    pub fn new(registry: Arc<BackendRegistry>, config: OrchestratorConfig) -> Self {
        Self {
            registry,
            admission: AdmissionController::new(config.max_concurrent, config.admission_wait),
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Execute a request and return the normalized envelope.
    ///
    /// Dropping the returned future cancels the execution: the child
    /// process group is killed and the scratch area and admission slot are
    /// released.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();
        let backend = request.backend.clone();
        let operation = request.operation;

        match self.try_execute(&request).await {
            Ok(output) => {
                info!(
                    backend = %backend,
                    operation = %operation,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "execution succeeded"
                );
                ExecutionResult::success(backend, operation, output, started.elapsed())
            }
            Err(err) => {
                warn!(
                    backend = %backend,
                    operation = %operation,
                    code = err.code(),
                    error = %err,
                    "execution failed"
                );
                ExecutionResult::from_error(backend, operation, &err, started.elapsed())
            }
        }
    }

    async fn try_execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<serde_json::Value, ExecutionError> {
        let spec = self
            .registry
            .get(&request.backend)
            .ok_or_else(|| ExecutionError::FrameworkNotFound(request.backend.clone()))?;

        if !spec.supports(request.operation) {
            return Err(ExecutionError::Validation(format!(
                "backend '{}' does not support operation '{}'",
                spec.name, request.operation
            )));
        }

        let timeout = request.timeout.unwrap_or(spec.default_timeout);

        // Admission before spawn: a rejected request never starts a process.
        let _permit = self.admission.admit().await?;

        executor::run_backend(spec, request, timeout).await
    }

    /// Operations a backend declared at registration.
    pub fn list_operations(&self, backend: &str) -> Result<Vec<Operation>, ExecutionError> {
        self.registry
            .get(backend)
            .map(|spec| spec.operations.clone())
            .ok_or_else(|| ExecutionError::FrameworkNotFound(backend.to_string()))
    }

    /// Probe a backend by asking it to list its capabilities under a short
    /// timeout. A failed probe is `unhealthy`, not an error.
    pub async fn health_check(&self, backend: &str) -> Result<HealthStatus, ExecutionError> {
        if self.registry.get(backend).is_none() {
            return Err(ExecutionError::FrameworkNotFound(backend.to_string()));
        }

        let request = ExecutionRequest::operation(backend, Operation::ListCapabilities)
            .with_timeout(HEALTH_PROBE_TIMEOUT);
        let result = self.execute(request).await;

        Ok(HealthStatus {
            backend: backend.to_string(),
            healthy: result.is_success(),
            error: result.error.map(|e| e.to_string()),
        })
    }

    /// Probe every registered backend.
    pub async fn health_check_all(&self) -> Vec<HealthStatus> {
        let mut statuses = Vec::with_capacity(self.registry.len());
        for name in self.registry.list() {
            // Registry entries cannot disappear; the error arm is unreachable.
            if let Ok(status) = self.health_check(name).await {
                statuses.push(status);
            }
        }
        statuses
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("capacity", &self.admission.capacity())
            .finish()
    }
}
