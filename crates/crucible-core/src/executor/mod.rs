//! Process execution adapter: runs one backend invocation as an isolated
//! child process.
//!
//! Every execution gets a fresh scratch directory. The request payload is
//! serialized to `input.json` inside it, the backend program is spawned in
//! its own process group with the scratch dir as working directory, and a
//! parseable `output.json` (or JSON on stdout) becomes the success payload.
//!
//! Cleanup is unconditional: the scratch dir is a [`tempfile::TempDir`]
//! (removed on drop) and the process group is covered by a kill-on-drop
//! guard, so success, failure, timeout, and caller cancellation all tear
//! down the same way.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::backend::BackendSpec;
use crate::envelope::ExecutionRequest;
use crate::error::ExecutionError;

/// Hard ceiling on any single execution's timeout.
pub const TIMEOUT_CEILING: Duration = Duration::from_secs(3600);

/// Grace period allowed for reaping a killed process.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Run `request` against `spec` as an isolated child process, bounded by
/// `timeout`.
///
/// The caller has already resolved the timeout (request override or the
/// backend default) and holds an admission permit. Dropping the returned
/// future kills the process group and removes the scratch dir.
pub async fn run_backend(
    spec: &BackendSpec,
    request: &ExecutionRequest,
    timeout: Duration,
) -> Result<Value, ExecutionError> {
    if timeout.is_zero() {
        return Err(ExecutionError::Validation(
            "timeout must be positive".to_string(),
        ));
    }
    if timeout > TIMEOUT_CEILING {
        return Err(ExecutionError::Validation(format!(
            "timeout {timeout:?} exceeds ceiling {TIMEOUT_CEILING:?}"
        )));
    }
    if let Some(overrides) = &request.overrides {
        overrides.validate()?;
    }

    // Scratch area: removed on drop, on every exit path.
    let scratch = tempfile::Builder::new()
        .prefix("crucible-")
        .tempdir()
        .map_err(|e| ExecutionError::AgentExecution {
            message: format!("failed to create scratch dir: {e}"),
            detail: None,
        })?;

    let input_path = scratch.path().join("input.json");
    let output_path = scratch.path().join("output.json");

    let marshalled = json!({
        "operation": request.operation,
        "input": request.input,
        "overrides": request.overrides,
        "streaming": request.streaming,
    });
    tokio::fs::write(&input_path, serde_json::to_vec_pretty(&marshalled).map_err(
        |e| ExecutionError::AgentExecution {
            message: format!("failed to serialize input payload: {e}"),
            detail: None,
        },
    )?)
    .await
    .map_err(|e| ExecutionError::AgentExecution {
        message: format!("failed to write input payload: {e}"),
        detail: None,
    })?;

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .current_dir(scratch.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group so a timeout kill reaches every descendant.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ExecutionError::AgentNotFound {
                backend: spec.name.clone(),
                program: spec.program.display().to_string(),
            }
        } else {
            ExecutionError::AgentExecution {
                message: format!("failed to spawn backend '{}': {e}", spec.name),
                detail: None,
            }
        }
    })?;

    let pid = child.id();
    let mut group_guard = ProcessGroupGuard::new(pid);

    debug!(
        backend = %spec.name,
        operation = %request.operation,
        pid = pid,
        scratch = %scratch.path().display(),
        "spawned backend process"
    );

    // Drain the pipes concurrently so the child cannot block on a full one.
    let stdout_task = read_pipe(child.stdout.take());
    let stderr_task = read_pipe(child.stderr.take());

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            group_guard.disarm();
            status
        }
        Ok(Err(e)) => {
            group_guard.kill();
            return Err(ExecutionError::AgentExecution {
                message: format!("failed waiting for backend '{}': {e}", spec.name),
                detail: None,
            });
        }
        Err(_elapsed) => {
            warn!(backend = %spec.name, pid = pid, ?timeout, "backend timed out, killing process group");
            group_guard.kill();
            let _ = child.kill().await;
            // Reap so no zombie is left behind.
            let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
            return Err(ExecutionError::AgentTimeout(timeout));
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    if !status.success() {
        let detail = String::from_utf8_lossy(&stderr).trim().to_string();
        return Err(ExecutionError::AgentExecution {
            message: format!("backend '{}' exited with {status}", spec.name),
            detail: (!detail.is_empty()).then_some(detail),
        });
    }

    parse_output(spec, &output_path, &stdout).await
}

/// Read the output artifact: `output.json` first, then stdout as JSON.
async fn parse_output(
    spec: &BackendSpec,
    output_path: &std::path::Path,
    stdout: &[u8],
) -> Result<Value, ExecutionError> {
    match tokio::fs::read(output_path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| ExecutionError::AgentExecution {
            message: format!("backend '{}' produced unparseable output.json: {e}", spec.name),
            detail: Some(String::from_utf8_lossy(&bytes).chars().take(512).collect()),
        }),
        Err(_) => {
            // No output file -- the backend may have written JSON to stdout.
            let text = String::from_utf8_lossy(stdout);
            serde_json::from_str(text.trim()).map_err(|_| ExecutionError::AgentExecution {
                message: format!("backend '{}' produced no parseable output", spec.name),
                detail: (!text.trim().is_empty())
                    .then(|| text.trim().chars().take(512).collect()),
            })
        }
    }
}

/// Spawn a task that drains a child pipe to completion.
fn read_pipe<R>(pipe: Option<R>) -> tokio::task::JoinHandle<Vec<u8>>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

/// Kills the child's whole process group on drop unless disarmed.
///
/// `kill_on_drop` on the [`Command`] only covers the direct child; this
/// guard covers its descendants when the future is dropped mid-flight
/// (caller cancellation) or a timeout fires.
struct ProcessGroupGuard {
    pgid: Option<i32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.map(|p| p as i32),
        }
    }

    /// The process exited on its own; nothing left to kill.
    fn disarm(&mut self) {
        self.pgid = None;
    }

    /// Kill the group now and disarm.
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: i32) {
    // Negative pid addresses the whole process group. The child was placed
    // in its own group at spawn, so this cannot hit unrelated processes.
    // SAFETY: plain syscall on a pgid we created.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: i32) {
    // Non-Unix: kill_on_drop already covers the direct child.
}
