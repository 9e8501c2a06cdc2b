//! Visual validation adapter: render the artifact, snapshot it, and ask
//! the validator capability for a verdict.
//!
//! Each call gets a fresh rendering context (scratch dir + one-shot
//! browser process) so no state bleeds between iterations, and tears it
//! down on every exit path. When rendering fails short of total failure,
//! validation degrades to a text-only call over the artifact's source and
//! the verdict carries the degradation flag.

pub mod renderer;
pub mod verdict;

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tracing::warn;

use crate::envelope::ExecutionRequest;
use crate::error::ErrorDescriptor;
use crate::orchestrator::Orchestrator;
use crate::refinement::artifact::Artifact;

pub use renderer::{ChromiumRenderer, Renderer};
pub use verdict::{DimensionNotes, Verdict, VerdictOutcome};

/// Tuning for the visual validation adapter.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Browser binary for the default renderer.
    pub browser_binary: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub render_timeout: Duration,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            browser_binary: "chromium".to_string(),
            viewport_width: 1280,
            viewport_height: 800,
            render_timeout: Duration::from_secs(20),
        }
    }
}

/// Renders an artifact and obtains a [`Verdict`] from the validator
/// capability through the orchestrator.
pub struct VisualValidator {
    renderer: Box<dyn Renderer>,
    validator_backend: String,
}

impl VisualValidator {
    /// Build with an explicit renderer (tests inject fakes here).
    pub fn new(renderer: Box<dyn Renderer>, validator_backend: impl Into<String>) -> Self {
        Self {
            renderer,
            validator_backend: validator_backend.into(),
        }
    }

    /// Build with the default headless-Chromium renderer.
    pub fn chromium(config: &ValidationConfig, validator_backend: impl Into<String>) -> Self {
        let renderer = ChromiumRenderer::new(config.browser_binary.clone())
            .with_viewport(config.viewport_width, config.viewport_height)
            .with_render_timeout(config.render_timeout);
        Self::new(Box::new(renderer), validator_backend)
    }

    pub fn backend(&self) -> &str {
        &self.validator_backend
    }

    /// Validate an artifact against the requirements text.
    ///
    /// Returns `Err` only for unrecoverable validator-capability failures;
    /// a rendering failure degrades gracefully to text-only analysis.
    pub async fn validate(
        &self,
        orchestrator: &Orchestrator,
        artifact: &Artifact,
        requirements: &str,
    ) -> Result<Verdict, ErrorDescriptor> {
        match self.capture_snapshot(artifact).await {
            Ok(snapshot_b64) => {
                let input = json!({
                    "mode": "visual",
                    "requirements": requirements,
                    "snapshot_png_base64": snapshot_b64,
                    "html": artifact.html,
                    "css": artifact.css,
                    "js": artifact.js,
                });
                let text = self.invoke_validator(orchestrator, input).await?;
                Ok(Verdict::from_response(&text, false))
            }
            Err(render_err) => {
                warn!(
                    backend = %self.validator_backend,
                    error = %format!("{render_err:#}"),
                    "visual rendering failed, degrading to text-only validation"
                );
                let input = json!({
                    "mode": "text",
                    "requirements": requirements,
                    "html": artifact.html,
                    "css": artifact.css,
                    "js": artifact.js,
                });
                let text = self.invoke_validator(orchestrator, input).await?;
                Ok(Verdict::from_response(&text, true))
            }
        }
    }

    /// Fresh rendering context per call: scratch dir, one page, one
    /// snapshot. The scratch dir (and any browser process, via
    /// kill-on-drop) is torn down when this function returns.
    async fn capture_snapshot(&self, artifact: &Artifact) -> anyhow::Result<String> {
        use anyhow::Context as _;

        let scratch = tempfile::Builder::new()
            .prefix("crucible-render-")
            .tempdir()
            .context("failed to create rendering context")?;

        let page = scratch.path().join("page.html");
        tokio::fs::write(&page, artifact.to_page())
            .await
            .context("failed to write page")?;

        let snapshot = scratch.path().join("snapshot.png");
        self.renderer.capture(&page, &snapshot).await?;

        let bytes = tokio::fs::read(&snapshot)
            .await
            .context("failed to read snapshot")?;
        Ok(BASE64.encode(bytes))
    }

    async fn invoke_validator(
        &self,
        orchestrator: &Orchestrator,
        input: Value,
    ) -> Result<String, ErrorDescriptor> {
        let request = ExecutionRequest::execute(self.validator_backend.clone(), input);
        let result = orchestrator.execute(request).await;

        if !result.is_success() {
            // Envelope invariant: a non-success result carries an error.
            return Err(result.error.unwrap_or_else(|| {
                ErrorDescriptor::new("VALIDATION_ERROR", "validator returned no error descriptor")
            }));
        }

        let output = result.output.unwrap_or(Value::Null);
        response_text(&output).ok_or_else(|| {
            ErrorDescriptor::new(
                "VALIDATION_ERROR",
                "validator response carried no readable text",
            )
        })
    }
}

/// Pull the reviewer's text out of a validator response payload.
fn response_text(value: &Value) -> Option<String> {
    if let Some(s) = value.as_str() {
        return Some(s.to_string());
    }
    for key in ["response", "result", "feedback", "content"] {
        if let Some(s) = value.get(key).and_then(|v| v.as_str()) {
            return Some(s.to_string());
        }
    }
    None
}
