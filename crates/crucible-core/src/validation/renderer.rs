//! Headless rendering: load a page, capture one snapshot.
//!
//! The default implementation shells out to a headless Chromium in
//! screenshot mode, one fresh browser process per call so no state bleeds
//! between iterations. Failures here are adapter-local (`anyhow`); the
//! visual validator decides whether to degrade to text-only analysis.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Captures a visual snapshot of a local HTML page.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `page` and write a PNG snapshot to `snapshot`.
    async fn capture(&self, page: &Path, snapshot: &Path) -> Result<()>;
}

/// Renders via a headless Chromium subprocess.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    /// Browser binary; `"chromium"` on `$PATH` by default.
    binary: String,
    viewport: (u32, u32),
    render_timeout: Duration,
}

impl ChromiumRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            viewport: (1280, 800),
            render_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = (width, height);
        self
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }
}

impl Default for ChromiumRenderer {
    fn default() -> Self {
        Self::new("chromium")
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn capture(&self, page: &Path, snapshot: &Path) -> Result<()> {
        let (width, height) = self.viewport;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--hide-scrollbars")
            .arg(format!("--window-size={width},{height}"))
            .arg(format!("--screenshot={}", snapshot.display()))
            .arg(format!("file://{}", page.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn browser '{}'", self.binary))?;

        let output = tokio::time::timeout(self.render_timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow::anyhow!("render timed out after {:?}", self.render_timeout))?
            .context("failed waiting for browser")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("browser exited with {}: {}", output.status, stderr.trim());
        }

        let size = tokio::fs::metadata(snapshot)
            .await
            .context("browser produced no snapshot file")?
            .len();
        if size == 0 {
            bail!("browser produced an empty snapshot");
        }

        debug!(
            page = %page.display(),
            snapshot_bytes = size,
            "captured visual snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_browser_binary_fails() {
        let renderer = ChromiumRenderer::new("/nonexistent/browser");
        let tmp = tempfile::tempdir().unwrap();
        let page = tmp.path().join("page.html");
        std::fs::write(&page, "<html></html>").unwrap();

        let err = renderer
            .capture(&page, &tmp.path().join("snap.png"))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to spawn browser"));
    }

    #[tokio::test]
    async fn empty_snapshot_is_an_error() {
        // A fake "browser" that touches the snapshot file but writes nothing.
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("fake_browser.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor arg in \"$@\"; do\n  case \"$arg\" in\n    --screenshot=*) : > \"${arg#--screenshot=}\" ;;\n  esac\ndone\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let renderer = ChromiumRenderer::new(script.to_str().unwrap());
        let page = tmp.path().join("page.html");
        std::fs::write(&page, "<html></html>").unwrap();

        let err = renderer
            .capture(&page, &tmp.path().join("snap.png"))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("empty snapshot"));
    }

    #[tokio::test]
    async fn nonempty_snapshot_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("fake_browser.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nfor arg in \"$@\"; do\n  case \"$arg\" in\n    --screenshot=*) printf 'PNGDATA' > \"${arg#--screenshot=}\" ;;\n  esac\ndone\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let renderer = ChromiumRenderer::new(script.to_str().unwrap());
        let page = tmp.path().join("page.html");
        std::fs::write(&page, "<html></html>").unwrap();

        let snapshot = tmp.path().join("snap.png");
        renderer.capture(&page, &snapshot).await.unwrap();
        assert!(snapshot.exists());
    }
}
