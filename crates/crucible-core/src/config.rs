//! Configuration file management.
//!
//! TOML config at `~/.config/crucible/config.toml` with the resolution
//! chain: env var > config file > default. The file is optional; every
//! key has a default, so an empty deployment works out of the box.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::orchestrator::OrchestratorConfig;
use crate::refinement::RefinementConfig;
use crate::validation::ValidationConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub refinement: RefinementSection,
    #[serde(default)]
    pub validation: ValidationSection,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Maximum concurrently in-flight executions.
    pub max_concurrent: usize,
    /// Admission wait budget, seconds.
    pub admission_wait_secs: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            admission_wait_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementSection {
    pub designer_backend: String,
    pub validator_backend: String,
    pub max_iterations: u32,
}

impl Default for RefinementSection {
    fn default() -> Self {
        Self {
            designer_backend: "designer".to_string(),
            validator_backend: "validator".to_string(),
            max_iterations: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
    pub browser_binary: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub render_timeout_secs: u64,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            browser_binary: "chromium".to_string(),
            viewport_width: 1280,
            viewport_height: 800,
            render_timeout_secs: 20,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Config directory, XDG layout: `$XDG_CONFIG_HOME/crucible` or
/// `~/.config/crucible`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("crucible");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("crucible")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / resolve
// -----------------------------------------------------------------------

/// Load the config file, or defaults when it does not exist.
pub fn load_or_default() -> Result<ConfigFile> {
    let path = config_path();
    if !path.exists() {
        let mut config = ConfigFile::default();
        apply_env_overrides(&mut config);
        return Ok(config);
    }
    load_from(&path)
}

/// Load and parse a config file at an explicit path.
pub fn load_from(path: &std::path::Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let mut config: ConfigFile =
        toml::from_str(&contents).context("failed to parse config file")?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Env var > config file, for the keys that matter operationally.
fn apply_env_overrides(config: &mut ConfigFile) {
    if let Some(n) = env_parse::<usize>("CRUCIBLE_MAX_CONCURRENT") {
        config.execution.max_concurrent = n;
    }
    if let Some(n) = env_parse::<u32>("CRUCIBLE_MAX_ITERATIONS") {
        config.refinement.max_iterations = n;
    }
    if let Ok(binary) = std::env::var("CRUCIBLE_BROWSER") {
        if !binary.is_empty() {
            config.validation.browser_binary = binary;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

impl ConfigFile {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrent: self.execution.max_concurrent,
            admission_wait: Duration::from_secs(self.execution.admission_wait_secs),
        }
    }

    pub fn refinement_config(&self) -> RefinementConfig {
        RefinementConfig {
            designer_backend: self.refinement.designer_backend.clone(),
            max_iterations: self.refinement.max_iterations,
            designer_timeout: None,
        }
    }

    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            browser_binary: self.validation.browser_binary.clone(),
            viewport_width: self.validation.viewport_width,
            viewport_height: self.validation.viewport_height,
            render_timeout: Duration::from_secs(self.validation.render_timeout_secs),
        }
    }

    /// Backend name for the validator capability.
    pub fn validator_backend(&self) -> &str {
        &self.refinement.validator_backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let config: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(config.execution.max_concurrent, 10);
        assert_eq!(config.refinement.max_iterations, 5);
        assert_eq!(config.validation.browser_binary, "chromium");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: ConfigFile = toml::from_str(
            "[execution]\nmax_concurrent = 4\n\n[refinement]\nmax_iterations = 2\n",
        )
        .unwrap();
        assert_eq!(config.execution.max_concurrent, 4);
        assert_eq!(config.execution.admission_wait_secs, 30);
        assert_eq!(config.refinement.max_iterations, 2);
        assert_eq!(config.refinement.designer_backend, "designer");
    }

    #[test]
    fn sections_convert_to_runtime_configs() {
        let config = ConfigFile::default();
        let orch = config.orchestrator_config();
        assert_eq!(orch.max_concurrent, 10);
        assert_eq!(orch.admission_wait, Duration::from_secs(30));

        let refinement = config.refinement_config();
        assert_eq!(refinement.max_iterations, 5);

        let validation = config.validation_config();
        assert_eq!(validation.render_timeout, Duration::from_secs(20));
        assert_eq!(config.validator_backend(), "validator");
    }

    #[test]
    fn load_from_parses_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[validation]\nbrowser_binary = \"chrome\"\n").unwrap();

        let config = load_from(&path).unwrap();
        assert_eq!(config.validation.browser_binary, "chrome");
    }

    #[test]
    fn load_from_rejects_malformed_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "not [valid toml").unwrap();
        assert!(load_from(&path).is_err());
    }
}
