//! Backend registration: the capability descriptor for one agent runtime.
//!
//! A [`BackendSpec`] describes how to invoke a pluggable agent framework
//! out of process: the program to run, its fixed arguments, the normalized
//! operations it supports, and its default timeout. Specs are collected
//! into a [`BackendRegistry`] once at startup; the registry is read-only
//! afterwards and is passed explicitly to the orchestrator -- there is no
//! process-wide singleton.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator
//!     |
//!     v
//! BackendRegistry --get("designer")--> &BackendSpec
//!     |                                     |
//!     |   executor::run_backend(spec, req) -+
//!     |        |
//!     |        v
//!     |   scratch dir { input.json -> child process -> output.json }
//! ```

pub mod registry;

use std::path::PathBuf;
use std::time::Duration;

use crate::envelope::Operation;

pub use registry::{BackendRegistry, BackendRegistryBuilder};

/// Default per-backend timeout when a registration does not override it.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(300);

/// Invocation descriptor for one agent runtime.
#[derive(Debug, Clone)]
pub struct BackendSpec {
    /// Backend identifier, e.g. `"langgraph"` or `"designer"`.
    pub name: String,
    /// Program to spawn for each execution.
    pub program: PathBuf,
    /// Fixed arguments placed before the `--input`/`--output` pair.
    pub args: Vec<String>,
    /// Operations this backend supports. Defaults to all four.
    pub operations: Vec<Operation>,
    /// Timeout applied when the request does not carry one.
    pub default_timeout: Duration,
}

impl BackendSpec {
    /// Create a spec with the default operation set and timeout.
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            operations: Operation::ALL.to_vec(),
            default_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_operations(mut self, operations: impl IntoIterator<Item = Operation>) -> Self {
        self.operations = operations.into_iter().collect();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Whether this backend declares support for `operation`.
    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }
}
