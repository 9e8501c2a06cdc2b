//! Backend registry -- the named collection of registered backend specs.
//!
//! Built once at process start through [`BackendRegistryBuilder`]; the
//! finished registry has no mutation API, so request-handling paths can
//! share it freely behind an `Arc`.

use std::collections::HashMap;

use super::BackendSpec;

/// Read-only collection of [`BackendSpec`] registrations, keyed by name.
///
/// # Example
///
/// ```ignore
/// let registry = BackendRegistry::builder()
///     .register(BackendSpec::new("designer", "/opt/agents/designer"))
///     .register(BackendSpec::new("validator", "/opt/agents/validator"))
///     .build();
/// let spec = registry.get("designer").unwrap();
/// ```
pub struct BackendRegistry {
    backends: HashMap<String, BackendSpec>,
}

impl BackendRegistry {
    /// Start building a registry.
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// Look up a backend by name.
    pub fn get(&self, name: &str) -> Option<&BackendSpec> {
        self.backends.get(name)
    }

    /// Names of all registered backends. Order is not guaranteed.
    pub fn list(&self) -> Vec<&str> {
        self.backends.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`BackendRegistry`]. Registration happens here and only
/// here; once `build()` runs the set of backends is frozen.
#[derive(Default)]
pub struct BackendRegistryBuilder {
    backends: HashMap<String, BackendSpec>,
}

impl BackendRegistryBuilder {
    /// Register a backend spec under its own name. Registering the same
    /// name twice replaces the earlier spec.
    pub fn register(mut self, spec: BackendSpec) -> Self {
        self.backends.insert(spec.name.clone(), spec);
        self
    }

    /// Freeze the registrations into a read-only registry.
    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            backends: self.backends,
        }
    }
}
