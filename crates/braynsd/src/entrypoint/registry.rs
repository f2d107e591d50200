//! Method-name lookup for entrypoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::Entrypoint;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Errors raised while registering entrypoints.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The method name is empty.
    #[error("entrypoint method name is empty")]
    EmptyMethod,
    /// Another entrypoint already owns the method.
    #[error("method '{method}' is already registered")]
    Duplicate { method: String },
    /// The method is handled by the dispatcher itself.
    #[error("method '{method}' is reserved")]
    Reserved { method: String },
}

/// Explicit registry of the methods a service exposes.
///
/// Built once at start-up and handed to the dispatcher; there is no global
/// registration.
#[derive(Default)]
pub struct EntrypointRegistry {
    entrypoints: BTreeMap<String, Arc<dyn Entrypoint>>,
    reserved: Vec<&'static str>,
}

impl EntrypointRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that refuses the given method names.
    #[must_use]
    pub fn with_reserved(reserved: &[&'static str]) -> Self {
        Self {
            entrypoints: BTreeMap::new(),
            reserved: reserved.to_vec(),
        }
    }

    /// Registers an entrypoint under its [`Entrypoint::method`] name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] for empty, reserved or duplicate names.
    pub fn add(&mut self, entrypoint: Arc<dyn Entrypoint>) -> Result<(), RegistryError> {
        let method = entrypoint.method().to_owned();
        if method.is_empty() {
            return Err(RegistryError::EmptyMethod);
        }
        if self.reserved.contains(&method.as_str()) {
            return Err(RegistryError::Reserved { method });
        }
        if self.entrypoints.contains_key(&method) {
            return Err(RegistryError::Duplicate { method });
        }
        debug!(
            target: REGISTRY_TARGET,
            method = %method,
            priority = entrypoint.has_priority(),
            is_async = entrypoint.is_async(),
            "entrypoint registered"
        );
        self.entrypoints.insert(method, entrypoint);
        Ok(())
    }

    /// Finds the entrypoint for a method.
    #[must_use]
    pub fn find(&self, method: &str) -> Option<Arc<dyn Entrypoint>> {
        self.entrypoints.get(method).cloned()
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.entrypoints.keys().map(String::as_str)
    }

    /// Number of registered entrypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entrypoints.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entrypoints.is_empty()
    }

    /// Gives every entrypoint its per-iteration update.
    pub fn update(&self) {
        for entrypoint in self.entrypoints.values() {
            entrypoint.on_update();
        }
    }
}

impl std::fmt::Debug for EntrypointRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EntrypointRegistry")
            .field("methods", &self.methods().collect::<Vec<_>>())
            .finish()
    }
}
