//! Compile-time plugin table.
//!
//! Step artifacts are linked into the host binary and registered here under
//! the same composite key the descriptor produces. At load time the loader
//! has already confirmed the declared file exists; the table then supplies
//! the artifact linked for that key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{ArtifactSource, LoadRequest, NotLinked};
use crate::artifact::{Artifact, StepClass};

/// Builds an artifact on demand. May fail.
pub type ArtifactFactory = Arc<dyn Fn(&LoadRequest<'_>) -> anyhow::Result<Artifact> + Send + Sync>;

/// Composite key → artifact factory table.
#[derive(Clone, Default)]
pub struct PluginTable {
    entries: HashMap<String, ArtifactFactory>,
}

impl PluginTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a factory under `key` (`"{framework}.{step}"`). Replaces any
    /// previous entry.
    pub fn link<F>(&mut self, key: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&LoadRequest<'_>) -> anyhow::Result<Artifact> + Send + Sync + 'static,
    {
        self.entries.insert(key.into(), Arc::new(factory));
        self
    }

    /// Link a ready-made artifact; each load hands out a clone.
    pub fn link_artifact(&mut self, key: impl Into<String>, artifact: Artifact) -> &mut Self {
        self.link(key, move |_| Ok(artifact.clone()))
    }

    /// Link a [`StepClass`] as a constructible artifact.
    pub fn link_class<T: StepClass>(&mut self, key: impl Into<String>) -> &mut Self {
        self.link(key, |_| Ok(Artifact::constructible::<T>()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Linked keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ArtifactSource for PluginTable {
    fn load(&self, request: &LoadRequest<'_>) -> anyhow::Result<Artifact> {
        let factory = self
            .entries
            .get(request.key.as_str())
            .ok_or_else(|| NotLinked(request.key.to_string()))?;
        factory(request)
    }
}

impl fmt::Debug for PluginTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginTable")
            .field("keys", &self.keys())
            .finish()
    }
}
