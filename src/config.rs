//! Registry configuration.
//!
//! Values come from an optional YAML file and are then overridden by
//! `STEPDECK_*` environment variables:
//!
//! - `STEPDECK_ROOTS`: framework roots (platform path-list syntax)
//! - `STEPDECK_SCAN_DIRS`: directories whose subdirectories are framework roots
//! - `STEPDECK_STEPS_SUBDIR`: conventional steps sub-root (default `steps`)
//! - `STEPDECK_LOAD_TIMEOUT_MS`: per-step load timeout for concurrent discovery
//! - `STEPDECK_DESCRIPTOR_TIMEOUT_MS`: per-framework descriptor parse timeout

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::FrameworkRoot;
use crate::error::RegistryError;

/// Default steps sub-root inside a framework directory.
pub const DEFAULT_STEPS_SUBDIR: &str = "steps";

/// Configuration for discovery and loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Explicit framework root directories.
    pub roots: Vec<PathBuf>,
    /// Directories scanned one level deep for framework roots.
    pub scan_dirs: Vec<PathBuf>,
    /// Sub-root that step `file` references are relative to.
    pub steps_subdir: String,
    /// Descriptor file names tried in order under each root.
    pub descriptor_files: Vec<String>,
    /// Per-step load timeout (concurrent discovery only).
    pub load_timeout_ms: u64,
    /// Per-framework descriptor timeout (concurrent discovery only).
    pub descriptor_timeout_ms: u64,
    /// Whether the CLI discovers roots concurrently by default.
    pub concurrent: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            scan_dirs: Vec::new(),
            steps_subdir: DEFAULT_STEPS_SUBDIR.to_string(),
            descriptor_files: vec![
                "framework.yaml".to_string(),
                "framework.yml".to_string(),
                "framework.json".to_string(),
            ],
            load_timeout_ms: 5_000,
            descriptor_timeout_ms: 5_000,
            concurrent: false,
        }
    }
}

impl RegistryConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, RegistryError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Apply `STEPDECK_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), RegistryError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), RegistryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(roots) = lookup("STEPDECK_ROOTS") {
            self.roots = std::env::split_paths(&roots).collect();
        }
        if let Some(dirs) = lookup("STEPDECK_SCAN_DIRS") {
            self.scan_dirs = std::env::split_paths(&dirs).collect();
        }
        if let Some(subdir) = lookup("STEPDECK_STEPS_SUBDIR") {
            self.steps_subdir = subdir;
        }
        if let Some(ms) = lookup("STEPDECK_LOAD_TIMEOUT_MS") {
            self.load_timeout_ms = parse_millis("STEPDECK_LOAD_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = lookup("STEPDECK_DESCRIPTOR_TIMEOUT_MS") {
            self.descriptor_timeout_ms = parse_millis("STEPDECK_DESCRIPTOR_TIMEOUT_MS", &ms)?;
        }
        self.check()
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn descriptor_timeout(&self) -> Duration {
        Duration::from_millis(self.descriptor_timeout_ms)
    }

    /// Expand `roots` and `scan_dirs` into a sorted, de-duplicated root list.
    ///
    /// A scan directory contributes each immediate subdirectory that holds one
    /// of the configured descriptor files. Missing scan directories are
    /// logged and ignored.
    pub fn framework_roots(&self) -> Vec<FrameworkRoot> {
        let mut paths: Vec<PathBuf> = self.roots.clone();

        for dir in &self.scan_dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("Skipping scan dir {}: {}", dir.display(), e);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() && self.has_descriptor(&path) {
                    paths.push(path);
                }
            }
        }

        paths.sort();
        paths.dedup();
        paths.into_iter().map(FrameworkRoot::new).collect()
    }

    fn has_descriptor(&self, dir: &Path) -> bool {
        self.descriptor_files
            .iter()
            .any(|name| dir.join(name).is_file())
    }

    fn check(&self) -> Result<(), RegistryError> {
        if self.descriptor_files.is_empty() {
            return Err(RegistryError::Config(
                "descriptor_files must name at least one file".to_string(),
            ));
        }
        if self.steps_subdir.trim().is_empty() {
            return Err(RegistryError::Config(
                "steps_subdir must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_millis(var: &str, raw: &str) -> Result<u64, RegistryError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| RegistryError::Config(format!("{var}={raw:?}: {e}")))
}
