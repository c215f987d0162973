//! Framework descriptor types: the on-disk schema a framework package uses
//! to declare its steps.
//!
//! A descriptor is pure data. It is parsed once per discovery pass, its steps
//! are absorbed into [`crate::discovery::LoadedStep`] records, and the
//! descriptor itself is dropped.
//!
//! # Example YAML
//!
//! ```yaml
//! name: alpha
//! version: "1.2.0"
//! steps:
//!   build:
//!     name: "Build"
//!     type: action
//!     category: ci
//!     description: "Compile the workspace"
//!     dependencies: ["terminal"]
//!     file: "steps/build.step"
//! ```

use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

// ============================================================================
// StepKey
// ============================================================================

/// Composite `"{framework}.{step}"` key shared by the report, the flat step
/// table and the step runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepKey(String);

impl StepKey {
    pub fn new(framework: &str, step: &str) -> Self {
        Self(format!("{framework}.{step}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Framework part of the key (everything before the first dot).
    pub fn framework(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    /// Step part of the key (everything after the first dot).
    pub fn step(&self) -> &str {
        match self.0.find('.') {
            Some(pos) => &self.0[pos + 1..],
            None => "",
        }
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StepKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StepKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// StepConfig
// ============================================================================

/// One entry of a descriptor's `steps` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Step type (e.g. `action`, `check`).
    #[serde(rename = "type", default)]
    pub step_type: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// Capability names the step expects at call time. Informational only.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Artifact path relative to the framework's steps sub-root.
    ///
    /// Absence is a configuration defect reported as `missing-config`.
    #[serde(default)]
    pub file: Option<String>,
}

impl StepConfig {
    /// Descriptive fields the entry leaves out or blank, in schema order.
    ///
    /// `dependencies` is not listed: an empty list means the step needs no
    /// capabilities.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("name", &self.name),
            ("type", &self.step_type),
            ("category", &self.category),
            ("description", &self.description),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect()
    }
}

// ============================================================================
// FrameworkDescriptor
// ============================================================================

/// A parsed framework descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkDescriptor {
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Directory the descriptor was read from. Set by [`Self::load`].
    #[serde(skip)]
    pub file_root: PathBuf,
    /// Steps in declaration order. A repeated step name keeps its first
    /// position and its last definition.
    #[serde(default)]
    pub steps: IndexMap<String, StepConfig>,
}

impl FrameworkDescriptor {
    /// Parse a descriptor from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, RegistryError> {
        let descriptor: Self = serde_yaml::from_str(yaml)?;
        descriptor.check()?;
        Ok(descriptor)
    }

    /// Parse a descriptor from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let descriptor: Self = serde_json::from_str(json)?;
        descriptor.check()?;
        Ok(descriptor)
    }

    /// Parse a descriptor file, choosing the format by extension.
    ///
    /// `file_root` is set to the file's parent directory.
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

        let mut descriptor = if is_json {
            Self::from_json(&content)?
        } else {
            Self::from_yaml(&content)?
        };
        descriptor.file_root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(descriptor)
    }

    /// Locate the first existing descriptor candidate under `root` and parse it.
    pub fn load(root: &Path, candidates: &[String]) -> Result<Self, RegistryError> {
        let path = Self::locate(root, candidates)?;
        Self::from_file(&path)
    }

    /// Return the path of the first descriptor candidate present under `root`.
    pub fn locate(root: &Path, candidates: &[String]) -> Result<PathBuf, RegistryError> {
        candidates
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| RegistryError::DescriptorNotFound(root.to_path_buf()))
    }

    /// Composite key for one of this framework's steps.
    pub fn key_for(&self, step_name: &str) -> StepKey {
        StepKey::new(&self.name, step_name)
    }

    fn check(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::Validation(
                "framework name must not be empty".to_string(),
            ));
        }
        if self.name.contains('.') || self.name.chars().any(char::is_whitespace) {
            return Err(RegistryError::Validation(format!(
                "framework name '{}' must not contain '.' or whitespace",
                self.name
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
