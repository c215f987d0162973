//! Structural validation of loaded artifacts.
//!
//! Classification happens once, here. Everything downstream matches on
//! [`ShapeKind`] / [`Artifact`] instead of probing again.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

pub const ERR_NO_ARTIFACT: &str = "no artifact was loaded";
pub const ERR_NO_INVOKE: &str = "no invocable entry point";
pub const WARN_NO_CONFIG: &str = "no declared config";

/// Detected artifact shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeKind {
    Constructible,
    CapabilityObject,
    Unrecognized,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Constructible => "constructible",
            Self::CapabilityObject => "capability-object",
            Self::Unrecognized => "unrecognized",
        })
    }
}

/// Result of validating one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub shape: ShapeKind,
    pub has_invoke: bool,
    pub has_metadata: bool,
}

/// Validate an artifact's structural contract.
///
/// A missing invoke capability is the only hard failure; missing config is a
/// warning. `source` is used for diagnostics only.
pub fn validate(artifact: Option<&Artifact>, source: &Path) -> ValidationResult {
    let Some(artifact) = artifact else {
        log::debug!("Validation of {}: nothing loaded", source.display());
        return ValidationResult {
            is_valid: false,
            errors: vec![ERR_NO_ARTIFACT.to_string()],
            warnings: Vec::new(),
            shape: ShapeKind::Unrecognized,
            has_invoke: false,
            has_metadata: false,
        };
    };

    let (shape, has_invoke, has_metadata) = match artifact {
        Artifact::Constructible(c) => (ShapeKind::Constructible, c.has_invoke(), c.config().is_some()),
        Artifact::CapabilityObject(o) => {
            (ShapeKind::CapabilityObject, o.has_invoke(), o.config().is_some())
        }
    };

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if !has_invoke {
        errors.push(ERR_NO_INVOKE.to_string());
    }
    if !has_metadata {
        warnings.push(WARN_NO_CONFIG.to_string());
    }

    let is_valid = has_invoke && errors.is_empty();
    log::debug!(
        "Validation of {}: shape={} invoke={} config={} valid={}",
        source.display(),
        shape,
        has_invoke,
        has_metadata,
        is_valid
    );

    ValidationResult {
        is_valid,
        errors,
        warnings,
        shape,
        has_invoke,
        has_metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{CapabilityObject, Constructible};
    use serde_json::{json, Value};

    fn path() -> &'static Path {
        Path::new("/frameworks/alpha/steps/run.step")
    }

    #[test]
    fn test_absent_artifact() {
        let result = validate(None, path());
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec![ERR_NO_ARTIFACT.to_string()]);
        assert_eq!(result.shape, ShapeKind::Unrecognized);
    }

    #[test]
    fn test_constructible_with_only_invoke_is_valid() {
        let artifact = Artifact::Constructible(
            Constructible::new(|| ()).with_invoke(|_: &mut (), _, _| Ok(Value::Null)),
        );
        let result = validate(Some(&artifact), path());
        assert!(result.is_valid);
        assert_eq!(result.shape, ShapeKind::Constructible);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings, vec![WARN_NO_CONFIG.to_string()]);
    }

    #[test]
    fn test_capability_object_with_only_invoke_is_valid() {
        let artifact = Artifact::from_fn(|_, _| Ok(Value::Null));
        let result = validate(Some(&artifact), path());
        assert!(result.is_valid);
        assert_eq!(result.shape, ShapeKind::CapabilityObject);
        assert!(result.has_invoke);
        assert!(!result.has_metadata);
    }

    #[test]
    fn test_metadata_without_invoke_fails_with_one_error() {
        let artifact =
            Artifact::CapabilityObject(CapabilityObject::new().with_config(json!({"timeout": 30})));
        let result = validate(Some(&artifact), path());
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec![ERR_NO_INVOKE.to_string()]);
        assert!(result.warnings.is_empty());
        assert!(result.has_metadata);
    }

    #[test]
    fn test_constructible_without_invoke_fails() {
        let artifact = Artifact::Constructible(Constructible::new(|| 0u32).with_config(json!({})));
        let result = validate(Some(&artifact), path());
        assert!(!result.is_valid);
        assert_eq!(result.shape, ShapeKind::Constructible);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_bare_capability_object_reports_error_and_warning() {
        let artifact = Artifact::CapabilityObject(CapabilityObject::new());
        let result = validate(Some(&artifact), path());
        assert!(!result.is_valid);
        assert_eq!(result.errors, vec![ERR_NO_INVOKE.to_string()]);
        assert_eq!(result.warnings, vec![WARN_NO_CONFIG.to_string()]);
    }

    #[test]
    fn test_full_artifact_has_no_warnings() {
        let artifact = Artifact::CapabilityObject(
            CapabilityObject::new()
                .with_invoke(|_, _| Ok(Value::Null))
                .with_config(json!({"retries": 2})),
        );
        let result = validate(Some(&artifact), path());
        assert!(result.is_valid);
        assert!(result.warnings.is_empty());
    }
}
