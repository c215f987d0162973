//! Registry and invocation errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading descriptors or configuration.
///
/// Discovery never surfaces these to its caller directly: a failing
/// descriptor is folded into the report as a skipped framework.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// YAML parsing or serialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing or serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No descriptor candidate exists under a framework root.
    #[error("no framework descriptor found in {0}")]
    DescriptorNotFound(PathBuf),

    /// Descriptor content is structurally unusable.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid configuration value.
    #[error("Config error: {0}")]
    Config(String),
}

/// Errors returned when invoking a registered step.
///
/// Everything a step body returns is carried through [`StepError::Failed`]
/// untouched; the other variants describe wiring problems detected by the
/// shim or runtime before the step body runs.
#[derive(Debug, Error)]
pub enum StepError {
    /// No step is registered under the key.
    #[error("step '{0}' is not registered")]
    NotRegistered(String),

    /// The runtime behind a back-reference has been dropped.
    #[error("step runtime is no longer available (calling '{0}')")]
    RuntimeUnavailable(String),

    /// The artifact exposes no invoke capability.
    #[error("step '{0}' has no invocable entry point")]
    NotInvocable(String),

    /// A constructed instance did not match the type its invoke method expects.
    #[error("step '{key}' constructed an instance that is not a {expected}")]
    InstanceMismatch { key: String, expected: &'static str },

    /// The step body failed.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}
