//! Registration adapter: wraps loaded steps in identity-injecting shims and
//! publishes them into a [`StepRuntime`].
//!
//! Registration is best effort. A missing runtime, or one that is not
//! accepting registrations, skips the step with a warning; the step stays in
//! the discovery report as loaded and the skip is returned as
//! [`Registration::Skipped`] so callers can tell "loaded" from "invocable".

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::artifact::{Artifact, CallContext, StepContext};
use crate::descriptor::{StepConfig, StepKey};
use crate::discovery::LoadedStep;
use crate::error::StepError;
use crate::runtime::{RuntimeHandle, StepRuntime};

// ============================================================================
// StepShim
// ============================================================================

/// Declared metadata carried by a shim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepMetadata {
    #[serde(rename = "type")]
    pub step_type: String,
    pub category: String,
    pub description: String,
    pub dependencies: Vec<String>,
}

impl From<&StepConfig> for StepMetadata {
    fn from(config: &StepConfig) -> Self {
        Self {
            step_type: config.step_type.clone(),
            category: config.category.clone(),
            description: config.description.clone(),
            dependencies: config.dependencies.clone(),
        }
    }
}

/// The invocable published into the runtime for one step.
pub struct StepShim {
    key: StepKey,
    framework: String,
    step_name: String,
    metadata: StepMetadata,
    artifact: Artifact,
    runtime: RuntimeHandle,
}

impl StepShim {
    /// Build a shim for a loaded step, bound to `runtime`.
    pub fn new(loaded: &LoadedStep, runtime: RuntimeHandle) -> Self {
        Self {
            key: loaded.key(),
            framework: loaded.framework.clone(),
            step_name: loaded.name.clone(),
            metadata: StepMetadata::from(&loaded.config),
            artifact: loaded.artifact.clone(),
            runtime,
        }
    }

    pub fn key(&self) -> &StepKey {
        &self.key
    }

    pub fn framework(&self) -> &str {
        &self.framework
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    pub fn metadata(&self) -> &StepMetadata {
        &self.metadata
    }

    /// Invoke the underlying artifact.
    ///
    /// The caller context is merged with the injected `framework`, `stepName`
    /// and runtime handle; injected values always win. Errors from the step
    /// body are returned unchanged.
    pub fn invoke(&self, ctx: CallContext, options: &Value) -> Result<Value, StepError> {
        let ctx = StepContext::bind(
            &self.key,
            &self.framework,
            &self.step_name,
            self.runtime.clone(),
            ctx,
        );
        log::debug!("Invoking step '{}'", self.key);
        self.artifact.dispatch(&ctx, options)
    }
}

impl fmt::Debug for StepShim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepShim")
            .field("key", &self.key)
            .field("metadata", &self.metadata)
            .field("artifact", &self.artifact)
            .finish()
    }
}

// ============================================================================
// register
// ============================================================================

/// Why a loaded step was not published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationSkip {
    /// No runtime was supplied.
    RuntimeUnavailable,
    /// The runtime exists but refuses registrations.
    RuntimeNotAccepting,
}

impl fmt::Display for RegistrationSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RuntimeUnavailable => f.write_str("runtime-unavailable"),
            Self::RuntimeNotAccepting => f.write_str("runtime-not-accepting"),
        }
    }
}

/// Outcome of registering one loaded step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Registration {
    Published { key: StepKey },
    Skipped { key: StepKey, reason: RegistrationSkip },
}

impl Registration {
    pub fn key(&self) -> &StepKey {
        match self {
            Self::Published { key } | Self::Skipped { key, .. } => key,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

/// Publish one loaded step into `runtime` under its composite key.
pub fn register(loaded: &LoadedStep, runtime: Option<&Arc<dyn StepRuntime>>) -> Registration {
    let key = loaded.key();

    let runtime = match runtime {
        Some(rt) if rt.accepts_registrations() => rt,
        Some(_) => {
            log::warn!(
                "Step runtime is not accepting registrations; '{}' stays loaded but is not invocable",
                key
            );
            return Registration::Skipped {
                key,
                reason: RegistrationSkip::RuntimeNotAccepting,
            };
        }
        None => {
            log::warn!(
                "Step runtime not initialized; '{}' stays loaded but is not invocable",
                key
            );
            return Registration::Skipped {
                key,
                reason: RegistrationSkip::RuntimeUnavailable,
            };
        }
    };

    let shim = StepShim::new(loaded, RuntimeHandle::new(runtime));
    runtime.register(&key, Arc::new(shim));
    log::debug!("Registered step '{}'", key);
    Registration::Published { key }
}
