//! # stepdeck
//!
//! A registry that discovers independently shipped frameworks, loads the
//! steps each one declares, checks that every step is invocable, and
//! publishes the survivors into a shared step runtime under
//! `"{framework}.{step}"` keys.
//!
//! Discovery is best effort: a bad descriptor, a missing file or a step
//! without an invoke capability is recorded in the [`DiscoveryReport`] and
//! never stops the pass. Only invoking a step can fail hard.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stepdeck::{InMemoryStepRuntime, PluginTable, RegistryConfig, StepRegistry};
//!
//! let config = RegistryConfig::from_yaml_file("stepdeck.yaml")?;
//! let runtime = InMemoryStepRuntime::shared();
//! let mut registry = StepRegistry::new(config, Arc::new(PluginTable::new()))
//!     .with_runtime(runtime.clone());
//!
//! let outcome = registry.refresh();
//! println!("{}", outcome.report.summary());
//! # Ok::<(), stepdeck::RegistryError>(())
//! ```

pub mod artifact;
pub mod config;
pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod registration;
pub mod registry;
pub mod runtime;
pub mod validator;

pub use artifact::{Artifact, CallContext, CapabilityObject, Constructible, StepClass, StepContext};
pub use config::RegistryConfig;
pub use descriptor::{FrameworkDescriptor, StepConfig, StepKey};
pub use discovery::{
    DiscoveryEngine, DiscoveryReport, FrameworkRoot, LoadedStep, ReportSummary, SkipReason,
};
pub use error::{RegistryError, StepError};
pub use loader::{ArtifactLoader, ArtifactSource, LoadFailure, NotLinked, PluginTable};
pub use registration::{register, Registration, StepShim};
pub use registry::{ScanOutcome, StepRegistry};
pub use runtime::{InMemoryStepRuntime, RuntimeHandle, StepRuntime};
pub use validator::{validate, ShapeKind, ValidationResult};
