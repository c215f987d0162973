//! Executable step artifacts.
//!
//! Framework authors ship steps in one of two shapes:
//!
//! - **Constructible**: a type. Each invocation constructs a fresh instance
//!   and calls the invoke method declared on the type. No instance state is
//!   shared between calls.
//! - **Capability object**: a plain value exposing an invoke function and
//!   optional config directly.
//!
//! Both shapes may omit the invoke capability or the config; the
//! [`crate::validator`] decides whether what was loaded is usable.
//!
//! # Example
//!
//! ```rust
//! use stepdeck::artifact::{Artifact, CapabilityObject, StepClass, StepContext};
//! use serde_json::{json, Value};
//!
//! #[derive(Default)]
//! struct Counter {
//!     calls: u32,
//! }
//!
//! impl StepClass for Counter {
//!     fn invoke(&mut self, _ctx: &StepContext, _options: &Value) -> anyhow::Result<Value> {
//!         self.calls += 1;
//!         Ok(json!(self.calls))
//!     }
//! }
//!
//! let typed = Artifact::constructible::<Counter>();
//! let plain = Artifact::CapabilityObject(
//!     CapabilityObject::new().with_invoke(|ctx, _| Ok(json!(ctx.framework()))),
//! );
//! assert!(typed.has_invoke() && plain.has_invoke());
//! ```

pub mod context;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::StepError;

pub use context::{CallContext, StepContext, FRAMEWORK_KEY, RESERVED_KEYS, RUNTIME_KEY, STEP_NAME_KEY};

/// A per-call instance of a constructible step.
pub type Instance = Box<dyn Any + Send>;

/// Invoke function of a capability object.
pub type InvokeFn = Arc<dyn Fn(&StepContext, &Value) -> anyhow::Result<Value> + Send + Sync>;

type ConstructFn = Arc<dyn Fn() -> Instance + Send + Sync>;
type MethodFn =
    Arc<dyn Fn(&mut Instance, &StepContext, &Value) -> Result<Value, StepError> + Send + Sync>;

// ============================================================================
// StepClass: typed constructible steps
// ============================================================================

/// A step type whose instances are built fresh for every invocation.
pub trait StepClass: Default + Send + 'static {
    fn invoke(&mut self, ctx: &StepContext, options: &Value) -> anyhow::Result<Value>;

    /// Declared config for the type, if any.
    fn config() -> Option<Value> {
        None
    }
}

// ============================================================================
// Constructible
// ============================================================================

/// A constructible artifact: a constructor plus the methods its instances have.
#[derive(Clone)]
pub struct Constructible {
    type_name: &'static str,
    construct: ConstructFn,
    invoke: Option<MethodFn>,
    config: Option<Value>,
}

impl Constructible {
    /// A constructible with only a constructor; no invoke method, no config.
    pub fn new<T, F>(construct: F) -> Self
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            construct: Arc::new(move || Box::new(construct()) as Instance),
            invoke: None,
            config: None,
        }
    }

    /// Build from a [`StepClass`] implementation.
    pub fn of<T: StepClass>() -> Self {
        let mut this = Self::new(T::default).with_invoke(|instance: &mut T, ctx, options| {
            instance.invoke(ctx, options)
        });
        this.config = T::config();
        this
    }

    /// Declare the invoke method. `T` must be the type the constructor builds.
    pub fn with_invoke<T, F>(mut self, method: F) -> Self
    where
        T: Send + 'static,
        F: Fn(&mut T, &StepContext, &Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let expected = std::any::type_name::<T>();
        let bound: MethodFn = Arc::new(move |instance: &mut Instance, ctx: &StepContext, options: &Value| {
            let typed = instance.downcast_mut::<T>().ok_or_else(|| StepError::InstanceMismatch {
                key: ctx.key().to_string(),
                expected,
            })?;
            method(typed, ctx, options).map_err(StepError::Failed)
        });
        self.invoke = Some(bound);
        self
    }

    /// Declare static config for the type.
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn has_invoke(&self) -> bool {
        self.invoke.is_some()
    }

    pub fn config(&self) -> Option<&Value> {
        self.config.as_ref()
    }

    /// Construct a fresh instance.
    pub fn instantiate(&self) -> Instance {
        (self.construct)()
    }

    /// Construct a fresh instance and call its invoke method.
    pub(crate) fn call(&self, ctx: &StepContext, options: &Value) -> Result<Value, StepError> {
        let method = self
            .invoke
            .as_ref()
            .ok_or_else(|| StepError::NotInvocable(ctx.key().to_string()))?;
        let mut instance = self.instantiate();
        method(&mut instance, ctx, options)
    }
}

impl fmt::Debug for Constructible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructible")
            .field("type_name", &self.type_name)
            .field("has_invoke", &self.has_invoke())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// CapabilityObject
// ============================================================================

/// A capability-object artifact: invoke and config exposed directly.
#[derive(Clone, Default)]
pub struct CapabilityObject {
    invoke: Option<InvokeFn>,
    config: Option<Value>,
}

impl CapabilityObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_invoke<F>(mut self, invoke: F) -> Self
    where
        F: Fn(&StepContext, &Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.invoke = Some(Arc::new(invoke));
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn has_invoke(&self) -> bool {
        self.invoke.is_some()
    }

    pub fn config(&self) -> Option<&Value> {
        self.config.as_ref()
    }

    pub(crate) fn call(&self, ctx: &StepContext, options: &Value) -> Result<Value, StepError> {
        let invoke = self
            .invoke
            .as_ref()
            .ok_or_else(|| StepError::NotInvocable(ctx.key().to_string()))?;
        invoke(ctx, options).map_err(StepError::Failed)
    }
}

impl fmt::Debug for CapabilityObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityObject")
            .field("has_invoke", &self.has_invoke())
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Artifact
// ============================================================================

/// A loaded step artifact, tagged by shape.
#[derive(Debug, Clone)]
pub enum Artifact {
    Constructible(Constructible),
    CapabilityObject(CapabilityObject),
}

impl Artifact {
    /// Shorthand for a constructible built from a [`StepClass`].
    pub fn constructible<T: StepClass>() -> Self {
        Self::Constructible(Constructible::of::<T>())
    }

    /// Shorthand for a capability object with only an invoke function.
    pub fn from_fn<F>(invoke: F) -> Self
    where
        F: Fn(&StepContext, &Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::CapabilityObject(CapabilityObject::new().with_invoke(invoke))
    }

    pub fn has_invoke(&self) -> bool {
        match self {
            Self::Constructible(c) => c.has_invoke(),
            Self::CapabilityObject(o) => o.has_invoke(),
        }
    }

    pub fn config(&self) -> Option<&Value> {
        match self {
            Self::Constructible(c) => c.config(),
            Self::CapabilityObject(o) => o.config(),
        }
    }

    /// Dispatch one invocation according to the shape.
    pub(crate) fn dispatch(&self, ctx: &StepContext, options: &Value) -> Result<Value, StepError> {
        match self {
            Self::Constructible(c) => c.call(ctx, options),
            Self::CapabilityObject(o) => o.call(ctx, options),
        }
    }
}
