//! Central step runtime: the key → shim map the orchestrator invokes through.
//!
//! The runtime is an explicitly owned resource: construct it once, share it
//! as `Arc<dyn StepRuntime>` with the registry (which publishes into it) and
//! with the orchestrator (which invokes through it). Shims hold only a weak
//! back-reference, so dropping the last strong handle tears the runtime down.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::Value;

use crate::artifact::CallContext;
use crate::descriptor::StepKey;
use crate::error::StepError;
use crate::registration::StepShim;

/// The registration and lookup surface of a step runtime.
pub trait StepRuntime: Send + Sync {
    /// Whether the runtime is ready to take registrations. A runtime that
    /// answers `false` is treated like an absent one.
    fn accepts_registrations(&self) -> bool {
        true
    }

    /// Publish a shim, replacing any previous shim under the same key.
    fn register(&self, key: &StepKey, shim: Arc<StepShim>);

    /// Look up the shim registered under `key`.
    fn resolve(&self, key: &str) -> Option<Arc<StepShim>>;

    /// Invoke the step registered under `key`.
    fn invoke(&self, key: &str, ctx: CallContext, options: &Value) -> Result<Value, StepError> {
        let shim = self
            .resolve(key)
            .ok_or_else(|| StepError::NotRegistered(key.to_string()))?;
        shim.invoke(ctx, options)
    }
}

// ============================================================================
// InMemoryStepRuntime
// ============================================================================

/// Concurrent in-memory runtime.
///
/// Registrations of different keys never contend on the same shard lock;
/// registrations of the same key replace each other atomically.
#[derive(Default)]
pub struct InMemoryStepRuntime {
    steps: DashMap<StepKey, Arc<StepShim>>,
    closed: AtomicBool,
}

impl InMemoryStepRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor returning the shared trait-object form.
    pub fn shared() -> Arc<dyn StepRuntime> {
        Arc::new(Self::new())
    }

    /// Stop accepting registrations. Already registered steps stay invocable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<StepKey> {
        let mut keys: Vec<StepKey> = self.steps.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl StepRuntime for InMemoryStepRuntime {
    fn accepts_registrations(&self) -> bool {
        !self.is_closed()
    }

    fn register(&self, key: &StepKey, shim: Arc<StepShim>) {
        if self.steps.insert(key.clone(), shim).is_some() {
            log::debug!("StepRuntime: replaced '{}'", key);
        } else {
            log::debug!("StepRuntime: registered '{}'", key);
        }
    }

    fn resolve(&self, key: &str) -> Option<Arc<StepShim>> {
        self.steps.get(key).map(|e| Arc::clone(e.value()))
    }
}

impl fmt::Debug for InMemoryStepRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStepRuntime")
            .field("steps", &self.keys())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// RuntimeHandle
// ============================================================================

/// Weak back-reference to the runtime, injected into every step context.
#[derive(Clone, Default)]
pub struct RuntimeHandle {
    inner: Option<Weak<dyn StepRuntime>>,
}

impl RuntimeHandle {
    pub fn new(runtime: &Arc<dyn StepRuntime>) -> Self {
        Self {
            inner: Some(Arc::downgrade(runtime)),
        }
    }

    /// A handle that points at no runtime.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn upgrade(&self) -> Option<Arc<dyn StepRuntime>> {
        self.inner.as_ref().and_then(Weak::upgrade)
    }

    /// Invoke another registered step.
    pub fn invoke(&self, key: &str, ctx: CallContext, options: &Value) -> Result<Value, StepError> {
        let runtime = self
            .upgrade()
            .ok_or_else(|| StepError::RuntimeUnavailable(key.to_string()))?;
        runtime.invoke(key, ctx, options)
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.upgrade() {
            Some(_) => "attached",
            None => "detached",
        };
        write!(f, "RuntimeHandle({state})")
    }
}
