//! Call contexts handed to step bodies.

use serde_json::{Map, Value};

use crate::descriptor::StepKey;
use crate::runtime::RuntimeHandle;

/// Key under which the owning framework's name is injected.
pub const FRAMEWORK_KEY: &str = "framework";
/// Key under which the step name is injected.
pub const STEP_NAME_KEY: &str = "stepName";
/// Key reserved for the runtime back-reference.
pub const RUNTIME_KEY: &str = "runtime";

/// Keys the shim owns. Caller-supplied values for them are discarded.
pub const RESERVED_KEYS: [&str; 3] = [FRAMEWORK_KEY, STEP_NAME_KEY, RUNTIME_KEY];

/// Open key/value context supplied by the orchestrator for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallContext {
    values: Map<String, Value>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> Map<String, Value> {
        self.values
    }
}

impl From<Map<String, Value>> for CallContext {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

/// The merged context a step body receives.
///
/// Identity fields are set by the shim after the caller's values are copied
/// in, so a caller can never replace them.
#[derive(Debug, Clone)]
pub struct StepContext {
    key: StepKey,
    framework: String,
    step_name: String,
    runtime: RuntimeHandle,
    values: Map<String, Value>,
}

impl StepContext {
    /// Merge a caller context with injected identity.
    pub(crate) fn bind(
        key: &StepKey,
        framework: &str,
        step_name: &str,
        runtime: RuntimeHandle,
        caller: CallContext,
    ) -> Self {
        let mut values = caller.into_values();

        for reserved in RESERVED_KEYS {
            if let Some(spoofed) = values.remove(reserved) {
                log::warn!(
                    "Caller context for '{}' tried to set reserved key '{}' ({}); ignoring",
                    key,
                    reserved,
                    spoofed
                );
            }
        }
        values.insert(FRAMEWORK_KEY.to_string(), Value::String(framework.to_string()));
        values.insert(STEP_NAME_KEY.to_string(), Value::String(step_name.to_string()));

        Self {
            key: key.clone(),
            framework: framework.to_string(),
            step_name: step_name.to_string(),
            runtime,
            values,
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

    /// Handle for calling other registered steps.
    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value for `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }
}
