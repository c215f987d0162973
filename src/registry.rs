//! Step registry facade.
//!
//! Ties the pieces together: expands configured roots, runs discovery,
//! replaces the flat step table with the new pass's result and publishes
//! every loaded step into the step runtime, if one is attached.
//!
//! The runtime has no removal operation. A key that loaded on an earlier
//! pass but not on this one stays resolvable there; the refresh reports such
//! keys as stale and logs them.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::RegistryConfig;
use crate::descriptor::StepKey;
use crate::discovery::{DiscoveryEngine, DiscoveryReport, FrameworkRoot, LoadedStep};
use crate::loader::ArtifactSource;
use crate::registration::{register, Registration};
use crate::runtime::StepRuntime;

/// Result of one registry refresh.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub report: DiscoveryReport,
    /// One entry per loaded step, in report order.
    pub registrations: Vec<Registration>,
    /// Keys held before this refresh, missing from it, still resolvable in
    /// the runtime.
    pub stale: Vec<StepKey>,
}

impl ScanOutcome {
    /// Loaded steps that were not published into a runtime.
    pub fn unregistered(&self) -> Vec<&StepKey> {
        self.registrations
            .iter()
            .filter(|r| !r.is_published())
            .map(Registration::key)
            .collect()
    }

    pub fn published_count(&self) -> usize {
        self.registrations.iter().filter(|r| r.is_published()).count()
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.report)?;
        writeln!(
            f,
            "Registered {}/{} loaded step(s)",
            self.published_count(),
            self.registrations.len()
        )?;
        for registration in &self.registrations {
            if let Registration::Skipped { key, reason } = registration {
                writeln!(f, "  {key}: not registered ({reason})")?;
            }
        }
        if !self.stale.is_empty() {
            writeln!(f, "Still published from an earlier scan:")?;
            for key in &self.stale {
                writeln!(f, "  {key}")?;
            }
        }
        Ok(())
    }
}

/// Owns discovery, the flat step table and the runtime handle.
pub struct StepRegistry {
    config: RegistryConfig,
    engine: DiscoveryEngine,
    runtime: Option<Arc<dyn StepRuntime>>,
    steps: IndexMap<StepKey, LoadedStep>,
}

impl StepRegistry {
    pub fn new(config: RegistryConfig, source: Arc<dyn ArtifactSource>) -> Self {
        let engine = DiscoveryEngine::new(source, &config);
        Self {
            config,
            engine,
            runtime: None,
            steps: IndexMap::new(),
        }
    }

    /// Attach the runtime steps are published into.
    pub fn with_runtime(mut self, runtime: Arc<dyn StepRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn set_runtime(&mut self, runtime: Option<Arc<dyn StepRuntime>>) {
        self.runtime = runtime;
    }

    pub fn runtime(&self) -> Option<&Arc<dyn StepRuntime>> {
        self.runtime.as_ref()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Discover the configured roots sequentially and publish the result.
    pub fn refresh(&mut self) -> ScanOutcome {
        let roots = self.config.framework_roots();
        self.refresh_roots(&roots)
    }

    /// Discover explicit roots sequentially and publish the result.
    pub fn refresh_roots(&mut self, roots: &[FrameworkRoot]) -> ScanOutcome {
        let report = self.engine.discover(roots);
        self.publish(report)
    }

    /// Discover the configured roots concurrently and publish the result.
    pub async fn refresh_concurrent(&mut self) -> ScanOutcome {
        let roots = self.config.framework_roots();
        let report = self.engine.discover_concurrent(&roots).await;
        self.publish(report)
    }

    fn publish(&mut self, report: DiscoveryReport) -> ScanOutcome {
        let registrations: Vec<Registration> = report
            .loaded()
            .map(|step| register(step, self.runtime.as_ref()))
            .collect();

        let stale = self.stale_keys(&report);
        if !stale.is_empty() {
            let keys: Vec<&str> = stale.iter().map(StepKey::as_str).collect();
            log::warn!(
                "{} step(s) no longer discovered but still registered in the runtime: {}",
                stale.len(),
                keys.join(", ")
            );
        }

        self.steps = report.loaded().map(|step| (step.key(), step.clone())).collect();

        let outcome = ScanOutcome {
            report,
            registrations,
            stale,
        };
        log::info!(
            "Registry refreshed: {} step(s) loaded, {} published",
            self.steps.len(),
            outcome.published_count()
        );
        outcome
    }

    fn stale_keys(&self, report: &DiscoveryReport) -> Vec<StepKey> {
        let Some(runtime) = self.runtime.as_ref() else {
            return Vec::new();
        };
        self.steps
            .keys()
            .filter(|key| report.get(key.as_str()).is_none())
            .filter(|key| runtime.resolve(key.as_str()).is_some())
            .cloned()
            .collect()
    }

    /// Loaded steps from the last refresh, in discovery order.
    pub fn loaded_steps(&self) -> impl Iterator<Item = &LoadedStep> {
        self.steps.values()
    }

    pub fn get(&self, key: &str) -> Option<&LoadedStep> {
        self.steps.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.steps.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("config", &self.config)
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("has_runtime", &self.runtime.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Artifact, CallContext};
    use crate::loader::PluginTable;
    use crate::registration::RegistrationSkip;
    use crate::runtime::InMemoryStepRuntime;
    use serde_json::{json, Value};
    use std::fs;
    use std::path::Path;

    fn write_framework(root: &Path, descriptor: &str, files: &[&str]) {
        fs::create_dir_all(root.join("steps")).unwrap();
        fs::write(root.join("framework.yaml"), descriptor).unwrap();
        for file in files {
            fs::write(root.join("steps").join(file), "").unwrap();
        }
    }

    fn fixture() -> (tempfile::TempDir, RegistryConfig, PluginTable) {
        let dir = tempfile::tempdir().unwrap();
        write_framework(
            &dir.path().join("alpha"),
            "name: alpha\nsteps:\n  run:\n    file: run.step\n  build:\n    type: action\n",
            &["run.step"],
        );
        write_framework(
            &dir.path().join("beta"),
            "name: beta\nsteps:\n  run:\n    file: run.step\n",
            &["run.step"],
        );

        let mut table = PluginTable::new();
        table
            .link_artifact(
                "alpha.run",
                Artifact::from_fn(|ctx, _| Ok(json!(ctx.framework()))),
            )
            .link_artifact(
                "beta.run",
                Artifact::from_fn(|ctx, _| Ok(json!(ctx.framework()))),
            );

        let config = RegistryConfig {
            scan_dirs: vec![dir.path().to_path_buf()],
            ..RegistryConfig::default()
        };
        (dir, config, table)
    }

    #[test]
    fn test_refresh_publishes_loaded_steps() {
        let (_dir, config, table) = fixture();
        let runtime = InMemoryStepRuntime::shared();
        let mut registry = StepRegistry::new(config, Arc::new(table)).with_runtime(runtime.clone());

        let outcome = registry.refresh();
        assert_eq!(outcome.published_count(), 2);
        assert!(outcome.unregistered().is_empty());
        assert_eq!(outcome.report.skip_for("alpha.build").unwrap().reason.code(), "missing-config");

        assert_eq!(registry.len(), 2);
        let out = runtime.invoke("beta.run", CallContext::new(), &Value::Null).unwrap();
        assert_eq!(out, json!("beta"));
    }

    #[test]
    fn test_refresh_without_runtime_keeps_steps_loaded() {
        let (_dir, config, table) = fixture();
        let mut registry = StepRegistry::new(config, Arc::new(table));

        let outcome = registry.refresh();
        assert!(registry.contains("alpha.run"));
        assert_eq!(outcome.published_count(), 0);
        assert_eq!(outcome.unregistered().len(), 2);
        assert!(outcome.registrations.iter().all(|r| matches!(
            r,
            Registration::Skipped { reason: RegistrationSkip::RuntimeUnavailable, .. }
        )));
        assert!(outcome.to_string().contains("alpha.run: not registered (runtime-unavailable)"));
    }

    #[test]
    fn test_refresh_replaces_table_wholesale() {
        let (dir, config, table) = fixture();
        let mut registry = StepRegistry::new(config, Arc::new(table));
        registry.refresh();
        assert!(registry.contains("beta.run"));

        fs::remove_file(dir.path().join("beta/steps/run.step")).unwrap();
        let outcome = registry.refresh();
        assert!(!registry.contains("beta.run"));
        assert_eq!(outcome.report.skip_for("beta.run").unwrap().reason.code(), "file-not-found");
    }

    #[test]
    fn test_vanished_step_is_reported_stale() {
        let (dir, config, table) = fixture();
        let runtime = InMemoryStepRuntime::shared();
        let mut registry = StepRegistry::new(config, Arc::new(table)).with_runtime(runtime.clone());
        assert!(registry.refresh().stale.is_empty());

        fs::remove_file(dir.path().join("beta/steps/run.step")).unwrap();
        let outcome = registry.refresh();
        assert_eq!(outcome.stale, vec![StepKey::new("beta", "run")]);
        assert!(!registry.contains("beta.run"));
        assert!(runtime.resolve("beta.run").is_some());
        assert!(outcome
            .to_string()
            .contains("Still published from an earlier scan:\n  beta.run"));

        // Reported once: the key has left the table.
        assert!(registry.refresh().stale.is_empty());
    }

    #[test]
    fn test_no_stale_keys_without_runtime() {
        let (dir, config, table) = fixture();
        let mut registry = StepRegistry::new(config, Arc::new(table));
        registry.refresh();

        fs::remove_file(dir.path().join("beta/steps/run.step")).unwrap();
        assert!(registry.refresh().stale.is_empty());
    }

    #[test]
    fn test_invocation_survives_rescan() {
        let (_dir, config, table) = fixture();
        let runtime = InMemoryStepRuntime::shared();
        let mut registry = StepRegistry::new(config, Arc::new(table)).with_runtime(runtime.clone());
        registry.refresh();

        let captured = runtime.resolve("alpha.run").unwrap();
        registry.refresh();
        let out = captured.invoke(CallContext::new(), &Value::Null).unwrap();
        assert_eq!(out, json!("alpha"));
    }

    #[tokio::test]
    async fn test_refresh_concurrent() {
        let (_dir, config, table) = fixture();
        let runtime = InMemoryStepRuntime::shared();
        let mut registry = StepRegistry::new(config, Arc::new(table)).with_runtime(runtime.clone());

        let outcome = registry.refresh_concurrent().await;
        let keys: Vec<&str> = outcome.report.keys().map(StepKey::as_str).collect();
        assert_eq!(keys, vec!["alpha.run", "beta.run"]);
        assert_eq!(outcome.published_count(), 2);
    }
}
