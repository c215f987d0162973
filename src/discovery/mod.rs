//! Discovery engine: walks framework roots and builds the flat step table.
//!
//! For every root the engine locates and parses the framework descriptor,
//! then runs each declared step through the [`ArtifactLoader`] and the
//! structural [`validate`] check. Failures never short-circuit: a broken
//! descriptor skips its framework once, a broken step skips only itself, and
//! a pass always returns a [`DiscoveryReport`].
//!
//! Two drivers share the same per-framework logic:
//!
//! - [`DiscoveryEngine::discover`]: sequential, roots in the order given;
//!   descriptor parsing and every step load run on a worker thread under
//!   timeouts.
//! - [`DiscoveryEngine::discover_concurrent`]: one tokio task per root;
//!   descriptor parsing and every step load run on the blocking pool under
//!   timeouts, and results are merged in framework-name order.

pub mod report;

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::artifact::Artifact;
use crate::config::RegistryConfig;
use crate::descriptor::{FrameworkDescriptor, StepConfig, StepKey};
use crate::error::RegistryError;
use crate::loader::{ArtifactLoader, ArtifactSource};
use crate::validator::{validate, ShapeKind};

pub use report::{DiscoveryReport, FrameworkCounts, ReportSummary, SkipReason, SkippedStep};

// ============================================================================
// FrameworkRoot
// ============================================================================

/// A directory expected to hold one framework descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FrameworkRoot {
    pub path: PathBuf,
}

impl FrameworkRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Directory name, used to label framework-level skips.
    pub fn label(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

// ============================================================================
// LoadedStep
// ============================================================================

/// A step that loaded and validated. Immutable once built.
#[derive(Debug, Clone)]
pub struct LoadedStep {
    pub framework: String,
    pub name: String,
    pub config: StepConfig,
    pub artifact: Artifact,
    /// Resolved artifact path.
    pub file_path: PathBuf,
    pub loaded_at: DateTime<Utc>,
    /// Non-fatal validation findings.
    pub warnings: Vec<String>,
}

impl LoadedStep {
    pub fn key(&self) -> StepKey {
        StepKey::new(&self.framework, &self.name)
    }

    pub fn shape(&self) -> ShapeKind {
        match self.artifact {
            Artifact::Constructible(_) => ShapeKind::Constructible,
            Artifact::CapabilityObject(_) => ShapeKind::CapabilityObject,
        }
    }
}

impl Serialize for LoadedStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LoadedStep", 8)?;
        state.serialize_field("key", &self.key())?;
        state.serialize_field("framework", &self.framework)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("config", &self.config)?;
        state.serialize_field("shape", &self.shape())?;
        state.serialize_field("file_path", &self.file_path)?;
        state.serialize_field("loaded_at", &self.loaded_at)?;
        state.serialize_field("warnings", &self.warnings)?;
        state.end()
    }
}

// ============================================================================
// FrameworkScan
// ============================================================================

/// Outcome of scanning one root, before it is merged into a report.
#[derive(Debug)]
struct FrameworkScan {
    root: FrameworkRoot,
    /// Framework name, or the root label when the descriptor failed.
    framework: String,
    outcome: RootOutcome,
    /// Descriptor-level warnings.
    notes: Vec<String>,
}

#[derive(Debug)]
enum RootOutcome {
    DescriptorFailed(SkipReason),
    Steps(Vec<(StepKey, Result<LoadedStep, SkipReason>)>),
}

impl FrameworkScan {
    fn failed(root: FrameworkRoot, reason: SkipReason) -> Self {
        Self {
            framework: root.label(),
            root,
            outcome: RootOutcome::DescriptorFailed(reason),
            notes: Vec::new(),
        }
    }

    fn scanned(
        root: FrameworkRoot,
        descriptor: FrameworkDescriptor,
        steps: Vec<(StepKey, Result<LoadedStep, SkipReason>)>,
    ) -> Self {
        let notes = descriptor_notes(&descriptor);
        Self {
            root,
            framework: descriptor.name,
            outcome: RootOutcome::Steps(steps),
            notes,
        }
    }

    fn absorb_into(self, report: &mut DiscoveryReport, seen: &mut Vec<(String, PathBuf)>) {
        for note in self.notes {
            report.warn(note);
        }

        match self.outcome {
            // Keyed by the full root path: two roots may share a directory name.
            RootOutcome::DescriptorFailed(reason) => {
                report.insert_skipped(SkippedStep {
                    key: self.root.path.display().to_string(),
                    framework: self.framework,
                    reason,
                });
            }
            RootOutcome::Steps(steps) => {
                if let Some((_, earlier)) = seen.iter().find(|(name, _)| *name == self.framework) {
                    report.warn(format!(
                        "framework '{}' at {} also declared at {}; later steps replace earlier ones",
                        self.framework,
                        self.root.path.display(),
                        earlier.display()
                    ));
                } else {
                    seen.push((self.framework.clone(), self.root.path.clone()));
                }

                for (key, result) in steps {
                    match result {
                        Ok(step) => report.insert_loaded(step),
                        Err(reason) => report.insert_skipped(SkippedStep {
                            key: key.to_string(),
                            framework: self.framework.clone(),
                            reason,
                        }),
                    }
                }
            }
        }
    }
}

fn descriptor_skip(root: &FrameworkRoot, error: RegistryError) -> SkipReason {
    SkipReason::DescriptorError {
        path: root.path.clone(),
        detail: error.to_string(),
    }
}

fn descriptor_notes(descriptor: &FrameworkDescriptor) -> Vec<String> {
    descriptor
        .steps
        .iter()
        .filter_map(|(step_name, config)| {
            let missing = config.missing_fields();
            (!missing.is_empty()).then(|| {
                format!(
                    "{}: descriptor entry omits {}",
                    descriptor.key_for(step_name),
                    missing.join(", ")
                )
            })
        })
        .collect()
}

// ============================================================================
// Guarded execution
// ============================================================================

/// Why a guarded job produced no value.
#[derive(Debug)]
enum Interrupted {
    TimedOut,
    Lost(String),
}

/// Run `job` on its own thread and wait at most `timeout` for the result.
///
/// A job that misses the deadline is abandoned, not cancelled; its result is
/// dropped when it eventually finishes.
fn run_with_timeout<T, F>(timeout: Duration, job: F) -> Result<T, Interrupted>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("stepdeck-load".to_string())
        .spawn(move || {
            // The receiver is gone once the caller gave up.
            let _ = tx.send(job());
        })
        .map_err(|e| Interrupted::Lost(format!("could not start load thread: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => Err(Interrupted::TimedOut),
        Err(RecvTimeoutError::Disconnected) => Err(Interrupted::Lost(
            "load thread exited without a result".to_string(),
        )),
    }
}

// ============================================================================
// DiscoveryEngine
// ============================================================================

/// Owns the loader and validator; produces [`DiscoveryReport`]s.
#[derive(Debug, Clone)]
pub struct DiscoveryEngine {
    loader: ArtifactLoader,
    descriptor_files: Vec<String>,
    load_timeout: Duration,
    descriptor_timeout: Duration,
}

impl DiscoveryEngine {
    pub fn new(source: Arc<dyn ArtifactSource>, config: &RegistryConfig) -> Self {
        Self {
            loader: ArtifactLoader::new(source).with_steps_subdir(config.steps_subdir.clone()),
            descriptor_files: config.descriptor_files.clone(),
            load_timeout: config.load_timeout(),
            descriptor_timeout: config.descriptor_timeout(),
        }
    }

    pub fn loader(&self) -> &ArtifactLoader {
        &self.loader
    }

    /// Scan `roots` one after another.
    ///
    /// Descriptor parsing and each step load run on a worker thread under the
    /// configured timeouts, so a stalled source costs at most one timeout.
    pub fn discover(&self, roots: &[FrameworkRoot]) -> DiscoveryReport {
        let scans = roots.iter().map(|root| self.scan_root(root)).collect();
        merge(scans)
    }

    /// Scan `roots` concurrently, one task per root.
    ///
    /// Steps within a framework still load in declaration order. The merged
    /// report is ordered by framework name (root order breaks ties), so two
    /// runs over unchanged roots produce the same report.
    pub async fn discover_concurrent(&self, roots: &[FrameworkRoot]) -> DiscoveryReport {
        let handles: Vec<_> = roots
            .iter()
            .cloned()
            .map(|root| {
                let engine = self.clone();
                tokio::spawn(async move { engine.scan_root_async(root).await })
            })
            .collect();

        let results = futures::future::join_all(handles).await;

        let mut scans = Vec::with_capacity(results.len());
        for (root, result) in roots.iter().zip(results) {
            match result {
                Ok(scan) => scans.push(scan),
                Err(e) => {
                    log::error!("Discovery task for {} failed: {}", root.path.display(), e);
                    scans.push(FrameworkScan::failed(
                        root.clone(),
                        SkipReason::DescriptorError {
                            path: root.path.clone(),
                            detail: format!("discovery task failed: {e}"),
                        },
                    ));
                }
            }
        }

        scans.sort_by(|a, b| a.framework.cmp(&b.framework));
        merge(scans)
    }

    fn scan_root(&self, root: &FrameworkRoot) -> FrameworkScan {
        let path = root.path.clone();
        let candidates = self.descriptor_files.clone();
        let parsed = run_with_timeout(self.descriptor_timeout, move || {
            FrameworkDescriptor::load(&path, &candidates)
        });

        let descriptor = match parsed {
            Ok(Ok(descriptor)) => descriptor,
            Ok(Err(e)) => return FrameworkScan::failed(root.clone(), descriptor_skip(root, e)),
            Err(Interrupted::TimedOut) => {
                return FrameworkScan::failed(root.clone(), self.descriptor_timed_out(root))
            }
            Err(Interrupted::Lost(detail)) => {
                let reason = SkipReason::DescriptorError {
                    path: root.path.clone(),
                    detail,
                };
                return FrameworkScan::failed(root.clone(), reason);
            }
        };
        log::debug!(
            "Scanning framework '{}' ({} step(s)) at {}",
            descriptor.name,
            descriptor.steps.len(),
            root.path.display()
        );

        let steps = descriptor
            .steps
            .iter()
            .map(|(step_name, config)| {
                let key = descriptor.key_for(step_name);
                let result =
                    self.load_step_guarded(&descriptor.name, step_name, config, &descriptor.file_root);
                (key, result)
            })
            .collect();

        FrameworkScan::scanned(root.clone(), descriptor, steps)
    }

    async fn scan_root_async(self, root: FrameworkRoot) -> FrameworkScan {
        let path = root.path.clone();
        let candidates = self.descriptor_files.clone();
        let parse = tokio::task::spawn_blocking(move || FrameworkDescriptor::load(&path, &candidates));

        let descriptor = match tokio::time::timeout(self.descriptor_timeout, parse).await {
            Ok(Ok(Ok(descriptor))) => descriptor,
            Ok(Ok(Err(e))) => return FrameworkScan::failed(root.clone(), descriptor_skip(&root, e)),
            Ok(Err(e)) => {
                let reason = SkipReason::DescriptorError {
                    path: root.path.clone(),
                    detail: format!("descriptor task failed: {e}"),
                };
                return FrameworkScan::failed(root, reason);
            }
            Err(_) => {
                let reason = self.descriptor_timed_out(&root);
                return FrameworkScan::failed(root, reason);
            }
        };

        let mut steps = Vec::with_capacity(descriptor.steps.len());
        for (step_name, config) in &descriptor.steps {
            let key = descriptor.key_for(step_name);
            let result = self
                .load_step_blocking(&descriptor.name, step_name, config, &descriptor.file_root)
                .await;
            steps.push((key, result));
        }

        FrameworkScan::scanned(root, descriptor, steps)
    }

    /// [`Self::load_step`] on a worker thread under the load timeout.
    fn load_step_guarded(
        &self,
        framework: &str,
        step_name: &str,
        config: &StepConfig,
        file_root: &Path,
    ) -> Result<LoadedStep, SkipReason> {
        let engine = self.clone();
        let key = StepKey::new(framework, step_name);
        let (framework, step_name) = (framework.to_string(), step_name.to_string());
        let (config, file_root) = (config.clone(), file_root.to_path_buf());
        let fallback_path = self.step_path(&config, &file_root);

        let outcome = run_with_timeout(self.load_timeout, move || {
            engine.load_step(&framework, &step_name, &config, &file_root)
        });

        match outcome {
            Ok(result) => result,
            Err(Interrupted::TimedOut) => Err(self.step_timed_out(&key)),
            Err(Interrupted::Lost(detail)) => Err(SkipReason::LoadError {
                path: fallback_path,
                detail,
            }),
        }
    }

    /// [`Self::load_step`] on the blocking pool under the load timeout.
    async fn load_step_blocking(
        &self,
        framework: &str,
        step_name: &str,
        config: &StepConfig,
        file_root: &Path,
    ) -> Result<LoadedStep, SkipReason> {
        let engine = self.clone();
        let key = StepKey::new(framework, step_name);
        let (framework, step_name) = (framework.to_string(), step_name.to_string());
        let (config, file_root) = (config.clone(), file_root.to_path_buf());
        let fallback_path = self.step_path(&config, &file_root);

        let job = tokio::task::spawn_blocking(move || {
            engine.load_step(&framework, &step_name, &config, &file_root)
        });

        match tokio::time::timeout(self.load_timeout, job).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(SkipReason::LoadError {
                path: fallback_path,
                detail: format!("load task failed: {e}"),
            }),
            Err(_) => Err(self.step_timed_out(&key)),
        }
    }

    /// Loader → validator for one step.
    fn load_step(
        &self,
        framework: &str,
        step_name: &str,
        config: &StepConfig,
        file_root: &Path,
    ) -> Result<LoadedStep, SkipReason> {
        let key = StepKey::new(framework, step_name);
        let loaded = self.loader.load(&key, config, file_root)?;

        let validation = validate(Some(&loaded.artifact), &loaded.path);
        if !validation.is_valid {
            return Err(SkipReason::InvalidShape {
                path: loaded.path,
                errors: validation.errors,
            });
        }

        log::debug!("Loaded step '{}' ({})", key, validation.shape);
        Ok(LoadedStep {
            framework: framework.to_string(),
            name: step_name.to_string(),
            config: config.clone(),
            artifact: loaded.artifact,
            file_path: loaded.path,
            loaded_at: Utc::now(),
            warnings: validation.warnings,
        })
    }

    fn step_path(&self, config: &StepConfig, file_root: &Path) -> PathBuf {
        match config.file.as_deref() {
            Some(file) => self.loader.resolve(file, file_root),
            None => file_root.to_path_buf(),
        }
    }

    fn step_timed_out(&self, key: &StepKey) -> SkipReason {
        log::warn!("Step '{}' did not load within {:?}", key, self.load_timeout);
        SkipReason::TimedOut {
            after_ms: millis(self.load_timeout),
        }
    }

    fn descriptor_timed_out(&self, root: &FrameworkRoot) -> SkipReason {
        log::warn!(
            "Descriptor at {} did not parse within {:?}",
            root.path.display(),
            self.descriptor_timeout
        );
        SkipReason::TimedOut {
            after_ms: millis(self.descriptor_timeout),
        }
    }
}

fn merge(scans: Vec<FrameworkScan>) -> DiscoveryReport {
    let mut report = DiscoveryReport::new();
    let mut seen = Vec::new();
    for scan in scans {
        scan.absorb_into(&mut report, &mut seen);
    }
    log::info!(
        "Discovery finished: {} loaded, {} skipped",
        report.loaded_count(),
        report.skipped_count()
    );
    report
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::CapabilityObject;
    use crate::loader::{LoadRequest, PluginTable};
    use serde_json::{json, Value};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_framework(root: &Path, descriptor: &str, files: &[&str]) {
        fs::create_dir_all(root.join("steps")).unwrap();
        fs::write(root.join("framework.yaml"), descriptor).unwrap();
        for file in files {
            let path = root.join("steps").join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, "").unwrap();
        }
    }

    fn ok_fn() -> Artifact {
        Artifact::from_fn(|_, _| Ok(Value::Null))
    }

    fn engine(table: PluginTable) -> DiscoveryEngine {
        DiscoveryEngine::new(Arc::new(table), &RegistryConfig::default())
    }

    const ALPHA: &str = r#"
name: alpha
version: "1.0.0"
steps:
  lint:
    type: check
    file: steps/lint.step
  run:
    type: action
    file: run.step
  broken:
    type: action
    file: broken.step
  build:
    type: action
  deploy:
    type: action
    file: steps/deploy.ext
"#;

    fn alpha_table() -> PluginTable {
        let mut table = PluginTable::new();
        table
            .link_artifact("alpha.lint", ok_fn())
            .link_artifact("alpha.run", ok_fn())
            .link_artifact(
                "alpha.broken",
                Artifact::CapabilityObject(CapabilityObject::new().with_config(json!({}))),
            );
        table
    }

    #[test]
    fn test_discover_classifies_every_step() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("alpha");
        write_framework(&root, ALPHA, &["lint.step", "run.step", "broken.step"]);

        let report = engine(alpha_table()).discover(&[FrameworkRoot::new(&root)]);

        let keys: Vec<&str> = report.keys().map(StepKey::as_str).collect();
        assert_eq!(keys, vec!["alpha.lint", "alpha.run"]);

        assert_eq!(report.skip_for("alpha.build").unwrap().reason, SkipReason::MissingConfig);
        assert!(matches!(
            &report.skip_for("alpha.deploy").unwrap().reason,
            SkipReason::FileNotFound { path } if path.ends_with("steps/deploy.ext") && path.is_absolute()
        ));
        assert!(matches!(
            &report.skip_for("alpha.broken").unwrap().reason,
            SkipReason::InvalidShape { errors, .. } if errors.len() == 1
        ));
    }

    #[test]
    fn test_one_shape_defect_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("alpha");
        let mut descriptor = String::from("name: alpha\nsteps:\n");
        let mut files = Vec::new();
        let mut table = PluginTable::new();
        for i in 0..5 {
            descriptor.push_str(&format!("  s{i}:\n    file: s{i}.step\n"));
            files.push(format!("s{i}.step"));
            let artifact = if i == 2 {
                Artifact::CapabilityObject(CapabilityObject::new())
            } else {
                ok_fn()
            };
            table.link_artifact(format!("alpha.s{i}"), artifact);
        }
        let file_refs: Vec<&str> = files.iter().map(String::as_str).collect();
        write_framework(&root, &descriptor, &file_refs);

        let report = engine(table).discover(&[FrameworkRoot::new(&root)]);
        assert_eq!(report.loaded_count(), 4);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.skip_for("alpha.s2").unwrap().reason.code(), "invalid-shape");
    }

    #[test]
    fn test_missing_file_never_reaches_source() {
        struct Counting(AtomicUsize);
        impl ArtifactSource for Counting {
            fn load(&self, _request: &LoadRequest<'_>) -> anyhow::Result<Artifact> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(ok_fn())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("alpha");
        write_framework(&root, "name: alpha\nsteps:\n  build:\n    type: action\n", &[]);

        let source = Arc::new(Counting(AtomicUsize::new(0)));
        let engine = DiscoveryEngine::new(source.clone(), &RegistryConfig::default());
        let report = engine.discover(&[FrameworkRoot::new(&root)]);

        assert_eq!(report.skip_for("alpha.build").unwrap().reason, SkipReason::MissingConfig);
        assert_eq!(source.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_same_step_name_in_two_frameworks() {
        let dir = tempfile::tempdir().unwrap();
        let alpha = dir.path().join("alpha");
        let beta = dir.path().join("beta");
        write_framework(&alpha, "name: alpha\nsteps:\n  run:\n    file: run.step\n", &["run.step"]);
        write_framework(&beta, "name: beta\nsteps:\n  run:\n    file: run.step\n", &["run.step"]);

        let mut table = PluginTable::new();
        table
            .link_artifact("alpha.run", ok_fn())
            .link_artifact("beta.run", ok_fn());

        let report = engine(table).discover(&[FrameworkRoot::new(&alpha), FrameworkRoot::new(&beta)]);
        assert!(report.get("alpha.run").is_some());
        assert!(report.get("beta.run").is_some());
        assert_eq!(report.loaded_count(), 2);
    }

    #[test]
    fn test_discovery_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("alpha");
        write_framework(&root, ALPHA, &["lint.step", "run.step", "broken.step"]);

        let engine = engine(alpha_table());
        let roots = [FrameworkRoot::new(&root)];
        let first = engine.discover(&roots);
        let second = engine.discover(&roots);

        let snapshot = |r: &DiscoveryReport| -> Vec<(StepKey, StepConfig)> {
            r.loaded().map(|s| (s.key(), s.config.clone())).collect()
        };
        assert_eq!(snapshot(&first), snapshot(&second));
        assert_eq!(
            first.skipped().cloned().collect::<Vec<_>>(),
            second.skipped().cloned().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_bad_descriptor_skips_framework_once() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken");
        let beta = dir.path().join("beta");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("framework.yaml"), "name: [unclosed").unwrap();
        write_framework(&beta, "name: beta\nsteps:\n  run:\n    file: run.step\n", &["run.step"]);

        let mut table = PluginTable::new();
        table.link_artifact("beta.run", ok_fn());

        let report = engine(table).discover(&[FrameworkRoot::new(&broken), FrameworkRoot::new(&beta)]);
        assert_eq!(report.skipped_count(), 1);
        let entry = report.skip_for(&broken.display().to_string()).unwrap();
        assert_eq!(entry.reason.code(), "descriptor-error");
        assert!(report.get("beta.run").is_some());
    }

    #[test]
    fn test_missing_descriptor_is_descriptor_error() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        let report = engine(PluginTable::new()).discover(&[FrameworkRoot::new(&empty)]);
        let entry = report.skip_for(&empty.display().to_string()).unwrap();
        assert_eq!(entry.reason.code(), "descriptor-error");
        assert_eq!(entry.framework, "empty");
    }

    #[test]
    fn test_broken_roots_sharing_a_directory_name_are_both_reported() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("x").join("alpha");
        let second = dir.path().join("y").join("alpha");
        for root in [&first, &second] {
            fs::create_dir_all(root).unwrap();
            fs::write(root.join("framework.yaml"), "name: [unclosed").unwrap();
        }

        let report = engine(PluginTable::new())
            .discover(&[FrameworkRoot::new(&first), FrameworkRoot::new(&second)]);
        assert_eq!(report.skipped_count(), 2);
        assert!(report.skip_for(&first.display().to_string()).is_some());
        assert!(report.skip_for(&second.display().to_string()).is_some());
        assert_eq!(report.summary().frameworks["alpha"].skipped, 2);
    }

    #[test]
    fn test_sequential_load_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("alpha");
        write_framework(
            &root,
            "name: alpha\nsteps:\n  slow:\n    file: slow.step\n  fast:\n    file: fast.step\n",
            &["slow.step", "fast.step"],
        );

        let mut table = PluginTable::new();
        table
            .link("alpha.slow", |_| {
                std::thread::sleep(Duration::from_millis(1_500));
                Ok(Artifact::from_fn(|_, _| Ok(Value::Null)))
            })
            .link_artifact("alpha.fast", ok_fn());

        let config = RegistryConfig {
            load_timeout_ms: 50,
            ..RegistryConfig::default()
        };
        let engine = DiscoveryEngine::new(Arc::new(table), &config);

        let started = std::time::Instant::now();
        let report = engine.discover(&[FrameworkRoot::new(&root)]);
        assert!(started.elapsed() < Duration::from_millis(1_000));

        assert_eq!(
            report.skip_for("alpha.slow").unwrap().reason,
            SkipReason::TimedOut { after_ms: 50 }
        );
        assert!(report.get("alpha.slow").is_none());
        assert!(report.get("alpha.fast").is_some());
    }

    #[test]
    fn test_entries_missing_descriptive_fields_are_warned() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("alpha");
        write_framework(
            &root,
            r#"
name: alpha
steps:
  run:
    name: Run
    type: action
    category: ops
    description: Run it
    file: run.step
  bare:
    file: bare.step
"#,
            &["run.step", "bare.step"],
        );

        let mut table = PluginTable::new();
        table
            .link_artifact("alpha.run", ok_fn())
            .link_artifact("alpha.bare", ok_fn());

        let report = engine(table).discover(&[FrameworkRoot::new(&root)]);
        assert!(report.get("alpha.bare").is_some());
        assert!(report
            .warnings()
            .contains(&"alpha.bare: descriptor entry omits name, type, category, description".to_string()));
        assert!(!report.warnings().iter().any(|w| w.starts_with("alpha.run: descriptor")));
    }

    #[test]
    fn test_duplicate_framework_name_last_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a");
        let second = dir.path().join("b");
        write_framework(&first, "name: alpha\nsteps:\n  run:\n    file: run.step\n", &["run.step"]);
        write_framework(
            &second,
            "name: alpha\nsteps:\n  run:\n    type: updated\n    file: run.step\n",
            &["run.step"],
        );

        let mut table = PluginTable::new();
        table.link_artifact("alpha.run", ok_fn());

        let report = engine(table).discover(&[FrameworkRoot::new(&first), FrameworkRoot::new(&second)]);
        assert_eq!(report.loaded_count(), 1);
        assert_eq!(report.get("alpha.run").unwrap().config.step_type, "updated");
        assert!(report.warnings().iter().any(|w| w.contains("framework 'alpha'")));
    }

    #[test]
    fn test_missing_config_warning_is_kept_on_step() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("alpha");
        write_framework(&root, "name: alpha\nsteps:\n  run:\n    file: run.step\n", &["run.step"]);

        let mut table = PluginTable::new();
        table.link_artifact("alpha.run", ok_fn());

        let report = engine(table).discover(&[FrameworkRoot::new(&root)]);
        let step = report.get("alpha.run").unwrap();
        assert_eq!(step.warnings, vec![crate::validator::WARN_NO_CONFIG.to_string()]);
        assert_eq!(step.shape(), ShapeKind::CapabilityObject);
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let alpha = dir.path().join("alpha");
        let beta = dir.path().join("beta");
        write_framework(&alpha, ALPHA, &["lint.step", "run.step", "broken.step"]);
        write_framework(&beta, "name: beta\nsteps:\n  run:\n    file: run.step\n", &["run.step"]);

        let mut table = alpha_table();
        table.link_artifact("beta.run", ok_fn());
        let engine = engine(table);

        // Deliberately unsorted; the merge orders by framework name.
        let roots = [FrameworkRoot::new(&beta), FrameworkRoot::new(&alpha)];
        let concurrent = engine.discover_concurrent(&roots).await;
        let sequential = engine.discover(&[FrameworkRoot::new(&alpha), FrameworkRoot::new(&beta)]);

        let keys = |r: &DiscoveryReport| r.keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys(&concurrent), keys(&sequential));
        assert_eq!(
            concurrent.skipped().cloned().collect::<Vec<_>>(),
            sequential.skipped().cloned().collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_concurrent_load_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("alpha");
        write_framework(
            &root,
            "name: alpha\nsteps:\n  slow:\n    file: slow.step\n  fast:\n    file: fast.step\n",
            &["slow.step", "fast.step"],
        );

        let mut table = PluginTable::new();
        table
            .link("alpha.slow", |_| {
                std::thread::sleep(Duration::from_millis(500));
                Ok(Artifact::from_fn(|_, _| Ok(Value::Null)))
            })
            .link_artifact("alpha.fast", ok_fn());

        let config = RegistryConfig {
            load_timeout_ms: 50,
            ..RegistryConfig::default()
        };
        let engine = DiscoveryEngine::new(Arc::new(table), &config);
        let report = engine.discover_concurrent(&[FrameworkRoot::new(&root)]).await;

        assert_eq!(
            report.skip_for("alpha.slow").unwrap().reason,
            SkipReason::TimedOut { after_ms: 50 }
        );
        assert!(report.get("alpha.fast").is_some());
    }
}
