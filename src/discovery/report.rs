//! Discovery report: what loaded, what was skipped and why.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Serialize;

use super::LoadedStep;
use crate::descriptor::StepKey;
use crate::loader::LoadFailure;

// ============================================================================
// SkipReason
// ============================================================================

/// Why a step (or a whole framework) did not make it into the step table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum SkipReason {
    /// The framework descriptor could not be located or parsed.
    DescriptorError { path: PathBuf, detail: String },
    /// The step declares no `file`.
    MissingConfig,
    /// The declared file does not exist.
    FileNotFound { path: PathBuf },
    /// The file exists but nothing is linked for it.
    NotLinked { path: PathBuf },
    /// The file exists but loading it failed.
    LoadError { path: PathBuf, detail: String },
    /// The artifact loaded but does not satisfy the invoke contract.
    InvalidShape { path: PathBuf, errors: Vec<String> },
    /// Loading did not finish within the configured timeout.
    TimedOut { after_ms: u64 },
}

impl SkipReason {
    /// Stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DescriptorError { .. } => "descriptor-error",
            Self::MissingConfig => "missing-config",
            Self::FileNotFound { .. } => "file-not-found",
            Self::NotLinked { .. } => "not-linked",
            Self::LoadError { .. } => "load-error",
            Self::InvalidShape { .. } => "invalid-shape",
            Self::TimedOut { .. } => "timed-out",
        }
    }
}

impl From<LoadFailure> for SkipReason {
    fn from(failure: LoadFailure) -> Self {
        match failure {
            LoadFailure::MissingConfig => Self::MissingConfig,
            LoadFailure::FileNotFound { path } => Self::FileNotFound { path },
            LoadFailure::NotLinked { path } => Self::NotLinked { path },
            LoadFailure::LoadError { path, detail } => Self::LoadError { path, detail },
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        match self {
            Self::DescriptorError { path, detail } => {
                write!(f, "{code}: {detail} ({})", path.display())
            }
            Self::MissingConfig => write!(f, "{code}: step declares no file"),
            Self::FileNotFound { path } => write!(f, "{code}: {}", path.display()),
            Self::NotLinked { path } => {
                write!(f, "{code}: file present, no linked artifact ({})", path.display())
            }
            Self::LoadError { path, detail } => write!(f, "{code}: {detail} ({})", path.display()),
            Self::InvalidShape { path, errors } => {
                write!(f, "{code}: {} ({})", errors.join("; "), path.display())
            }
            Self::TimedOut { after_ms } => write!(f, "{code}: gave up after {after_ms}ms"),
        }
    }
}

/// One skipped entry.
///
/// Framework-level skips (descriptor errors) are keyed by the full root
/// path, since no framework name could be read; `framework` then holds the
/// root's directory name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedStep {
    pub key: String,
    pub framework: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

// ============================================================================
// DiscoveryReport
// ============================================================================

/// Result of one discovery pass. Keys are unique across `loaded` and
/// `skipped` together; a later entry for the same key replaces the earlier
/// one.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    loaded: IndexMap<StepKey, LoadedStep>,
    skipped: IndexMap<String, SkippedStep>,
    /// Non-fatal observations (validation warnings, duplicate frameworks).
    warnings: Vec<String>,
}

impl DiscoveryReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loaded steps in discovery order.
    pub fn loaded(&self) -> impl Iterator<Item = &LoadedStep> {
        self.loaded.values()
    }

    /// Skipped entries in discovery order.
    pub fn skipped(&self) -> impl Iterator<Item = &SkippedStep> {
        self.skipped.values()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Loaded keys in discovery order.
    pub fn keys(&self) -> impl Iterator<Item = &StepKey> {
        self.loaded.keys()
    }

    pub fn get(&self, key: &str) -> Option<&LoadedStep> {
        self.loaded.get(key)
    }

    pub fn skip_for(&self, key: &str) -> Option<&SkippedStep> {
        self.skipped.get(key)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub(crate) fn insert_loaded(&mut self, step: LoadedStep) {
        let key = step.key();
        for warning in &step.warnings {
            log::warn!("Step '{}': {}", key, warning);
            self.warnings.push(format!("{key}: {warning}"));
        }
        self.skipped.shift_remove(key.as_str());
        if self.loaded.insert(key.clone(), step).is_some() {
            log::warn!("Step '{}' was discovered twice; keeping the later one", key);
        }
    }

    pub(crate) fn insert_skipped(&mut self, entry: SkippedStep) {
        log::warn!("Skipping '{}': {}", entry.key, entry.reason);
        self.loaded.shift_remove(entry.key.as_str());
        self.skipped.insert(entry.key.clone(), entry);
    }

    pub(crate) fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    /// Per-framework and per-reason counts.
    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            loaded: self.loaded.len(),
            skipped: self.skipped.len(),
            warnings: self.warnings.len(),
            ..ReportSummary::default()
        };

        for step in self.loaded.values() {
            summary
                .frameworks
                .entry(step.framework.clone())
                .or_default()
                .loaded += 1;
        }
        for entry in self.skipped.values() {
            summary
                .frameworks
                .entry(entry.framework.clone())
                .or_default()
                .skipped += 1;
            *summary.reasons.entry(entry.reason.code()).or_default() += 1;
        }
        summary
    }
}

impl fmt::Display for DiscoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())?;
        if !self.skipped.is_empty() {
            writeln!(f, "Skipped:")?;
            for entry in self.skipped.values() {
                writeln!(f, "  {}: {}", entry.key, entry.reason)?;
            }
        }
        if !self.warnings.is_empty() {
            writeln!(f, "Warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  {warning}")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// ReportSummary
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameworkCounts {
    pub loaded: usize,
    pub skipped: usize,
}

/// Aggregate counts over a [`DiscoveryReport`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub loaded: usize,
    pub skipped: usize,
    pub warnings: usize,
    pub frameworks: BTreeMap<String, FrameworkCounts>,
    pub reasons: BTreeMap<&'static str, usize>,
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Discovered {} step(s) across {} framework(s), {} skipped",
            self.loaded,
            self.frameworks.len(),
            self.skipped
        )?;
        for (name, counts) in &self.frameworks {
            writeln!(f, "  {name}: {} loaded, {} skipped", counts.loaded, counts.skipped)?;
        }
        if !self.reasons.is_empty() {
            writeln!(f, "Skipped by reason:")?;
            for (code, count) in &self.reasons {
                writeln!(f, "  {code}: {count}")?;
            }
        }
        Ok(())
    }
}
