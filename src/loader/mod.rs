//! Artifact loader: turns a step's `file` reference into a loaded artifact.
//!
//! The loader is the isolation boundary of discovery: every failure,
//! including a panic inside an [`ArtifactSource`], comes back as a
//! [`LoadFailure`] value. Nothing raised while loading one step can reach the
//! discovery loop.
//!
//! Resolution order:
//!
//! 1. no `file` declared → [`LoadFailure::MissingConfig`], no filesystem access
//! 2. normalize the reference and join it onto `<root>/<steps_subdir>`
//! 3. resolved path absent → [`LoadFailure::FileNotFound`]
//! 4. ask the source; [`NotLinked`] → [`LoadFailure::NotLinked`], any other
//!    error or a panic → [`LoadFailure::LoadError`]

pub mod plugin_table;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::artifact::Artifact;
use crate::config::DEFAULT_STEPS_SUBDIR;
use crate::descriptor::{StepConfig, StepKey};

pub use plugin_table::{ArtifactFactory, PluginTable};

// ============================================================================
// ArtifactSource
// ============================================================================

/// Everything a source needs to produce one artifact.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    pub key: &'a StepKey,
    pub framework: &'a str,
    pub step_name: &'a str,
    pub config: &'a StepConfig,
    /// Resolved, existing artifact path.
    pub path: &'a Path,
}

/// Produces executable artifacts for resolved step files.
///
/// Implementations may fail freely (or even panic); the loader converts both
/// into a `load-error` skip for that step alone.
pub trait ArtifactSource: Send + Sync {
    fn load(&self, request: &LoadRequest<'_>) -> anyhow::Result<Artifact>;
}

/// Returned by a source that has nothing linked for the requested key.
///
/// The file is present on disk but the host binary carries no artifact for
/// it. The loader reports this as `not-linked` rather than `load-error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no artifact linked for '{0}'")]
pub struct NotLinked(pub String);

// ============================================================================
// LoadFailure
// ============================================================================

/// Why an artifact could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum LoadFailure {
    /// The step declares no `file`.
    MissingConfig,
    /// The resolved path does not exist.
    FileNotFound { path: PathBuf },
    /// The file exists but the source has no artifact linked for it.
    NotLinked { path: PathBuf },
    /// The file exists but loading it failed.
    LoadError { path: PathBuf, detail: String },
}

impl LoadFailure {
    /// Stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingConfig => "missing-config",
            Self::FileNotFound { .. } => "file-not-found",
            Self::NotLinked { .. } => "not-linked",
            Self::LoadError { .. } => "load-error",
        }
    }
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingConfig => write!(f, "missing-config: step declares no file"),
            Self::FileNotFound { path } => write!(f, "file-not-found: {}", path.display()),
            Self::NotLinked { path } => {
                write!(f, "not-linked: file present, no linked artifact ({})", path.display())
            }
            Self::LoadError { path, detail } => {
                write!(f, "load-error: {} ({})", detail, path.display())
            }
        }
    }
}

/// A successfully loaded artifact with the path it came from.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub artifact: Artifact,
    pub path: PathBuf,
}

pub type LoadResult = Result<LoadedArtifact, LoadFailure>;

// ============================================================================
// ArtifactLoader
// ============================================================================

/// Resolves step file references and loads them through an [`ArtifactSource`].
#[derive(Clone)]
pub struct ArtifactLoader {
    source: Arc<dyn ArtifactSource>,
    steps_subdir: String,
}

impl ArtifactLoader {
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            source,
            steps_subdir: DEFAULT_STEPS_SUBDIR.to_string(),
        }
    }

    /// Override the conventional steps sub-root.
    pub fn with_steps_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.steps_subdir = subdir.into();
        self
    }

    pub fn steps_subdir(&self) -> &str {
        &self.steps_subdir
    }

    /// Load the artifact for one step of a framework rooted at `file_root`.
    pub fn load(&self, key: &StepKey, config: &StepConfig, file_root: &Path) -> LoadResult {
        let Some(file) = config.file.as_deref() else {
            log::debug!("Step '{}' declares no file", key);
            return Err(LoadFailure::MissingConfig);
        };

        let path = self.resolve(file, file_root);
        if !path.is_file() {
            log::debug!("Step '{}' file not found at {}", key, path.display());
            return Err(LoadFailure::FileNotFound { path });
        }

        let request = LoadRequest {
            key,
            framework: key.framework(),
            step_name: key.step(),
            config,
            path: &path,
        };

        let source = &self.source;
        match panic::catch_unwind(AssertUnwindSafe(|| source.load(&request))) {
            Ok(Ok(artifact)) => {
                log::debug!("Loaded '{}' from {}", key, path.display());
                Ok(LoadedArtifact { artifact, path })
            }
            Ok(Err(e)) if e.is::<NotLinked>() => {
                log::debug!("No artifact linked for '{}' ({})", key, path.display());
                Err(LoadFailure::NotLinked { path })
            }
            Ok(Err(e)) => Err(LoadFailure::LoadError {
                detail: format!("{e:#}"),
                path,
            }),
            Err(payload) => {
                let detail = panic_message(&*payload);
                log::error!("Loading '{}' panicked: {}", key, detail);
                Err(LoadFailure::LoadError {
                    detail: format!("panicked while loading: {detail}"),
                    path,
                })
            }
        }
    }

    /// Resolve a declared file reference to an absolute path under
    /// `<file_root>/<steps_subdir>`.
    ///
    /// A leading `./` and a leading segment equal to the steps sub-root are
    /// dropped, so `steps/deploy.step` and `deploy.step` resolve identically.
    pub fn resolve(&self, file: &str, file_root: &Path) -> PathBuf {
        let mut components = Path::new(file)
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .peekable();

        if let Some(Component::Normal(first)) = components.peek() {
            if first.to_str() == Some(self.steps_subdir.as_str()) {
                components.next();
            }
        }

        let relative: PathBuf = components.collect();
        let resolved = file_root.join(&self.steps_subdir).join(relative);
        absolutize(&resolved)
    }
}

impl fmt::Debug for ArtifactLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactLoader")
            .field("steps_subdir", &self.steps_subdir)
            .finish()
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
