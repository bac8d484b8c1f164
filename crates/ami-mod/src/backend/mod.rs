//! Fetch strategies for package specs.
//!
//! A [`Backend`] recognizes a family of specs and knows how to materialize
//! one into the [`PackageCache`]. The [`BackendRegistry`] holds an ordered
//! list of backends and dispatches each spec to the first that accepts it.

pub mod git;
pub mod local;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

pub use self::git::GitTagBackend;
pub use self::local::LocalPathBackend;

use crate::cache::PackageCache;
use crate::error::{ModError, Result};
use crate::fsutil::clean_path;
use crate::git::Vcs;

/// The version a fetch resolved, to be recorded in `ami.sum`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePin {
    /// Lock file key, e.g. `github.com/org/repo`.
    pub name: String,
    /// Tag as spelled in the repository, e.g. `v1.2.0`.
    pub version: String,
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Cache directory holding the package.
    pub dest: PathBuf,
    /// Present when the package is pinned to a tagged commit.
    pub pin: Option<PackagePin>,
}

/// A pluggable fetch strategy.
pub trait Backend {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this backend handles `spec`.
    fn matches(&self, spec: &str) -> bool;

    /// Materialize `spec` into `cache`.
    fn fetch(&self, spec: &str, cache: &PackageCache) -> Result<Fetched>;
}

/// Ordered backend list; the first backend that matches a spec wins.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Box<dyn Backend>>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Local-path backend rooted at `start_dir`, then the git tag backend.
    pub fn with_defaults(vcs: Arc<dyn Vcs>, start_dir: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(LocalPathBackend::with_start_dir(start_dir)));
        registry.register(Box::new(GitTagBackend::new(vcs)));
        registry
    }

    /// Append a backend. Earlier registrations take precedence.
    pub fn register(&mut self, backend: Box<dyn Backend>) {
        self.backends.push(backend);
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// The first backend accepting `spec` (after normalization).
    pub fn select(&self, spec: &str) -> Result<&dyn Backend> {
        let normalized = normalize_spec(spec);
        self.backends
            .iter()
            .find(|b| b.matches(&normalized))
            .map(|b| b.as_ref())
            .ok_or_else(|| ModError::UnsupportedSpec {
                spec: spec.to_string(),
                detail: "expected a local path or git+ssh://host/org/repo#<tag>".to_string(),
            })
    }

    /// Normalize `spec`, select a backend, and fetch.
    pub fn fetch(&self, spec: &str, cache: &PackageCache) -> Result<Fetched> {
        let normalized = normalize_spec(spec);
        let backend = self.select(&normalized)?;
        debug!(backend = backend.name(), spec = %normalized, "fetching");
        backend.fetch(&normalized, cache)
    }
}

/// Whether `spec` names a filesystem path rather than a remote.
pub fn is_local_spec(spec: &str) -> bool {
    spec == "."
        || spec == ".."
        || spec.starts_with("./")
        || spec.starts_with("../")
        || spec.starts_with('/')
        || spec.starts_with("file://")
}

/// Lexically normalize a local spec; other specs are returned unchanged.
///
/// `file://` is stripped, `.` and `..` are folded, and relative results keep
/// an explicit `./` or `../` prefix.
pub fn normalize_spec(spec: &str) -> String {
    if !is_local_spec(spec) {
        return spec.to_string();
    }
    let raw = spec.strip_prefix("file://").unwrap_or(spec);
    let cleaned = clean_path(Path::new(raw));
    let text = cleaned.to_string_lossy().into_owned();
    if cleaned.is_absolute() || text == "." || text == ".." || text.starts_with("../") {
        text
    } else {
        format!("./{text}")
    }
}
