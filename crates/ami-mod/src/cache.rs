//! Local package cache.
//!
//! Every fetched package lives in its own directory named after the
//! package's base name and resolved version:
//!
//! ```text
//! <cache_root>/
//!   repo@v1.2.0/      working copy of the tag
//!   lib@local/        copy of a workspace-local import
//!   .staging-<uuid>/  in-flight fetch, renamed into place when complete
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config;
use crate::error::{ModError, Result};

const STAGING_PREFIX: &str = ".staging-";

/// A package cache backed by the filesystem.
#[derive(Debug, Clone)]
pub struct PackageCache {
    /// Root directory for the cache.
    root: PathBuf,
}

impl PackageCache {
    /// Create a cache rooted at the given directory. Nothing is created on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PackageCache { root: root.into() }
    }

    /// Cache at `$AMI_PACKAGE_CACHE`, or `~/.ami/pkg`.
    pub fn default_location() -> Result<Self> {
        config::cache_root().map(PackageCache::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if needed.
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| ModError::io(format!("creating cache root {}", self.root.display()), e))
    }

    /// Directory for `base@version`.
    pub fn entry_path(&self, base: &str, version: &str) -> PathBuf {
        self.root.join(entry_name(base, version))
    }

    pub fn contains(&self, base: &str, version: &str) -> bool {
        self.entry_path(base, version).is_dir()
    }

    /// Names of all cache entries, sorted. In-flight staging directories are hidden.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let read = std::fs::read_dir(&self.root)
            .map_err(|e| ModError::io(format!("listing {}", self.root.display()), e))?;

        let mut names = Vec::new();
        for entry in read {
            let entry =
                entry.map_err(|e| ModError::io(format!("reading {}", self.root.display()), e))?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove one entry by directory name. Returns whether it existed.
    pub fn remove(&self, entry: &str) -> Result<bool> {
        let dir = self.root.join(entry);
        if !dir.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)
            .map_err(|e| ModError::io(format!("removing {}", dir.display()), e))?;
        debug!(entry, "removed cache entry");
        Ok(true)
    }

    /// Remove every entry, including leftover staging directories.
    /// Returns the number of directories removed.
    pub fn clean(&self) -> Result<usize> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        let read = std::fs::read_dir(&self.root)
            .map_err(|e| ModError::io(format!("listing {}", self.root.display()), e))?;
        let mut removed = 0;
        for entry in read {
            let entry =
                entry.map_err(|e| ModError::io(format!("reading {}", self.root.display()), e))?;
            let path = entry.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)
                    .map_err(|e| ModError::io(format!("removing {}", path.display()), e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Replace `base@version` with content produced by `fill`.
    ///
    /// `fill` receives a fresh staging path that does not exist yet. When it
    /// succeeds the staging directory is renamed over the entry; when it
    /// fails the staging directory is discarded and the error returned.
    pub fn install<F>(&self, base: &str, version: &str, fill: F) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        self.ensure()?;
        let dest = self.entry_path(base, version);
        if dest.exists() {
            if let Err(e) = std::fs::remove_dir_all(&dest) {
                warn!(path = %dest.display(), error = %e, "could not remove previous cache entry");
            }
        }

        let staging = self
            .root
            .join(format!("{STAGING_PREFIX}{}", uuid::Uuid::new_v4()));
        if let Err(e) = fill(&staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }
        std::fs::rename(&staging, &dest).map_err(|e| {
            let _ = std::fs::remove_dir_all(&staging);
            ModError::io(format!("moving fetched package into {}", dest.display()), e)
        })?;
        debug!(path = %dest.display(), "installed cache entry");
        Ok(dest)
    }
}

/// `base@version`
pub fn entry_name(base: &str, version: &str) -> String {
    format!("{base}@{version}")
}
