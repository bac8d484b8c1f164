//! File names, schema identifiers, and cache root resolution.

use std::path::{Path, PathBuf};

use crate::error::{ModError, Result};

/// Workspace declaration file searched for from the working directory upward.
pub const WORKSPACE_FILE: &str = "ami.workspace";
/// Lock file recording one digest per resolved package version.
pub const SUM_FILE: &str = "ami.sum";
/// Build manifest written by the build pipeline.
pub const MANIFEST_FILE: &str = "ami.manifest";

pub const SUM_SCHEMA: &str = "ami.sum/v1";
pub const MANIFEST_SCHEMA: &str = "ami.manifest/v1";

/// Overrides the package cache root when set and non-empty.
pub const CACHE_ENV: &str = "AMI_PACKAGE_CACHE";

/// Where a workspace keeps its records and where packages are cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModPaths {
    /// Directory containing `ami.workspace`.
    pub workspace_root: PathBuf,
    /// Package cache root.
    pub cache_root: PathBuf,
}

impl ModPaths {
    pub fn new(workspace_root: impl Into<PathBuf>, cache_root: impl Into<PathBuf>) -> Self {
        ModPaths {
            workspace_root: workspace_root.into(),
            cache_root: cache_root.into(),
        }
    }

    /// Paths for `workspace_root` with the cache root taken from the environment.
    pub fn from_env(workspace_root: impl Into<PathBuf>) -> Result<Self> {
        Ok(ModPaths::new(workspace_root, cache_root()?))
    }

    pub fn workspace_file(&self) -> PathBuf {
        self.workspace_root.join(WORKSPACE_FILE)
    }

    pub fn sum_file(&self) -> PathBuf {
        self.workspace_root.join(SUM_FILE)
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.workspace_root.join(MANIFEST_FILE)
    }
}

/// Resolve the package cache root: `$AMI_PACKAGE_CACHE`, else `~/.ami/pkg`.
pub fn cache_root() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CACHE_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| default_cache_under(&home))
        .ok_or(ModError::NoCacheRoot)
}

/// `<home>/.ami/pkg`
pub fn default_cache_under(home: &Path) -> PathBuf {
    home.join(".ami").join("pkg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn cache_root_prefers_env() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(CACHE_ENV, dir.path());
        let root = cache_root();
        std::env::remove_var(CACHE_ENV);
        assert_eq!(root.unwrap(), dir.path());
    }

    #[test]
    #[serial]
    fn empty_env_falls_back_to_home() {
        std::env::set_var(CACHE_ENV, "");
        let root = cache_root();
        std::env::remove_var(CACHE_ENV);
        if let Some(home) = dirs::home_dir() {
            assert_eq!(root.unwrap(), home.join(".ami").join("pkg"));
        }
    }

    #[test]
    fn workspace_file_paths() {
        let paths = ModPaths::new("/work", "/cache");
        assert_eq!(paths.workspace_file(), Path::new("/work/ami.workspace"));
        assert_eq!(paths.sum_file(), Path::new("/work/ami.sum"));
        assert_eq!(paths.manifest_file(), Path::new("/work/ami.manifest"));
        assert_eq!(
            default_cache_under(Path::new("/home/u")),
            Path::new("/home/u/.ami/pkg")
        );
    }
}
