//! The `ami.sum` lock file.
//!
//! Records one SHA-256 digest per resolved package version:
//!
//! ```json
//! {
//!   "schema": "ami.sum/v1",
//!   "packages": {
//!     "github.com/org/repo": { "v1.2.0": "9f2c..." }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SUM_SCHEMA;
use crate::error::{ModError, Result};
use crate::fsutil;

/// In-memory `ami.sum`. Keys stay sorted so encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFile {
    pub schema: String,
    #[serde(default)]
    pub packages: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for LockFile {
    fn default() -> Self {
        LockFile {
            schema: SUM_SCHEMA.to_string(),
            packages: BTreeMap::new(),
        }
    }
}

/// One (package, version, digest) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockEntry {
    pub name: String,
    pub version: String,
    pub digest: String,
}

impl LockFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. A missing or blank file is an empty lock.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(ModError::io(format!("reading {}", path.display()), e)),
        };
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let invalid = |detail: String| ModError::InvalidLockFile {
            path: path.to_path_buf(),
            detail,
        };
        let lock: LockFile = serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;
        if lock.schema != SUM_SCHEMA {
            return Err(invalid(format!(
                "unsupported schema {:?}, expected {SUM_SCHEMA:?}",
                lock.schema
            )));
        }
        Ok(lock)
    }

    /// Write pretty JSON to `<path>.tmp` and rename it over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self).map_err(|e| ModError::InvalidLockFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        json.push('\n');
        fsutil::atomic_write(path, json.as_bytes())?;
        debug!(path = %path.display(), packages = self.packages.len(), "saved lock file");
        Ok(())
    }

    /// Record `digest` for `name@version`, replacing any previous digest.
    pub fn set(&mut self, name: &str, version: &str, digest: &str) {
        self.packages
            .entry(name.to_string())
            .or_default()
            .insert(version.to_string(), digest.to_string());
    }

    pub fn digest(&self, name: &str, version: &str) -> Option<&str> {
        self.packages
            .get(name)
            .and_then(|versions| versions.get(version))
            .map(String::as_str)
    }

    /// Versions recorded for `name`, in key order.
    pub fn versions(&self, name: &str) -> impl Iterator<Item = &str> {
        self.packages
            .get(name)
            .into_iter()
            .flat_map(|versions| versions.keys().map(String::as_str))
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    /// Every recorded triple, sorted by name then version key.
    pub fn entries(&self) -> Vec<LockEntry> {
        self.packages
            .iter()
            .flat_map(|(name, versions)| {
                versions.iter().map(move |(version, digest)| LockEntry {
                    name: name.clone(),
                    version: version.clone(),
                    digest: digest.clone(),
                })
            })
            .collect()
    }

    /// Drop every version of `name`. Returns whether it was present.
    pub fn remove_package(&mut self, name: &str) -> bool {
        self.packages.remove(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.values().all(BTreeMap::is_empty)
    }
}

/// `<dir>/ami.sum`
pub fn sum_path(dir: &Path) -> PathBuf {
    dir.join(crate::config::SUM_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = sum_path(dir.path());
        assert!(LockFile::load(&path).unwrap().is_empty());

        std::fs::write(&path, "  \n").unwrap();
        let lock = LockFile::load(&path).unwrap();
        assert!(lock.is_empty());
        assert_eq!(lock.schema, SUM_SCHEMA);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = sum_path(dir.path());
        let mut lock = LockFile::new();
        lock.set("github.com/org/repo", "v1.2.0", "abc");
        lock.set("github.com/org/repo", "v1.1.0", "def");
        lock.save(&path).unwrap();

        let loaded = LockFile::load(&path).unwrap();
        assert_eq!(loaded, lock);
        assert_eq!(loaded.digest("github.com/org/repo", "v1.2.0"), Some("abc"));
        assert_eq!(loaded.digest("github.com/org/repo", "v9.0.0"), None);
        assert_eq!(
            loaded.versions("github.com/org/repo").collect::<Vec<_>>(),
            vec!["v1.1.0", "v1.2.0"]
        );
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("}\n"));
    }

    #[test]
    fn insertion_order_does_not_change_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a.sum"), dir.path().join("b.sum"));

        let mut first = LockFile::new();
        first.set("z/pkg", "v1.0.0", "1");
        first.set("a/pkg", "v2.0.0", "2");
        first.set("a/pkg", "v1.0.0", "3");
        first.save(&a).unwrap();

        let mut second = LockFile::new();
        second.set("a/pkg", "v1.0.0", "3");
        second.set("a/pkg", "v2.0.0", "2");
        second.set("z/pkg", "v1.0.0", "1");
        second.save(&b).unwrap();

        assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    }

    #[test]
    fn wrong_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = sum_path(dir.path());
        std::fs::write(&path, r#"{"schema":"ami.sum/v2","packages":{}}"#).unwrap();
        let err = LockFile::load(&path).unwrap_err();
        assert!(matches!(err, ModError::InvalidLockFile { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::User);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = sum_path(dir.path());
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            LockFile::load(&path),
            Err(ModError::InvalidLockFile { .. })
        ));
    }

    #[test]
    fn entries_and_removal() {
        let mut lock = LockFile::new();
        lock.set("b", "v1.0.0", "x");
        lock.set("a", "v1.0.0", "y");
        let names: Vec<_> = lock.entries().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        assert!(lock.remove_package("a"));
        assert!(!lock.remove_package("a"));
        assert!(!lock.has_package("a"));
        assert!(lock.has_package("b"));
    }
}
