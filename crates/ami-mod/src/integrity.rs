//! Content digests and integrity verification.
//!
//! A package version is identified by the git object hash of the commit its
//! tag resolves to, computed with SHA-256 over the canonical object encoding
//! (`"commit <len>\0" + body`). The digest is recorded in `ami.sum` at fetch
//! time and recomputed from the cache on every verification.

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::cache::PackageCache;
use crate::error::{IntegrityViolation, ModError, Result, Violation};
use crate::fsutil::base_name;
use crate::git::{GitError, Vcs};
use crate::lockfile::{LockEntry, LockFile};
use crate::manifest::Manifest;

/// A content hash (SHA-256 hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute the SHA-256 hash of the given data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex_encode(&hasher.finalize()))
    }

    /// Hash `data` as a git object of type `kind`.
    pub fn git_object(kind: &str, data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{kind} {}\0", data.len()).as_bytes());
        hasher.update(data);
        ContentHash(hex_encode(&hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this hash equals the recorded hex digest.
    pub fn matches(&self, recorded: &str) -> bool {
        self.0 == recorded
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encode bytes as lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Digest of the commit `tag` resolves to inside the working copy `repo`.
pub fn commit_digest(
    vcs: &dyn Vcs,
    repo: &Path,
    tag: &str,
) -> std::result::Result<ContentHash, GitError> {
    let id = vcs.resolve_tag(repo, tag)?;
    let body = vcs.read_commit(repo, &id)?;
    Ok(ContentHash::git_object("commit", &body))
}

/// Outcome of a clean verification run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Lock entries whose cache copy recomputed to the recorded digest.
    pub verified: Vec<LockEntry>,
    /// Manifest packages checked against the lock file.
    pub manifest_packages: usize,
}

/// Cross-checks `ami.sum` against the manifest and the package cache.
pub struct IntegrityVerifier<'a> {
    vcs: &'a dyn Vcs,
    cache: &'a PackageCache,
}

impl<'a> IntegrityVerifier<'a> {
    pub fn new(vcs: &'a dyn Vcs, cache: &'a PackageCache) -> Self {
        IntegrityVerifier { vcs, cache }
    }

    /// Run both passes and fail with every violation found.
    pub fn verify(&self, lock: &LockFile, manifest: Option<&Manifest>) -> Result<VerifyReport> {
        let mut violations = Vec::new();
        let mut report = VerifyReport::default();

        if let Some(manifest) = manifest {
            violations.extend(manifest.cross_check(lock));
            report.manifest_packages = manifest.packages.len();
        }

        for entry in lock.entries() {
            match self.check_entry(&entry) {
                Some(v) => violations.push(v),
                None => report.verified.push(entry),
            }
        }

        if violations.is_empty() {
            info!(verified = report.verified.len(), "integrity verified");
            Ok(report)
        } else {
            Err(ModError::Integrity(IntegrityViolation { violations }))
        }
    }

    fn check_entry(&self, entry: &LockEntry) -> Option<Violation> {
        let path = self
            .cache
            .entry_path(base_name(&entry.name), &entry.version);
        if !path.is_dir() {
            return Some(Violation::CacheEntryMissing {
                name: entry.name.clone(),
                version: entry.version.clone(),
                path,
            });
        }
        match commit_digest(self.vcs, &path, &entry.version) {
            Err(e) => Some(Violation::DigestUnavailable {
                name: entry.name.clone(),
                version: entry.version.clone(),
                detail: e.to_string(),
            }),
            Ok(actual) if !actual.matches(&entry.digest) => Some(Violation::CacheDigestMismatch {
                name: entry.name.clone(),
                version: entry.version.clone(),
                expected: entry.digest.clone(),
                actual: actual.0,
            }),
            Ok(_) => {
                debug!(name = %entry.name, version = %entry.version, "digest ok");
                None
            }
        }
    }
}
