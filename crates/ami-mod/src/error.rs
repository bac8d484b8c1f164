//! Module manager error types.
//!
//! Every error belongs to exactly one [`ErrorKind`]. The command-line
//! boundary maps kinds to process exit codes; nothing inside the library
//! inspects error messages to decide what happened.

use std::path::PathBuf;

use crate::git::GitError;

/// The four disjoint failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input or workspace configuration.
    User,
    /// Tag listing, clone, or checkout against a remote failed.
    Network,
    /// Two sources of truth disagree.
    Integrity,
    /// Local filesystem failure.
    Io,
}

impl ErrorKind {
    /// Process exit code for this class.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::User => 1,
            ErrorKind::Network => 2,
            ErrorKind::Integrity => 3,
            ErrorKind::Io => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::User => "user error",
            ErrorKind::Network => "network error",
            ErrorKind::Integrity => "integrity violation",
            ErrorKind::Io => "i/o error",
        }
    }
}

/// Errors that can occur during module operations.
#[derive(Debug, thiserror::Error)]
pub enum ModError {
    /// Version string is not `v?MAJOR.MINOR.PATCH(-PRERELEASE)?`.
    #[error("invalid version: {0:?}")]
    InvalidVersion(String),

    /// Constraint string has an unrecognized shape.
    #[error("invalid constraint: {0:?}")]
    InvalidConstraint(String),

    /// Constraint uses an operator the resolver does not support (e.g. `<=`).
    #[error("unsupported constraint operator {operator:?} in {constraint:?}")]
    UnsupportedConstraintOperator { constraint: String, operator: String },

    /// No `ami.workspace` in the start directory or any parent.
    #[error("ami.workspace not found in {} or any parent directory", start.display())]
    NoWorkspace { start: PathBuf },

    /// A local import resolves outside the workspace root.
    #[error("{} is outside the workspace rooted at {}", path.display(), root.display())]
    OutsideWorkspace { path: PathBuf, root: PathBuf },

    /// A local import is not declared in any package's import list.
    #[error("local import {path:?} is not declared in ami.workspace")]
    UndeclaredImport { path: String },

    /// A git spec without a `#<tag>` suffix.
    #[error("missing #<semver-tag> in {spec:?}")]
    MissingTag { spec: String },

    /// A git spec whose tag is not a semantic version.
    #[error("tag {tag:?} in {spec:?} is not a semantic version")]
    InvalidTag { spec: String, tag: String },

    /// No registered backend accepts this spec.
    #[error("unsupported package spec: {spec} ({detail})")]
    UnsupportedSpec { spec: String, detail: String },

    /// An import entry in ami.workspace cannot be interpreted.
    #[error("invalid import {entry:?}: {detail}")]
    InvalidImport { entry: String, detail: String },

    /// ami.workspace cannot be parsed.
    #[error("invalid workspace at {}: {detail}", path.display())]
    InvalidWorkspace { path: PathBuf, detail: String },

    /// ami.sum cannot be parsed or has an unknown schema.
    #[error("invalid lock file at {}: {detail}", path.display())]
    InvalidLockFile { path: PathBuf, detail: String },

    /// ami.manifest is missing required fields or has an unknown schema.
    #[error("invalid manifest: {detail}")]
    InvalidManifest { detail: String },

    /// No candidate tag satisfies the requested constraint.
    #[error("no version of {target} satisfies {constraint}")]
    NoMatchingVersion { target: String, constraint: String },

    /// Two declarations of the same target accept disjoint version ranges.
    #[error("conflicting constraints for {target}: {first} and {second} cannot both hold")]
    ConstraintConflict {
        target: String,
        first: String,
        second: String,
    },

    /// Remote transport failure (tag listing, clone, checkout).
    #[error("network error for {url}")]
    Network {
        url: String,
        #[source]
        source: GitError,
    },

    /// Lock file, manifest, and cache disagree.
    #[error(transparent)]
    Integrity(#[from] IntegrityViolation),

    /// The cache root cannot be determined.
    #[error("cannot determine package cache root: set AMI_PACKAGE_CACHE or HOME")]
    NoCacheRoot,

    /// Filesystem error.
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ModError {
    /// Wrap an I/O error with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ModError::Io {
            context: context.into(),
            source,
        }
    }

    /// Classify this error for the command-line boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModError::Network { .. } => ErrorKind::Network,
            ModError::Integrity(_) => ErrorKind::Integrity,
            ModError::Io { .. } | ModError::NoCacheRoot => ErrorKind::Io,
            ModError::InvalidVersion(_)
            | ModError::InvalidConstraint(_)
            | ModError::UnsupportedConstraintOperator { .. }
            | ModError::NoWorkspace { .. }
            | ModError::OutsideWorkspace { .. }
            | ModError::UndeclaredImport { .. }
            | ModError::MissingTag { .. }
            | ModError::InvalidTag { .. }
            | ModError::UnsupportedSpec { .. }
            | ModError::InvalidImport { .. }
            | ModError::InvalidWorkspace { .. }
            | ModError::InvalidLockFile { .. }
            | ModError::InvalidManifest { .. }
            | ModError::NoMatchingVersion { .. }
            | ModError::ConstraintConflict { .. } => ErrorKind::User,
        }
    }
}

/// A single disagreement found by an integrity pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    /// Manifest package has no entry in ami.sum.
    #[error("ami.sum missing package: {name}")]
    SumMissingPackage { name: String },

    /// Manifest package version has no entry in ami.sum.
    #[error("ami.sum missing version {version} for package: {name}")]
    SumMissingVersion { name: String, version: String },

    /// Manifest digest differs from the ami.sum digest.
    #[error(
        "ami.sum digest mismatch for package {name}@{version}: manifest {manifest}, ami.sum {sum}"
    )]
    ManifestDigestMismatch {
        name: String,
        version: String,
        manifest: String,
        sum: String,
    },

    /// ami.sum entry has no cache directory.
    #[error("cache entry missing for {name}@{version}: {}", path.display())]
    CacheEntryMissing {
        name: String,
        version: String,
        path: PathBuf,
    },

    /// Cache entry is not a repository or the tag does not resolve.
    #[error("cannot compute digest for {name}@{version}: {detail}")]
    DigestUnavailable {
        name: String,
        version: String,
        detail: String,
    },

    /// Recomputed cache digest differs from the ami.sum digest.
    #[error("digest mismatch for {name}@{version}: expected {expected}, got {actual}")]
    CacheDigestMismatch {
        name: String,
        version: String,
        expected: String,
        actual: String,
    },
}

/// One or more integrity problems. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("integrity violation{}", render(violations))]
pub struct IntegrityViolation {
    pub violations: Vec<Violation>,
}

/// One indented line per violation.
fn render(violations: &[Violation]) -> String {
    violations.iter().map(|v| format!("\n  - {v}")).collect()
}

/// Result type alias for module operations.
pub type Result<T> = std::result::Result<T, ModError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_distinct_exit_codes() {
        let codes = [
            ErrorKind::User.exit_code(),
            ErrorKind::Network.exit_code(),
            ErrorKind::Integrity.exit_code(),
            ErrorKind::Io.exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn network_errors_are_classified_by_variant() {
        let err = ModError::Network {
            url: "ssh://git@example.com/org/repo.git".to_string(),
            source: GitError {
                command: "git ls-remote".to_string(),
                detail: "integrity check failed".to_string(),
            },
        };
        // Message text mentioning "integrity" must not change the class.
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn integrity_display_lists_every_violation() {
        let err = ModError::from(IntegrityViolation {
            violations: vec![
                Violation::SumMissingPackage {
                    name: "a".to_string(),
                },
                Violation::SumMissingVersion {
                    name: "b".to_string(),
                    version: "v1.0.0".to_string(),
                },
            ],
        });
        assert_eq!(err.kind(), ErrorKind::Integrity);
        let text = err.to_string();
        assert_eq!(
            text,
            "integrity violation\n  - ami.sum missing package: a\n  - ami.sum missing version v1.0.0 for package: b"
        );

        let missing = Violation::CacheEntryMissing {
            name: "lib".to_string(),
            version: "v1.0.0".to_string(),
            path: PathBuf::from("/cache/lib@v1.0.0"),
        };
        assert_eq!(
            missing.to_string(),
            "cache entry missing for lib@v1.0.0: /cache/lib@v1.0.0"
        );
        let source: &dyn std::error::Error = &missing;
        assert!(source.source().is_none());
    }

    #[test]
    fn user_errors() {
        assert_eq!(
            ModError::InvalidTag {
                spec: "git+ssh://h/o/r#x".to_string(),
                tag: "x".to_string()
            }
            .kind(),
            ErrorKind::User
        );
        assert_eq!(ModError::NoCacheRoot.kind(), ErrorKind::Io);
    }
}
