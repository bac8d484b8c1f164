//! Module manager core for AMI workspaces.
//!
//! Resolves the imports declared in `ami.workspace` (local directories or
//! tagged git repositories) against semantic-version constraints, fetches
//! them into a local package cache, and keeps two independent records of
//! what was resolved:
//!
//! - **`ami.sum`**: one content digest per package version.
//! - **`ami.manifest`**: packages, artifacts and toolchain of a build.
//!
//! Verification recomputes every digest from the cache and cross-checks
//! both records. Any disagreement is fatal.
//!
//! # Architecture
//!
//! - [`version`] and [`constraint`]: semver parsing and interval algebra.
//! - [`backend`]: pluggable fetch strategies, first match wins.
//! - [`cache`], [`lockfile`], [`manifest`]: persistent state.
//! - [`integrity`]: canonical commit digests and the verifier.
//! - [`resolver`]: get, update and verify for a whole workspace.

pub mod audit;
pub mod backend;
pub mod cache;
pub mod config;
pub mod constraint;
pub mod error;
pub mod fsutil;
pub mod git;
pub mod integrity;
pub mod lockfile;
pub mod manifest;
pub mod resolver;
pub mod version;
pub mod workspace;

// Re-exports for convenience.
pub use audit::{audit, format_report, AuditReport};
pub use backend::{Backend, BackendRegistry, Fetched, PackagePin};
pub use cache::PackageCache;
pub use config::ModPaths;
pub use constraint::{parse_constraint, satisfies, select_tag, Bound, Constraint};
pub use error::{ErrorKind, IntegrityViolation, ModError, Result, Violation};
pub use git::{GitCli, GitError, Vcs};
pub use integrity::{ContentHash, IntegrityVerifier, VerifyReport};
pub use lockfile::LockFile;
pub use manifest::Manifest;
pub use resolver::{UpdateReport, WorkspaceResolver};
pub use version::{parse_version, Version};
pub use workspace::{find_workspace_root, ImportDeclaration, ImportTarget, Workspace};
