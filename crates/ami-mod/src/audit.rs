//! Read-only dependency audit.
//!
//! Compares the workspace's declared requirements against `ami.sum` and the
//! package cache without fetching anything or failing on the first problem.

use serde::Serialize;

use crate::cache::PackageCache;
use crate::config::ModPaths;
use crate::constraint::{satisfies, Constraint};
use crate::error::Result;
use crate::fsutil::base_name;
use crate::git::Vcs;
use crate::integrity::commit_digest;
use crate::lockfile::LockFile;
use crate::version::parse_version;
use crate::workspace::{parse_import, ImportTarget, Workspace};

/// A declared dependency on a remote or workspace package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub name: String,
    pub constraint: String,
}

/// Result of [`audit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub requirements: Vec<Requirement>,
    /// Requirements with no `ami.sum` entry.
    pub missing_in_sum: Vec<String>,
    /// Requirements none of whose locked versions satisfy the constraint.
    pub unsatisfied: Vec<String>,
    /// `name@version` of the best locked version when it is not cached.
    pub missing_in_cache: Vec<String>,
    /// `name@version` whose cached digest differs or cannot be computed.
    pub mismatched: Vec<String>,
    /// Import entries that could not be parsed.
    pub parse_errors: Vec<String>,
    pub sum_found: bool,
}

impl AuditReport {
    /// No problem of any kind was found.
    pub fn passed(&self) -> bool {
        self.missing_in_sum.is_empty()
            && self.unsatisfied.is_empty()
            && self.missing_in_cache.is_empty()
            && self.mismatched.is_empty()
            && self.parse_errors.is_empty()
    }
}

/// Audit `workspace` against the lock file and cache named by `paths`.
pub fn audit(workspace: &Workspace, paths: &ModPaths, vcs: &dyn Vcs) -> Result<AuditReport> {
    let mut report = AuditReport::default();
    let mut parsed: Vec<(String, Constraint)> = Vec::new();

    for pkg in &workspace.packages {
        for entry in &pkg.imports {
            match parse_import(entry) {
                Err(e) => report.parse_errors.push(format!("{entry}: {e}")),
                Ok((ImportTarget::Local(_), _)) => {}
                Ok((target, constraint)) => {
                    report.requirements.push(Requirement {
                        name: target.key().to_string(),
                        constraint: constraint.to_string(),
                    });
                    parsed.push((target.key().to_string(), constraint));
                }
            }
        }
    }

    let sum_path = paths.sum_file();
    report.sum_found = sum_path.is_file();
    let lock = LockFile::load(&sum_path)?;
    let cache = PackageCache::new(paths.cache_root.clone());

    for (name, constraint) in &parsed {
        if !lock.has_package(name) {
            report.missing_in_sum.push(name.clone());
            continue;
        }
        let best = lock
            .versions(name)
            .filter_map(|tag| parse_version(tag).ok().map(|v| (v, tag)))
            .filter(|(v, _)| satisfies(v, constraint))
            .max_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, tag)| tag.to_string());
        let Some(tag) = best else {
            report.unsatisfied.push(format!("{name} {constraint}"));
            continue;
        };

        let key = format!("{name}@{tag}");
        let dir = cache.entry_path(base_name(name), &tag);
        if !dir.is_dir() {
            report.missing_in_cache.push(key);
            continue;
        }
        let recorded = lock.digest(name, &tag).unwrap_or_default();
        match commit_digest(vcs, &dir, &tag) {
            Ok(actual) if actual.matches(recorded) => {}
            _ => report.mismatched.push(key),
        }
    }
    Ok(report)
}

/// Format an audit report as a human-readable string.
pub fn format_report(report: &AuditReport) -> String {
    let mut out = String::new();

    if !report.parse_errors.is_empty() {
        out.push_str(&format!("parse errors: {}\n", report.parse_errors.len()));
        for e in &report.parse_errors {
            out.push_str(&format!("    ! {e}\n"));
        }
    }
    out.push_str(&format!("requirements: {}\n", report.requirements.len()));
    if !report.sum_found {
        out.push_str("ami.sum: not found\n");
    }

    let sections = [
        ("missing in sum", &report.missing_in_sum),
        ("unsatisfied", &report.unsatisfied),
        ("missing in cache", &report.missing_in_cache),
        ("mismatched", &report.mismatched),
    ];
    for (label, items) in sections {
        if !items.is_empty() {
            out.push_str(&format!("{label}: {}\n", items.join(", ")));
        }
    }

    if report.passed() {
        out.push_str("ok: all requirements satisfied and present in cache\n");
    }
    out
}
