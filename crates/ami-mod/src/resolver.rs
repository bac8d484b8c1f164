//! Workspace-level orchestration: fetch by spec, update from the workspace,
//! and verify everything recorded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::git::list_semver_tags;
use crate::backend::{BackendRegistry, Fetched};
use crate::cache::PackageCache;
use crate::config::ModPaths;
use crate::constraint::{bounds, intersect, select_tag, Bound, Constraint};
use crate::error::{IntegrityViolation, ModError, Result, Violation};
use crate::fsutil::clean_path;
use crate::git::Vcs;
use crate::integrity::{commit_digest, ContentHash, IntegrityVerifier, VerifyReport};
use crate::lockfile::LockFile;
use crate::manifest::Manifest;
use crate::workspace::{ImportDeclaration, ImportTarget, Workspace};

/// One target handled by [`WorkspaceResolver::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImport {
    /// Target key as written in the workspace (normalized).
    pub target: String,
    /// Selected tag; `None` for plain local copies.
    pub version: Option<String>,
    pub dest: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub resolved: Vec<ResolvedImport>,
    /// Bare package names resolved inside the workspace; nothing to fetch.
    pub skipped: Vec<String>,
}

/// All declarations of one target, merged.
struct TargetGroup<'a> {
    target: &'a ImportTarget,
    constraints: Vec<Constraint>,
}

/// Resolves a workspace's imports into the package cache and keeps
/// `ami.sum` in step.
pub struct WorkspaceResolver {
    paths: ModPaths,
    cache: PackageCache,
    vcs: Arc<dyn Vcs>,
    registry: BackendRegistry,
}

impl WorkspaceResolver {
    /// Default backends, with relative local specs resolved against the
    /// workspace root.
    pub fn new(paths: ModPaths, vcs: Arc<dyn Vcs>) -> Self {
        let registry = BackendRegistry::with_defaults(vcs.clone(), paths.workspace_root.clone());
        Self::with_registry(paths, vcs, registry)
    }

    pub fn with_registry(paths: ModPaths, vcs: Arc<dyn Vcs>, registry: BackendRegistry) -> Self {
        let cache = PackageCache::new(paths.cache_root.clone());
        WorkspaceResolver {
            paths,
            cache,
            vcs,
            registry,
        }
    }

    pub fn cache(&self) -> &PackageCache {
        &self.cache
    }

    pub fn paths(&self) -> &ModPaths {
        &self.paths
    }

    /// Fetch one spec. Pinned results are recorded in `ami.sum`.
    pub fn get(&self, spec: &str) -> Result<Fetched> {
        let fetched = self.registry.fetch(spec, &self.cache)?;
        if let Some(pin) = &fetched.pin {
            let mut lock = LockFile::load(&self.paths.sum_file())?;
            self.record(&mut lock, &pin.name, &pin.version, &fetched.dest)?;
        }
        Ok(fetched)
    }

    /// Resolve every import declared in `ami.workspace`.
    pub fn update(&self) -> Result<UpdateReport> {
        let workspace = Workspace::load(&self.paths.workspace_root)?;
        let declarations = workspace.declared_imports()?;
        let groups = group_by_target(&declarations)?;

        let mut lock = LockFile::load(&self.paths.sum_file())?;
        let mut report = UpdateReport::default();
        for group in &groups {
            match group.target {
                ImportTarget::Named(name) => {
                    debug!(%name, "workspace package, nothing to fetch");
                    report.skipped.push(name.clone());
                }
                ImportTarget::Local(path) => {
                    report.resolved.push(self.update_local(path, group, &mut lock)?);
                }
                ImportTarget::Remote(name) => {
                    report.resolved.push(self.update_remote(name, group, &mut lock)?);
                }
            }
        }
        info!(resolved = report.resolved.len(), "workspace updated");
        Ok(report)
    }

    /// Check `ami.sum` against the cache and, when present, `ami.manifest`.
    pub fn verify(&self) -> Result<VerifyReport> {
        let lock = LockFile::load(&self.paths.sum_file())?;
        let manifest_path = self.paths.manifest_file();
        let manifest = if manifest_path.is_file() {
            Some(Manifest::load(&manifest_path)?)
        } else {
            None
        };
        IntegrityVerifier::new(self.vcs.as_ref(), &self.cache).verify(&lock, manifest.as_ref())
    }

    fn update_local(
        &self,
        path: &str,
        group: &TargetGroup<'_>,
        lock: &mut LockFile,
    ) -> Result<ResolvedImport> {
        let root = clean_path(&self.paths.workspace_root);
        let abs = clean_path(&root.join(path));
        if !abs.starts_with(&root) {
            return Err(ModError::OutsideWorkspace { path: abs, root });
        }
        let abs_text = abs.to_string_lossy().into_owned();

        if abs.join(".git").is_dir() {
            let tags = list_semver_tags(self.vcs.as_ref(), &abs_text)?;
            if !tags.is_empty() {
                let tag = select(path, &tags, &group.constraints)?;
                let fetched = self
                    .registry
                    .fetch(&format!("file+git://{abs_text}#{tag}"), &self.cache)?;
                self.record(lock, path, &tag, &fetched.dest)?;
                return Ok(ResolvedImport {
                    target: path.to_string(),
                    version: Some(tag),
                    dest: fetched.dest,
                });
            }
        }

        if group.constraints.iter().any(|c| !c.is_latest()) {
            debug!(%path, "constraints on untagged local import are not enforced");
        }
        let fetched = self.registry.fetch(&abs_text, &self.cache)?;
        Ok(ResolvedImport {
            target: path.to_string(),
            version: None,
            dest: fetched.dest,
        })
    }

    fn update_remote(
        &self,
        name: &str,
        group: &TargetGroup<'_>,
        lock: &mut LockFile,
    ) -> Result<ResolvedImport> {
        let url = format!("ssh://git@{name}.git");
        let tags = list_semver_tags(self.vcs.as_ref(), &url)?;
        let tag = select(name, &tags, &group.constraints)?;
        let fetched = self
            .registry
            .fetch(&format!("git+ssh://git@{name}.git#{tag}"), &self.cache)?;
        self.record(lock, name, &tag, &fetched.dest)?;
        Ok(ResolvedImport {
            target: name.to_string(),
            version: Some(tag),
            dest: fetched.dest,
        })
    }

    /// Recompute the digest of `dest` at `tag`, record it, and persist.
    fn record(
        &self,
        lock: &mut LockFile,
        name: &str,
        tag: &str,
        dest: &Path,
    ) -> Result<ContentHash> {
        let digest = commit_digest(self.vcs.as_ref(), dest, tag).map_err(|e| {
            ModError::from(IntegrityViolation {
                violations: vec![Violation::DigestUnavailable {
                    name: name.to_string(),
                    version: tag.to_string(),
                    detail: e.to_string(),
                }],
            })
        })?;
        lock.set(name, tag, digest.as_str());
        lock.save(&self.paths.sum_file())?;
        info!(package = %name, version = %tag, digest = %digest, "pinned");
        Ok(digest)
    }
}

/// Merge declarations per target in first-appearance order, failing when
/// two constraints on one target cannot both hold.
fn group_by_target(declarations: &[ImportDeclaration]) -> Result<Vec<TargetGroup<'_>>> {
    let mut groups: Vec<TargetGroup<'_>> = Vec::new();
    for decl in declarations {
        match groups.iter_mut().find(|g| *g.target == decl.target) {
            Some(group) => group.constraints.push(decl.constraint.clone()),
            None => groups.push(TargetGroup {
                target: &decl.target,
                constraints: vec![decl.constraint.clone()],
            }),
        }
    }

    for group in &groups {
        let mut merged: Option<Bound> = None;
        let mut seen: Vec<String> = Vec::new();
        for c in &group.constraints {
            let Some(b) = bounds(c) else { continue };
            merged = match merged {
                None => Some(b),
                Some(acc) => match intersect(&acc, &b) {
                    Some(next) => Some(next),
                    None => {
                        return Err(ModError::ConstraintConflict {
                            target: group.target.to_string(),
                            first: seen.join(", "),
                            second: c.to_string(),
                        })
                    }
                },
            };
            seen.push(c.to_string());
        }
    }
    Ok(groups)
}

fn select(target: &str, tags: &[String], constraints: &[Constraint]) -> Result<String> {
    select_tag(tags.iter().map(String::as_str), constraints).ok_or_else(|| {
        ModError::NoMatchingVersion {
            target: target.to_string(),
            constraint: constraints
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    })
}
