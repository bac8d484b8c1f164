//! `ami.workspace` loading and import declarations.
//!
//! Only the parts the module manager needs are modeled: the project header
//! and each package's `import` list. Toolchain settings and other keys are
//! accepted and ignored.
//!
//! ```yaml
//! project:
//!   name: demo
//!   version: 0.0.1
//! packages:
//!   - main:
//!       root: ./src
//!       import:
//!         - ./lib ^v1.0.0
//!         - github.com/org/repo >= 1.2.0
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::backend::git::package_name;
use crate::backend::{is_local_spec, normalize_spec};
use crate::config::WORKSPACE_FILE;
use crate::constraint::{parse_constraint, Constraint};
use crate::error::{ModError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectDecl {
    #[serde(default, deserialize_with = "scalar")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PackageDecl {
    #[serde(default, deserialize_with = "scalar")]
    name: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    version: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    root: Option<String>,
    #[serde(default)]
    import: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWorkspace {
    #[serde(default)]
    project: Option<ProjectDecl>,
    #[serde(default)]
    packages: Option<Vec<BTreeMap<String, PackageDecl>>>,
}

/// Accept any YAML scalar as text; `version: 1.0` parses as a float.
fn scalar<'de, D>(de: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<serde_yaml::Value> = Option::deserialize(de)?;
    Ok(value.and_then(|v| match v {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }))
}

/// One package entry of the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePackage {
    /// Key of the single-entry map in `packages:`.
    pub label: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub root: Option<String>,
    /// Raw `import` entries.
    pub imports: Vec<String>,
}

/// A loaded `ami.workspace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Directory containing `ami.workspace`.
    pub root: PathBuf,
    pub project: Option<ProjectDecl>,
    pub packages: Vec<WorkspacePackage>,
}

/// What an import entry points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImportTarget {
    /// Workspace-relative path, normalized to `./dir` form.
    Local(String),
    /// Remote repository keyed by `host/org/repo`.
    Remote(String),
    /// A bare package name resolved inside the workspace.
    Named(String),
}

impl ImportTarget {
    /// Key under which the target is grouped and recorded in `ami.sum`.
    pub fn key(&self) -> &str {
        match self {
            ImportTarget::Local(s) | ImportTarget::Remote(s) | ImportTarget::Named(s) => s,
        }
    }

    /// `ssh://git@host/org/repo.git` for remote targets.
    pub fn remote_url(&self) -> Option<String> {
        match self {
            ImportTarget::Remote(name) => Some(format!("ssh://git@{name}.git")),
            _ => None,
        }
    }
}

impl fmt::Display for ImportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A parsed import entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDeclaration {
    /// Label of the declaring package.
    pub package: String,
    /// The entry as written.
    pub entry: String,
    pub target: ImportTarget,
    pub constraint: Constraint,
}

impl Workspace {
    /// Load `<root>/ami.workspace`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(WORKSPACE_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModError::NoWorkspace {
                    start: root.to_path_buf(),
                })
            }
            Err(e) => return Err(ModError::io(format!("reading {}", path.display()), e)),
        };
        Self::parse(&text, root)
    }

    /// Find the nearest workspace at or above `start` and load it.
    pub fn discover(start: &Path) -> Result<Self> {
        let root = find_workspace_root(start)?;
        Self::load(&root)
    }

    fn parse(text: &str, root: &Path) -> Result<Self> {
        let raw: RawWorkspace = if text.trim().is_empty() {
            RawWorkspace::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| ModError::InvalidWorkspace {
                path: root.join(WORKSPACE_FILE),
                detail: e.to_string(),
            })?
        };

        let packages = raw
            .packages
            .unwrap_or_default()
            .into_iter()
            .flat_map(|entry| entry.into_iter())
            .map(|(label, decl)| WorkspacePackage {
                label,
                name: decl.name,
                version: decl.version,
                root: decl.root,
                imports: decl.import.unwrap_or_default(),
            })
            .collect::<Vec<_>>();
        debug!(root = %root.display(), packages = packages.len(), "loaded workspace");

        Ok(Workspace {
            root: root.to_path_buf(),
            project: raw.project,
            packages,
        })
    }

    /// Every import declaration in package order. Fails on the first bad entry.
    pub fn declared_imports(&self) -> Result<Vec<ImportDeclaration>> {
        let mut out = Vec::new();
        for pkg in &self.packages {
            for entry in &pkg.imports {
                let (target, constraint) = parse_import(entry)?;
                out.push(ImportDeclaration {
                    package: pkg.label.clone(),
                    entry: entry.clone(),
                    target,
                    constraint,
                });
            }
        }
        Ok(out)
    }

    /// Whether `rel` (workspace-relative, with or without `./`) is declared
    /// as a local import by some package. Constraints are ignored.
    pub fn declares_local(&self, rel: &str) -> bool {
        let wanted = normalize_spec(&format!("./{}", rel.trim_start_matches("./")));
        self.packages
            .iter()
            .flat_map(|p| p.imports.iter())
            .filter_map(|entry| entry.split_whitespace().next())
            .filter(|target| is_local_spec(target))
            .any(|target| normalize_spec(target) == wanted)
    }
}

/// Walk up from `start` to the first directory containing `ami.workspace`.
pub fn find_workspace_root(start: &Path) -> Result<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(WORKSPACE_FILE).is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| ModError::NoWorkspace {
            start: start.to_path_buf(),
        })
}

/// Split `"<target> [constraint...]"`. A missing constraint is `==latest`.
pub fn parse_import(entry: &str) -> Result<(ImportTarget, Constraint)> {
    let entry_trimmed = entry.trim();
    let (target, rest) = entry_trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((entry_trimmed, ""));
    if target.is_empty() {
        return Err(ModError::InvalidImport {
            entry: entry.to_string(),
            detail: "empty import entry".to_string(),
        });
    }
    let rest = rest.trim();
    let constraint = if rest.is_empty() {
        Constraint::Latest
    } else {
        parse_constraint(rest)?
    };
    Ok((parse_target(target, entry)?, constraint))
}

/// Classify an import target.
pub fn parse_target(target: &str, entry: &str) -> Result<ImportTarget> {
    let invalid = |detail: &str| ModError::InvalidImport {
        entry: entry.to_string(),
        detail: detail.to_string(),
    };

    if is_local_spec(target) {
        return Ok(ImportTarget::Local(normalize_spec(target)));
    }
    if target.starts_with("git+ssh://") || target.starts_with("ssh://") {
        let name = package_name(target);
        if name.split('/').filter(|s| !s.is_empty()).count() < 2 {
            return Err(invalid("remote import must name host/org/repo"));
        }
        return Ok(ImportTarget::Remote(name));
    }
    if target.contains("://") {
        return Err(invalid("unsupported URL scheme"));
    }
    if target.contains('/') {
        let name = target.trim_end_matches('/').trim_end_matches(".git");
        if name.split('/').any(str::is_empty) {
            return Err(invalid("malformed repository path"));
        }
        return Ok(ImportTarget::Remote(name.to_string()));
    }
    Ok(ImportTarget::Named(target.to_string()))
}
