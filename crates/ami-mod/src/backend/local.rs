//! Workspace-local imports.

use std::path::{Path, PathBuf};

use tracing::info;

use super::{is_local_spec, Backend, Fetched};
use crate::cache::PackageCache;
use crate::error::{ModError, Result};
use crate::fsutil::{clean_path, copy_dir};
use crate::workspace::{find_workspace_root, Workspace};

/// Version label used for cache entries of local copies.
pub const LOCAL_VERSION: &str = "local";

/// Copies a declared local import into `<cache>/<base>@local`.
///
/// Paths are resolved against the start directory, which must lie inside a
/// workspace, and the resolved directory must stay inside that workspace.
#[derive(Debug, Clone, Default)]
pub struct LocalPathBackend {
    start_dir: Option<PathBuf>,
}

impl LocalPathBackend {
    /// Resolve relative specs against the process working directory.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_dir(start_dir: impl Into<PathBuf>) -> Self {
        LocalPathBackend {
            start_dir: Some(start_dir.into()),
        }
    }

    fn start_dir(&self) -> Result<PathBuf> {
        match &self.start_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir()
                .map_err(|e| ModError::io("reading current directory", e)),
        }
    }
}

impl Backend for LocalPathBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn matches(&self, spec: &str) -> bool {
        is_local_spec(spec)
    }

    fn fetch(&self, spec: &str, cache: &PackageCache) -> Result<Fetched> {
        let start = self.start_dir()?;
        let root = clean_path(&find_workspace_root(&start)?);

        let raw = spec.strip_prefix("file://").unwrap_or(spec);
        let resolved = clean_path(&start.join(raw));
        let rel = resolved
            .strip_prefix(&root)
            .map_err(|_| ModError::OutsideWorkspace {
                path: resolved.clone(),
                root: root.clone(),
            })?;
        let rel = rel_spec(rel);

        let workspace = Workspace::load(&root)?;
        if !workspace.declares_local(&rel) {
            return Err(ModError::UndeclaredImport { path: rel });
        }

        if !resolved.is_dir() {
            return Err(ModError::io(
                format!("local import {rel}"),
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} is not a directory", resolved.display()),
                ),
            ));
        }

        let base = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        let dest = cache.install(&base, LOCAL_VERSION, |staging| {
            copy_dir(&resolved, staging).map(|_| ())
        })?;
        info!(import = %rel, dest = %dest.display(), "copied local import");
        Ok(Fetched { dest, pin: None })
    }
}

/// `./a/b` form of a workspace-relative path.
fn rel_spec(rel: &Path) -> String {
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("./{}", parts.join("/"))
}
