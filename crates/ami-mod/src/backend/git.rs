//! Tagged git repositories.
//!
//! Specs have the form `git+ssh://[user@]host/org/repo[.git]#<tag>` or, for
//! repositories on the local filesystem, `file+git:///abs/path#<tag>`. The
//! tag must be a semantic version.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::{Backend, Fetched, PackagePin};
use crate::cache::PackageCache;
use crate::error::{ModError, Result};
use crate::fsutil::{base_name, clean_path};
use crate::git::Vcs;
use crate::version::is_version;

const SSH_SCHEME: &str = "git+ssh://";
const FILE_SCHEME: &str = "file+git://";

/// Shallow-clones a tag into `<cache>/<repo>@<tag>`.
pub struct GitTagBackend {
    vcs: Arc<dyn Vcs>,
}

impl GitTagBackend {
    pub fn new(vcs: Arc<dyn Vcs>) -> Self {
        GitTagBackend { vcs }
    }
}

/// A git spec split into its clone URL, lock name and tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSpec {
    /// URL handed to `git clone`.
    pub url: String,
    /// Lock file key.
    pub name: String,
    pub tag: String,
}

/// Validate a git spec without any I/O.
pub fn parse_git_spec(spec: &str) -> Result<GitSpec> {
    let (location, tag) = match spec.rsplit_once('#') {
        Some((location, tag)) if !tag.is_empty() => (location, tag),
        _ => {
            return Err(ModError::MissingTag {
                spec: spec.to_string(),
            })
        }
    };
    if !is_version(tag) {
        return Err(ModError::InvalidTag {
            spec: spec.to_string(),
            tag: tag.to_string(),
        });
    }

    let (url, name) = if let Some(rest) = location.strip_prefix(SSH_SCHEME) {
        let url = format!("ssh://{rest}");
        let name = package_name(&url);
        (url, name)
    } else if let Some(path) = location.strip_prefix(FILE_SCHEME) {
        if !Path::new(path).is_absolute() {
            return Err(ModError::UnsupportedSpec {
                spec: spec.to_string(),
                detail: "file+git requires an absolute path".to_string(),
            });
        }
        let path = clean_path(Path::new(path)).to_string_lossy().into_owned();
        (format!("file://{path}"), path)
    } else {
        return Err(ModError::UnsupportedSpec {
            spec: spec.to_string(),
            detail: "expected git+ssh:// or file+git://".to_string(),
        });
    };

    if base_name(&name).is_empty() {
        return Err(ModError::UnsupportedSpec {
            spec: spec.to_string(),
            detail: "missing repository path".to_string(),
        });
    }
    Ok(GitSpec {
        url,
        name,
        tag: tag.to_string(),
    })
}

impl Backend for GitTagBackend {
    fn name(&self) -> &'static str {
        "git"
    }

    fn matches(&self, spec: &str) -> bool {
        spec.starts_with(SSH_SCHEME) || spec.starts_with(FILE_SCHEME)
    }

    fn fetch(&self, spec: &str, cache: &PackageCache) -> Result<Fetched> {
        let parsed = parse_git_spec(spec)?;
        let base = repo_base_name(&parsed.url);
        debug!(url = %parsed.url, tag = %parsed.tag, "cloning");

        let dest = cache.install(&base, &parsed.tag, |staging| {
            self.vcs
                .shallow_clone(&parsed.url, &parsed.tag, staging)
                .map_err(|source| ModError::Network {
                    url: parsed.url.clone(),
                    source,
                })
        })?;
        info!(package = %parsed.name, tag = %parsed.tag, dest = %dest.display(), "fetched");

        Ok(Fetched {
            dest,
            pin: Some(PackagePin {
                name: parsed.name,
                version: parsed.tag,
            }),
        })
    }
}

/// Tags advertised by `url` that parse as versions.
pub fn list_semver_tags(vcs: &dyn Vcs, url: &str) -> Result<Vec<String>> {
    let tags = vcs
        .list_remote_tags(url)
        .map_err(|source| ModError::Network {
            url: url.to_string(),
            source,
        })?;
    Ok(tags.into_iter().filter(|t| is_version(t)).collect())
}

/// Lock key for a repository URL: scheme, user and `.git` removed.
///
/// `ssh://git@github.com/org/repo.git` becomes `github.com/org/repo`.
pub fn package_name(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let path = path.trim_end_matches('/').trim_end_matches(".git");
    if path.is_empty() {
        host.to_string()
    } else {
        format!("{host}/{path}")
    }
}

/// Last path segment of a repository URL without `.git`.
pub fn repo_base_name(url: &str) -> String {
    base_name(url.trim_end_matches('/'))
        .trim_end_matches(".git")
        .to_string()
}
