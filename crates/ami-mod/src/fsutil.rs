//! Filesystem helpers shared by the cache, backends, and record files.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{ModError, Result};

/// Fold `.` and `..` components without touching the filesystem.
///
/// `..` at the start of a relative path is kept; `..` directly under the
/// root is dropped. An empty result becomes `.`.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(comp),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Recursively copy `src` into `dst`, creating `dst` and any parents.
///
/// Symbolic links are followed; the copy holds regular files only.
pub fn copy_dir(src: &Path, dst: &Path) -> Result<u64> {
    let mut files = 0u64;
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).display().to_string();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            ModError::io(format!("walking {path}"), source)
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .unwrap_or_else(|_| entry.path());
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| ModError::io(format!("creating {}", target.display()), e))?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| {
                ModError::io(
                    format!("copying {} to {}", entry.path().display(), target.display()),
                    e,
                )
            })?;
            files += 1;
        }
    }
    Ok(files)
}

/// Write `data` to `<path>.tmp` and rename it over `path`.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, data)
        .map_err(|e| ModError::io(format!("writing {}", tmp.display()), e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        ModError::io(format!("renaming {} into place", tmp.display()), e)
    })
}

/// Last path component of a slash-separated name or path.
pub fn base_name(s: &str) -> &str {
    s.trim_end_matches('/').rsplit('/').next().unwrap_or(s)
}
