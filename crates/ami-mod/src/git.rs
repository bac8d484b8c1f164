//! Git operations consumed by the module manager.
//!
//! The resolver, backends, and integrity verifier need exactly four things
//! from version control; they live behind the [`Vcs`] trait so tests can
//! substitute a fake. [`GitCli`] implements them with the system `git`
//! binary.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

/// A failed git invocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{command}` failed: {detail}")]
pub struct GitError {
    pub command: String,
    pub detail: String,
}

/// The version-control collaborator.
pub trait Vcs {
    /// Tag names advertised by `url`, without cloning.
    fn list_remote_tags(&self, url: &str) -> Result<Vec<String>, GitError>;

    /// Depth-1 clone of `url` into `dest` with `tag` checked out.
    fn shallow_clone(&self, url: &str, tag: &str, dest: &Path) -> Result<(), GitError>;

    /// Commit id that `tag` ultimately points to, peeling annotated and
    /// nested tag objects.
    fn resolve_tag(&self, repo: &Path, tag: &str) -> Result<String, GitError>;

    /// Raw encoded body of commit `id` (without the object header).
    fn read_commit(&self, repo: &Path, id: &str) -> Result<Vec<u8>, GitError>;
}

/// [`Vcs`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        GitCli {
            program: PathBuf::from("git"),
        }
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific git executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        GitCli {
            program: program.into(),
        }
    }

    fn run<I, S>(&self, args: I) -> Result<Output, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args
            .into_iter()
            .map(|a| a.as_ref().to_os_string())
            .collect();
        let command = describe(&self.program, &args);
        debug!(%command, "running git");

        let mut cmd = Command::new(&self.program);
        cmd.args(&args).env("GIT_TERMINAL_PROMPT", "0");
        // Agent or key based SSH auth only; never block on a password prompt.
        if std::env::var_os("GIT_SSH_COMMAND").is_none() {
            cmd.env("GIT_SSH_COMMAND", "ssh -oBatchMode=yes");
        }

        let out = cmd.output().map_err(|e| GitError {
            command: command.clone(),
            detail: format!("failed to execute git: {e}"),
        })?;
        if !out.status.success() {
            return Err(GitError {
                command,
                detail: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(out)
    }

    fn git_dir(repo: &Path) -> Result<PathBuf, GitError> {
        let dir = repo.join(".git");
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(GitError {
                command: "git".to_string(),
                detail: format!("{} is not a git repository", repo.display()),
            })
        }
    }
}

impl Vcs for GitCli {
    fn list_remote_tags(&self, url: &str) -> Result<Vec<String>, GitError> {
        let out = self.run(["ls-remote", "--tags", "--", url])?;
        Ok(parse_ls_remote_tags(&String::from_utf8_lossy(&out.stdout)))
    }

    fn shallow_clone(&self, url: &str, tag: &str, dest: &Path) -> Result<(), GitError> {
        self.run([
            OsStr::new("clone"),
            OsStr::new("--quiet"),
            OsStr::new("--depth"),
            OsStr::new("1"),
            OsStr::new("--branch"),
            OsStr::new(tag),
            OsStr::new("--"),
            OsStr::new(url),
            dest.as_os_str(),
        ])?;
        Ok(())
    }

    fn resolve_tag(&self, repo: &Path, tag: &str) -> Result<String, GitError> {
        let git_dir = Self::git_dir(repo)?;
        let out = self.run([
            OsStr::new("--git-dir"),
            git_dir.as_os_str(),
            OsStr::new("rev-parse"),
            OsStr::new("--verify"),
            OsStr::new("--quiet"),
            OsStr::new(&format!("refs/tags/{tag}^{{commit}}")),
        ])?;
        let id = String::from_utf8_lossy(&out.stdout).trim().to_string();
        if id.is_empty() {
            return Err(GitError {
                command: format!("git rev-parse refs/tags/{tag}"),
                detail: "tag does not resolve to a commit".to_string(),
            });
        }
        Ok(id)
    }

    fn read_commit(&self, repo: &Path, id: &str) -> Result<Vec<u8>, GitError> {
        let git_dir = Self::git_dir(repo)?;
        let out = self.run([
            OsStr::new("--git-dir"),
            git_dir.as_os_str(),
            OsStr::new("cat-file"),
            OsStr::new("commit"),
            OsStr::new(id),
        ])?;
        Ok(out.stdout)
    }
}

/// Extract tag names from `git ls-remote --tags` output.
///
/// Peeled `^{}` entries duplicate their annotated tag and are dropped.
pub fn parse_ls_remote_tags(output: &str) -> Vec<String> {
    let mut tags: Vec<String> = output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|r| r.strip_prefix("refs/tags/"))
        .filter(|t| !t.ends_with("^{}"))
        .map(str::to_string)
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

fn describe(program: &Path, args: &[std::ffi::OsString]) -> String {
    let mut s = program.display().to_string();
    for a in args {
        s.push(' ');
        s.push_str(&a.to_string_lossy());
    }
    s
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for building throwaway repositories with the real `git`.

    use std::path::Path;
    use std::process::Command;

    pub fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .args([
                "-c",
                "user.name=ami-test",
                "-c",
                "user.email=ami-test@example.com",
                "-c",
                "commit.gpgsign=false",
                "-c",
                "tag.gpgsign=false",
                "-c",
                "init.defaultBranch=main",
            ])
            .args(args)
            .current_dir(dir)
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .output()
            .expect("spawn git");
        assert!(
            out.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    /// Initialize `dir` as a repository with one commit per tag.
    pub fn init_tagged_repo(dir: &Path, tags: &[&str]) {
        std::fs::create_dir_all(dir).unwrap();
        git(dir, &["init", "--quiet"]);
        for (i, tag) in tags.iter().enumerate() {
            std::fs::write(dir.join("lib.ami"), format!("package lib // rev {i}\n")).unwrap();
            git(dir, &["add", "lib.ami"]);
            git(dir, &["commit", "--quiet", "-m", &format!("release {tag}")]);
            git(dir, &["tag", tag]);
        }
    }
}
