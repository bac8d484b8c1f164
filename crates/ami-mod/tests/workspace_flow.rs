//! End-to-end: declare a tagged local repository, update, then verify.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use ami_mod::{
    ErrorKind, GitCli, LockFile, Manifest, ModError, ModPaths, Violation, WorkspaceResolver,
};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
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
        "git {args:?}: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

fn tagged_repo(dir: &Path, tags: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    git(dir, &["init", "-q"]);
    for tag in tags {
        std::fs::write(dir.join("lib.ami"), format!("package lib // {tag}\n")).unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", &format!("release {tag}")]);
        git(dir, &["tag", tag]);
    }
}

fn workspace(imports: &[&str]) -> (tempfile::TempDir, ModPaths) {
    let dir = tempfile::tempdir().unwrap();
    let mut text = String::from("project:\n  name: app\n  version: 0.1.0\npackages:\n  - main:\n      import:\n");
    for entry in imports {
        text.push_str(&format!("        - {entry}\n"));
    }
    std::fs::write(dir.path().join("ami.workspace"), text).unwrap();
    let paths = ModPaths::new(dir.path(), dir.path().join(".cache"));
    (dir, paths)
}

#[test]
fn update_pins_highest_matching_tag_and_verifies() {
    if !git_available() {
        return;
    }
    let (dir, paths) = workspace(&["./lib ^v1.0.0"]);
    tagged_repo(&dir.path().join("lib"), &["v1.0.0", "v1.1.0", "v2.0.0"]);

    let resolver = WorkspaceResolver::new(paths.clone(), Arc::new(GitCli::new()));
    let report = resolver.update().unwrap();
    assert_eq!(report.resolved.len(), 1);
    assert_eq!(report.resolved[0].version.as_deref(), Some("v1.1.0"));
    assert!(resolver.cache().contains("lib", "v1.1.0"));
    assert!(!resolver.cache().contains("lib", "v2.0.0"));

    let lock = LockFile::load(&paths.sum_file()).unwrap();
    assert_eq!(lock.versions("./lib").collect::<Vec<_>>(), vec!["v1.1.0"]);
    let digest = lock.digest("./lib", "v1.1.0").unwrap().to_string();
    assert!(!digest.is_empty());

    let verified = resolver.verify().unwrap();
    assert_eq!(verified.verified.len(), 1);
    assert_eq!(verified.manifest_packages, 0);

    let mut manifest = Manifest::new("app", "0.1.0");
    manifest.add_package("./lib", "v1.1.0", &digest, "./lib");
    manifest.save(&paths.manifest_file()).unwrap();
    assert_eq!(resolver.verify().unwrap().manifest_packages, 1);
}

#[test]
fn tampered_sum_fails_verification() {
    if !git_available() {
        return;
    }
    let (dir, paths) = workspace(&["./lib"]);
    tagged_repo(&dir.path().join("lib"), &["v0.1.0"]);

    let resolver = WorkspaceResolver::new(paths.clone(), Arc::new(GitCli::new()));
    resolver.update().unwrap();

    let mut lock = LockFile::load(&paths.sum_file()).unwrap();
    lock.set("./lib", "v0.1.0", "00");
    lock.save(&paths.sum_file()).unwrap();

    let err = resolver.verify().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    let ModError::Integrity(violation) = err else {
        panic!("expected integrity error");
    };
    assert!(matches!(
        violation.violations.as_slice(),
        [Violation::CacheDigestMismatch { .. }]
    ));
}

#[test]
fn untagged_local_import_is_copied_without_pin() {
    let (dir, paths) = workspace(&["./vendor/util"]);
    let util = dir.path().join("vendor/util");
    std::fs::create_dir_all(&util).unwrap();
    std::fs::write(util.join("util.ami"), "package util\n").unwrap();

    let resolver = WorkspaceResolver::new(paths.clone(), Arc::new(GitCli::new()));
    let report = resolver.update().unwrap();
    assert_eq!(report.resolved[0].version, None);
    assert!(report.resolved[0].dest.join("util.ami").is_file());
    assert!(LockFile::load(&paths.sum_file()).unwrap().is_empty());
}
