//! `ami mod`: fetch, update, verify and inspect workspace dependencies.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use ami_mod::{
    find_workspace_root, format_report, BackendRegistry, GitCli, ModPaths, PackageCache, Vcs,
    Workspace, WorkspaceResolver,
};
use anyhow::{Context as _, Result};
use serde_json::json;

/// Where a `mod` command runs and how it reports.
pub struct Context {
    pub cwd: PathBuf,
    /// Explicit `--workspace`; otherwise discovered from `cwd`.
    pub workspace: Option<PathBuf>,
    pub json: bool,
    vcs: Arc<dyn Vcs>,
}

impl Context {
    pub fn new(cwd: PathBuf, workspace: Option<PathBuf>, json: bool) -> Self {
        Context {
            cwd,
            workspace,
            json,
            vcs: Arc::new(GitCli::new()),
        }
    }

    fn workspace_root(&self) -> Result<PathBuf> {
        match &self.workspace {
            Some(dir) => Ok(dir.clone()),
            None => Ok(find_workspace_root(&self.cwd)?),
        }
    }

    fn paths(&self) -> Result<ModPaths> {
        Ok(ModPaths::from_env(self.workspace_root()?)?)
    }

    fn cache(&self) -> Result<PackageCache> {
        Ok(PackageCache::default_location()?)
    }

    /// Local specs resolve against `--workspace` when given, else the cwd.
    fn resolver(&self, paths: ModPaths) -> WorkspaceResolver {
        let start = match &self.workspace {
            Some(_) => paths.workspace_root.clone(),
            None => self.cwd.clone(),
        };
        let registry = BackendRegistry::with_defaults(self.vcs.clone(), start);
        WorkspaceResolver::with_registry(paths, self.vcs.clone(), registry)
    }
}

/// Run `ami mod get <spec>`.
///
/// Outside a workspace the lock file is written to the current directory.
pub fn get(ctx: &Context, spec: &str, out: &mut dyn Write) -> Result<()> {
    let root = ctx.workspace_root().unwrap_or_else(|_| ctx.cwd.clone());
    let paths = ModPaths::from_env(root)?;
    let fetched = ctx
        .resolver(paths)
        .get(spec)
        .with_context(|| format!("fetching {spec}"))?;

    if ctx.json {
        writeln!(
            out,
            "{}",
            json!({
                "spec": spec,
                "dest": fetched.dest,
                "name": fetched.pin.as_ref().map(|p| &p.name),
                "version": fetched.pin.as_ref().map(|p| &p.version),
            })
        )?;
    } else {
        match &fetched.pin {
            Some(pin) => writeln!(
                out,
                "Fetched {}@{} into {}",
                pin.name,
                pin.version,
                fetched.dest.display()
            )?,
            None => writeln!(out, "Copied {spec} into {}", fetched.dest.display())?,
        }
    }
    Ok(())
}

/// Run `ami mod update`.
pub fn update(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let report = ctx
        .resolver(ctx.paths()?)
        .update()
        .context("updating workspace dependencies")?;

    if ctx.json {
        let resolved: Vec<_> = report
            .resolved
            .iter()
            .map(|r| json!({ "target": r.target, "version": r.version, "dest": r.dest }))
            .collect();
        writeln!(
            out,
            "{}",
            json!({ "resolved": resolved, "skipped": report.skipped })
        )?;
        return Ok(());
    }

    if report.resolved.is_empty() {
        writeln!(out, "No dependencies to resolve.")?;
    } else {
        writeln!(out, "Resolved {} dependencies:", report.resolved.len())?;
        for r in &report.resolved {
            let version = r.version.as_deref().unwrap_or("local");
            writeln!(out, "  {} {} -> {}", r.target, version, r.dest.display())?;
        }
    }
    Ok(())
}

/// Run `ami mod verify`.
pub fn verify(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let report = ctx.resolver(ctx.paths()?).verify()?;

    if ctx.json {
        let verified: Vec<_> = report
            .verified
            .iter()
            .map(|e| format!("{}@{}", e.name, e.version))
            .collect();
        writeln!(
            out,
            "{}",
            json!({ "verified": verified, "manifestPackages": report.manifest_packages })
        )?;
    } else {
        for e in &report.verified {
            writeln!(out, "  ok {}@{}", e.name, e.version)?;
        }
        writeln!(out, "Verified {} packages.", report.verified.len())?;
    }
    Ok(())
}

/// Run `ami mod list`.
pub fn list(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let cache = ctx.cache()?;
    let entries = cache.list().context("listing package cache")?;
    if ctx.json {
        writeln!(
            out,
            "{}",
            json!({ "root": cache.root(), "entries": entries })
        )?;
    } else if entries.is_empty() {
        writeln!(out, "Cache is empty: {}", cache.root().display())?;
    } else {
        for entry in &entries {
            writeln!(out, "{entry}")?;
        }
    }
    Ok(())
}

/// Run `ami mod clean`.
pub fn clean(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let cache = ctx.cache()?;
    let removed = cache.clean().context("cleaning package cache")?;
    if ctx.json {
        writeln!(
            out,
            "{}",
            json!({ "root": cache.root(), "removed": removed })
        )?;
    } else {
        writeln!(out, "Removed {removed} entries from {}", cache.root().display())?;
    }
    Ok(())
}

/// Run `ami mod audit`.
pub fn audit(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let paths = ctx.paths()?;
    let workspace = Workspace::load(&paths.workspace_root)?;
    let report = ami_mod::audit(&workspace, &paths, ctx.vcs.as_ref())?;
    if ctx.json {
        writeln!(out, "{}", serde_json::to_string(&report)?)?;
    } else {
        write!(out, "{}", format_report(&report))?;
    }
    Ok(())
}

/// Run `ami mod path`.
pub fn path(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let cache = ctx.cache()?;
    if ctx.json {
        writeln!(out, "{}", json!({ "root": cache.root() }))?;
    } else {
        writeln!(out, "{}", cache.root().display())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ami_mod::{ErrorKind, ModError};
    use serial_test::serial;

    /// Points the cache at a temp dir for the duration of a test.
    struct CacheEnv {
        dir: tempfile::TempDir,
    }

    impl CacheEnv {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::env::set_var("AMI_PACKAGE_CACHE", dir.path());
            CacheEnv { dir }
        }
    }

    impl Drop for CacheEnv {
        fn drop(&mut self) {
            std::env::remove_var("AMI_PACKAGE_CACHE");
        }
    }

    fn output(f: impl FnOnce(&mut dyn Write) -> Result<()>) -> String {
        let mut buf = Vec::<u8>::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    #[serial]
    fn path_list_and_clean() {
        let env = CacheEnv::new();
        std::fs::create_dir_all(env.dir.path().join("repo@v1.0.0")).unwrap();
        let ctx = Context::new(env.dir.path().to_path_buf(), None, false);

        assert_eq!(
            output(|o| path(&ctx, o)).trim(),
            env.dir.path().display().to_string()
        );
        assert_eq!(output(|o| list(&ctx, o)), "repo@v1.0.0\n");
        assert!(output(|o| clean(&ctx, o)).starts_with("Removed 1 entries"));
        assert!(output(|o| list(&ctx, o)).starts_with("Cache is empty"));
    }

    #[test]
    #[serial]
    fn json_list() {
        let env = CacheEnv::new();
        std::fs::create_dir_all(env.dir.path().join("lib@local")).unwrap();
        let ctx = Context::new(env.dir.path().to_path_buf(), None, true);

        let value: serde_json::Value = serde_json::from_str(&output(|o| list(&ctx, o))).unwrap();
        assert_eq!(value["entries"], json!(["lib@local"]));
    }

    #[test]
    #[serial]
    fn get_copies_declared_local_import() {
        let env = CacheEnv::new();
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(
            ws.path().join("ami.workspace"),
            "packages:\n  - main:\n      import:\n        - ./lib\n",
        )
        .unwrap();
        std::fs::create_dir_all(ws.path().join("lib")).unwrap();
        std::fs::write(ws.path().join("lib/a.ami"), "").unwrap();
        let ctx = Context::new(ws.path().to_path_buf(), None, false);

        let text = output(|o| get(&ctx, "./lib", o));
        assert!(text.starts_with("Copied ./lib"));
        assert!(env.dir.path().join("lib@local/a.ami").exists());
    }

    #[test]
    #[serial]
    fn update_with_explicit_workspace_from_unrelated_dir() {
        let env = CacheEnv::new();
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(
            ws.path().join("ami.workspace"),
            "packages:\n  - main:\n      import:\n        - ./lib\n",
        )
        .unwrap();
        std::fs::create_dir_all(ws.path().join("lib")).unwrap();
        std::fs::write(ws.path().join("lib/a.ami"), "").unwrap();

        let elsewhere = tempfile::tempdir().unwrap();
        let ctx = Context::new(
            elsewhere.path().to_path_buf(),
            Some(ws.path().to_path_buf()),
            false,
        );
        let text = output(|o| update(&ctx, o));
        assert!(text.starts_with("Resolved 1 dependencies:"), "{text}");
        assert!(env.dir.path().join("lib@local/a.ami").exists());
    }

    #[test]
    #[serial]
    fn verify_empty_workspace_and_missing_workspace() {
        let _env = CacheEnv::new();
        let ws = tempfile::tempdir().unwrap();
        std::fs::write(ws.path().join("ami.workspace"), "packages: []\n").unwrap();

        let ctx = Context::new(ws.path().to_path_buf(), None, false);
        assert!(output(|o| verify(&ctx, o)).contains("Verified 0 packages."));
        assert!(output(|o| audit(&ctx, o)).contains("requirements: 0"));

        let elsewhere = tempfile::tempdir().unwrap();
        let ctx = Context::new(elsewhere.path().to_path_buf(), None, false);
        let err = update(&ctx, &mut Vec::<u8>::new()).unwrap_err();
        let kind = err
            .chain()
            .find_map(|c| c.downcast_ref::<ModError>())
            .map(ModError::kind);
        assert_eq!(kind, Some(ErrorKind::User));
    }
}
