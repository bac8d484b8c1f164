//! AMI CLI: module management front end.

mod commands;

use std::path::PathBuf;
use std::process;

use ami_mod::ModError;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ami", version, about = "The AMI toolchain")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Emit machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage workspace dependencies
    Mod {
        /// Workspace root (default: nearest ami.workspace above the current directory)
        #[arg(long, global = true)]
        workspace: Option<PathBuf>,
        #[command(subcommand)]
        action: ModAction,
    },
}

#[derive(Subcommand)]
enum ModAction {
    /// Fetch a package by spec (./path, git+ssh://host/org/repo#vX.Y.Z)
    Get {
        /// Package spec
        spec: String,
    },
    /// Resolve every import declared in ami.workspace
    Update,
    /// Verify ami.sum against the cache and ami.manifest
    Verify,
    /// List cached packages
    List,
    /// Remove every cached package
    Clean,
    /// Report requirements missing from ami.sum or the cache
    Audit,
    /// Print the package cache root
    Path,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json = cli.json;
    if let Err(e) = run(cli) {
        if json {
            let kind = find_mod_error(&e).map(|m| m.kind().label());
            println!(
                "{}",
                serde_json::json!({ "error": format!("{e:#}"), "kind": kind })
            );
        }
        eprintln!("error: {e:#}");
        process::exit(exit_code(&e));
    }
}

/// `RUST_LOG` wins; otherwise warn, info with -v, debug with -vv.
fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Mod { workspace, action } => {
            let ctx = commands::module::Context::new(cwd, workspace, cli.json);
            debug!(cwd = %ctx.cwd.display(), "mod command");
            match action {
                ModAction::Get { spec } => commands::module::get(&ctx, &spec, &mut out),
                ModAction::Update => commands::module::update(&ctx, &mut out),
                ModAction::Verify => commands::module::verify(&ctx, &mut out),
                ModAction::List => commands::module::list(&ctx, &mut out),
                ModAction::Clean => commands::module::clean(&ctx, &mut out),
                ModAction::Audit => commands::module::audit(&ctx, &mut out),
                ModAction::Path => commands::module::path(&ctx, &mut out),
            }
        }
    }
}

fn find_mod_error(e: &anyhow::Error) -> Option<&ModError> {
    e.chain().find_map(|cause| cause.downcast_ref::<ModError>())
}

/// Exit status for a failed command: the error class, or 1 when the
/// failure did not come from the module manager.
fn exit_code(e: &anyhow::Error) -> i32 {
    find_mod_error(e)
        .map(|m| m.kind().exit_code())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn exit_code_follows_error_kind_through_context() {
        let err = Err::<(), _>(ModError::NoCacheRoot)
            .context("listing cache")
            .unwrap_err();
        assert_eq!(exit_code(&err), 4);

        let err = Err::<(), _>(ModError::InvalidConstraint("x".to_string()))
            .context("updating")
            .unwrap_err();
        assert_eq!(exit_code(&err), 1);

        assert_eq!(exit_code(&anyhow::anyhow!("plain failure")), 1);
    }

    #[test]
    fn cli_parses_mod_subcommands() {
        let cli = Cli::try_parse_from(["ami", "-vv", "mod", "--workspace", "/w", "get", "./lib"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Mod { workspace, action } = cli.command;
        assert_eq!(workspace, Some(PathBuf::from("/w")));
        assert!(matches!(action, ModAction::Get { spec } if spec == "./lib"));

        let cli = Cli::try_parse_from(["ami", "mod", "verify", "--json"]).unwrap();
        assert!(cli.json);
        assert!(Cli::try_parse_from(["ami", "mod", "publish"]).is_err());
    }
}
