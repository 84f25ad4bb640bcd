//! `orbit` command-line front end.
//!
//! # Responsibility
//! - Load a JSON state file, run one engine operation, print a JSON result.
//! - Persist the mutated state only when `--write` is given.
//!
//! # Invariants
//! - Output on stdout is always a single JSON document.
//! - A rejected operation exits non-zero and leaves the file untouched.

mod commands;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use commands::EntityRef;
use orbit_core::LockKind;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "orbit: hierarchy engine for domains, projects, and tasks",
    long_about = None
)]
struct Cli {
    /// JSON engine configuration (allowed edges, limits).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level: trace|debug|info|warn|error.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Absolute directory for rolling log files; stderr when omitted.
    #[arg(long, global = true)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Shared state-file arguments.
#[derive(Args, Debug, Clone)]
struct StateArgs {
    /// Path to the JSON state file.
    state: PathBuf,

    /// Write the updated state back to the file.
    #[arg(long)]
    write: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Survey legacy data before migrating.
    Analyze {
        /// Path to the JSON state file.
        state: PathBuf,
    },
    /// Show what a migration would change.
    Preview {
        /// Path to the JSON state file.
        state: PathBuf,
    },
    /// Report every structural defect.
    Validate {
        /// Path to the JSON state file.
        state: PathBuf,
    },
    /// Validate, then apply conservative repairs.
    Fix(StateArgs),
    /// Upgrade legacy pointers to relational links.
    Migrate {
        #[command(flatten)]
        target: StateArgs,
        /// Run against a copy and report only.
        #[arg(long)]
        dry_run: bool,
        /// Clear relational fields before migrating.
        #[arg(long)]
        clear_existing: bool,
        /// Skip restoring links from legacy pointers.
        #[arg(long)]
        no_restore: bool,
        /// Skip the validation pass.
        #[arg(long)]
        no_validate: bool,
    },
    /// Remove relational fields added by a migration.
    Rollback(StateArgs),
    /// Link a child under a parent, e.g. `--parent domain:d1 --child project:p1`.
    Attach {
        #[command(flatten)]
        target: StateArgs,
        #[arg(long)]
        parent: EntityRef,
        #[arg(long)]
        child: EntityRef,
    },
    /// Clear a child's parent link.
    Detach {
        #[command(flatten)]
        target: StateArgs,
        #[arg(long)]
        child: EntityRef,
    },
    /// Re-parent a child atomically.
    Move {
        #[command(flatten)]
        target: StateArgs,
        #[arg(long)]
        to: EntityRef,
        #[arg(long)]
        child: EntityRef,
    },
    /// Set or clear a lock on one or more ids.
    Lock {
        #[command(flatten)]
        target: StateArgs,
        /// Lock class: move|hierarchy.
        #[arg(long, value_parser = parse_lock_kind)]
        kind: LockKind,
        /// Clear the lock instead of setting it.
        #[arg(long)]
        unlock: bool,
        /// Entity ids.
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
    /// Count locked entities by class and type.
    LockStats {
        /// Path to the JSON state file.
        state: PathBuf,
    },
}

impl Command {
    /// Subcommand name as typed on the command line.
    fn name(&self) -> &'static str {
        match self {
            Self::Analyze { .. } => "analyze",
            Self::Preview { .. } => "preview",
            Self::Validate { .. } => "validate",
            Self::Fix(_) => "fix",
            Self::Migrate { .. } => "migrate",
            Self::Rollback(_) => "rollback",
            Self::Attach { .. } => "attach",
            Self::Detach { .. } => "detach",
            Self::Move { .. } => "move",
            Self::Lock { .. } => "lock",
            Self::LockStats { .. } => "lock-stats",
        }
    }
}

fn parse_lock_kind(value: &str) -> Result<LockKind, String> {
    LockKind::parse(value).ok_or_else(|| format!("unknown lock kind `{value}`; expected move|hierarchy"))
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    orbit_core::init_logging(&cli.log_level, cli.log_dir.as_deref())
        .context("failed to initialize logging")?;

    let engine = commands::load_engine(cli.config.as_deref())?;
    let outcome = commands::run(&engine, cli.command)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome.body).context("failed to render output")?
    );
    Ok(if outcome.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
