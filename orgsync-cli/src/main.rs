//! orgsync: organization reconciliation and drift correction.
//!
//! # Usage
//!
//! ```text
//! orgsync validate --config <dir> --org <snapshot.yaml> [--root config.yaml] [--legacy <file>] [--json]
//! orgsync plan     --config <dir> --org <snapshot.yaml> [--root ...] [--legacy ...]
//! orgsync apply    --config <dir> --org <snapshot.yaml> [--root ...] [--legacy ...] [--name <org>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{apply::ApplyArgs, plan::PlanArgs, validate::ValidateArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "orgsync",
    version,
    about = "Reconcile a declarative organization configuration with the live organization",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check configuration against the organization without changing anything.
    Validate(ValidateArgs),

    /// Show the drift corrections, platform calls and configuration diffs a run would make.
    Plan(PlanArgs),

    /// Correct drift, enforce the quarantine policy, commit and publish.
    Apply(ApplyArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Validate(args) => args.run(),
        Commands::Plan(args) => args.run(),
        Commands::Apply(args) => args.run(),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
