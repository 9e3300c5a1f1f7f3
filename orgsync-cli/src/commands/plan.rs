//! `orgsync plan`: run the pipeline against an in-memory copy and show what would change.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use orgsync_reconcile::diff::config_diffs;
use orgsync_reconcile::pipeline;

use super::{print_findings, SourceArgs};

/// Arguments for `orgsync plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

impl PlanArgs {
    pub fn run(self) -> Result<()> {
        let session = self.source.open()?;
        let options = self.source.options(&session, true)?;
        let report = pipeline::run(session.collaborators(), &options).context("plan failed")?;

        print_findings("Drift", &report.drift);
        print_findings("Warnings", &report.warnings);

        let calls = session.org.calls();
        if calls.is_empty() {
            println!("Platform calls: none");
        } else {
            println!("{}", "Platform calls".bold());
            for call in &calls {
                println!("  {call}");
            }
        }
        for failure in report.corrections.failures.iter().chain(&report.guard.failures) {
            println!("  {} {failure}", "failed:".red());
        }

        let diffs = config_diffs(&report.changes);
        if diffs.is_empty() {
            println!("No configuration changes.");
        }
        for diff in diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }
        Ok(())
    }
}
