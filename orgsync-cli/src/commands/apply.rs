//! `orgsync apply`: correct drift, enforce quarantine, commit and publish.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use orgsync_reconcile::{pipeline, PublishOutcome};

use super::{print_findings, SourceArgs};

/// Arguments for `orgsync apply`.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

impl ApplyArgs {
    pub fn run(self) -> Result<()> {
        let session = self.source.open()?;
        let options = self.source.options(&session, false)?;
        let result = pipeline::run(session.collaborators(), &options);

        // Mutations already issued stay applied even when the run fails afterwards.
        session
            .org
            .save_at(&self.source.org)
            .with_context(|| format!("failed to save organization snapshot {}", self.source.org.display()))?;
        let report = result.context("apply failed")?;

        print_findings("Drift", &report.drift);
        print_findings("Warnings", &report.warnings);
        println!(
            "{} OUs created, {} accounts moved, {} policies attached, {} detached",
            report.corrections.created.len(),
            report.corrections.moved.len(),
            report.guard.attached.len(),
            report.guard.detached.len(),
        );
        for failure in report.corrections.failures.iter().chain(&report.guard.failures) {
            println!("{} {failure}", "failed:".red());
        }

        match &report.outcome {
            Some(PublishOutcome::Committed { commit_id }) => {
                println!("{} configuration committed ({commit_id})", "✓".green());
            }
            Some(PublishOutcome::Unchanged { .. }) | None => println!("Configuration unchanged."),
        }
        if report.published.is_some() {
            println!("Published state to {}", session.state.path().display());
        }
        Ok(())
    }
}
