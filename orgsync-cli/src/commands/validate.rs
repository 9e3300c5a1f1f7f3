//! `orgsync validate`: reconcile without touching anything.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use orgsync_core::{DriftRecord, ReconciledOrganization};
use orgsync_reconcile::pipeline;

use super::{print_findings, SourceArgs};

/// Arguments for `orgsync validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationJson<'a> {
    valid: bool,
    errors: Vec<&'a DriftRecord>,
    warnings: Vec<&'a DriftRecord>,
    organization: &'a ReconciledOrganization,
}

impl ValidateArgs {
    pub fn run(self) -> Result<()> {
        let session = self.source.open()?;
        let options = self.source.options(&session, true)?;
        let result = pipeline::validate(session.collaborators(), &options).context("validation failed")?;

        let errors: Vec<&DriftRecord> = result.errors().collect();
        if self.json {
            let payload = ValidationJson {
                valid: errors.is_empty(),
                errors: errors.clone(),
                warnings: result.warnings().collect(),
                organization: &result.organization,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize validation JSON")?
            );
        } else {
            print_findings("Findings", &result.findings);
            println!(
                "{} accounts, {} organizational units reconciled",
                result.organization.accounts.len(),
                result.organization.organizational_units.len()
            );
        }

        if !errors.is_empty() {
            bail!("{} fatal finding(s)", errors.len());
        }
        Ok(())
    }
}
