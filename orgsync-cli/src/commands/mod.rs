//! Subcommands and the inputs they share.

pub mod apply;
pub mod plan;
pub mod validate;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use orgsync_core::{DriftRecord, Severity};
use orgsync_reconcile::pipeline::{Collaborators, ConfigLocation, RunOptions};
use orgsync_reconcile::{FileStateStore, InMemoryOrganization, LocalRepository};

/// Where the configuration, the organization snapshot and the legacy manifest live.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Configuration repository directory.
    #[arg(long, default_value = ".")]
    pub config: PathBuf,

    /// Organization snapshot (YAML).
    #[arg(long)]
    pub org: PathBuf,

    /// Root configuration file, relative to `--config`.
    #[arg(long, default_value = "config.yaml")]
    pub root: String,

    /// Legacy bootstrap manifest, relative to `--config`.
    #[arg(long)]
    pub legacy: Option<String>,

    /// Organization name keying the published state under `~/.orgsync/state/`.
    #[arg(long, default_value = "default")]
    pub name: String,
}

/// Collaborators opened from [`SourceArgs`].
pub struct Session {
    pub org: InMemoryOrganization,
    pub repo: LocalRepository,
    pub state: FileStateStore,
}

impl SourceArgs {
    pub fn open(&self) -> Result<Session> {
        let org = InMemoryOrganization::load_at(&self.org)
            .with_context(|| format!("failed to load organization snapshot {}", self.org.display()))?;
        let state = FileStateStore::new(self.name.as_str()).context("could not locate the state directory")?;
        Ok(Session {
            org,
            repo: LocalRepository::new("config", &self.config),
            state,
        })
    }

    pub fn options(&self, session: &Session, dry_run: bool) -> Result<RunOptions> {
        let commit_id = session
            .repo
            .head()
            .with_context(|| format!("failed to read configuration directory {}", self.config.display()))?;
        Ok(RunOptions {
            location: ConfigLocation {
                repository: session.repo.name().to_string(),
                branch: "main".into(),
                commit_id,
                root_path: self.root.clone(),
            },
            legacy_path: self.legacy.clone(),
            dry_run,
        })
    }
}

impl Session {
    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            directory: &self.org,
            policies: &self.org,
            source: &self.repo,
            state: &self.state,
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "severity")]
    severity: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "subject")]
    subject: String,
    #[tabled(rename = "message")]
    message: String,
}

pub fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::Error => "ERROR".red().bold().to_string(),
        Severity::Warning => "WARNING".yellow().bold().to_string(),
    }
}

pub fn print_findings(title: &str, findings: &[DriftRecord]) {
    if findings.is_empty() {
        println!("{title}: none");
        return;
    }
    println!("{}", title.bold());
    let rows: Vec<FindingRow> = findings
        .iter()
        .map(|f| FindingRow {
            severity: severity_label(f.severity),
            kind: f.kind.to_string(),
            subject: f.subject_key.clone(),
            message: f.message.clone(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
