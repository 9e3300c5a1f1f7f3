//! Reconciliation pipeline entrypoints used by the CLI.
//!
//! [`run`] loads everything, corrects drift, converges the live hierarchy, enforces the
//! quarantine policy and publishes. [`validate`] only loads and reconciles.

use tracing::{info, warn};

use orgsync_core::{
    ConfigError, ConfigWorkspace, DriftKind, DriftRecord, FileChange, LegacyConfig,
    ReconciledOrganization,
};

use crate::clients::{OrganizationDirectory, PolicyClient, PublishedState, SourceControl, StateStore};
use crate::drift::{root_primary, CorrectionReport, DriftCorrector};
use crate::engine::{duplicate_emails, Reconciliation, ReconciliationEngine};
use crate::error::ReconcileError;
use crate::guardian::{GuardPlan, GuardReport, PolicyGuardian};
use crate::publisher::{PublishOutcome, ResultPublisher};
use crate::tree::OrgTree;

/// Everything the pipeline talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub directory: &'a dyn OrganizationDirectory,
    pub policies: &'a dyn PolicyClient,
    pub source: &'a dyn SourceControl,
    pub state: &'a dyn StateStore,
}

/// Where the configuration lives: repository, branch and commit, plus the root file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub repository: String,
    pub branch: String,
    pub commit_id: String,
    pub root_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub location: ConfigLocation,
    /// Legacy bootstrap manifest, read from the same commit.
    pub legacy_path: Option<String>,
    /// Compute everything but skip the commit and the publish.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub organization: ReconciledOrganization,
    /// Configuration rewrites and structural corrections, in the order they happened.
    pub drift: Vec<DriftRecord>,
    /// Warnings of the final reconciliation pass.
    pub warnings: Vec<DriftRecord>,
    pub corrections: CorrectionReport,
    pub plan: GuardPlan,
    pub guard: GuardReport,
    pub changes: Vec<FileChange>,
    pub outcome: Option<PublishOutcome>,
    pub published: Option<PublishedState>,
}

impl RunReport {
    /// Platform mutations that changed something.
    pub fn mutations(&self) -> usize {
        self.corrections.created.len() + self.corrections.moved.len() + self.guard.mutations()
    }
}

struct Loaded {
    workspace: ConfigWorkspace,
    legacy: Option<LegacyConfig>,
    tree: OrgTree,
    previous: Option<PublishedState>,
}

fn load(collaborators: Collaborators<'_>, options: &RunOptions) -> Result<Loaded, ReconcileError> {
    let location = &options.location;
    let fetch = |path: &str| {
        collaborators
            .source
            .get_file(&location.repository, path, &location.commit_id)
            .map_err(|e| ConfigError::Fetch {
                path: path.to_string(),
                message: e.to_string(),
            })
    };

    let workspace = ConfigWorkspace::load_with(&location.root_path, fetch)?;
    let legacy = match &options.legacy_path {
        Some(path) => Some(LegacyConfig::parse(path, &fetch(path)?)?),
        None => None,
    };
    let tree = OrgTree::read(collaborators.directory)?;
    let previous = collaborators.state.load_previous()?;
    info!(
        root = %location.root_path,
        commit = %location.commit_id,
        legacy = legacy.is_some(),
        previous = previous.is_some(),
        "inputs loaded"
    );
    Ok(Loaded {
        workspace,
        legacy,
        tree,
        previous,
    })
}

/// Load and reconcile without touching anything.
pub fn validate(collaborators: Collaborators<'_>, options: &RunOptions) -> Result<Reconciliation, ReconcileError> {
    let loaded = load(collaborators, options)?;
    let config = loaded.workspace.merged();
    Ok(ReconciliationEngine::new(&config, &loaded.tree)
        .with_legacy(loaded.legacy.as_ref())
        .with_previous(loaded.previous.as_ref())
        .with_policies(collaborators.policies)
        .run())
}

/// The full reconciliation run.
pub fn run(collaborators: Collaborators<'_>, options: &RunOptions) -> Result<RunReport, ReconcileError> {
    let Loaded {
        mut workspace,
        legacy,
        mut tree,
        previous,
    } = load(collaborators, options)?;

    let duplicates = duplicate_emails(&workspace.merged());
    if !duplicates.is_empty() {
        return Err(validation_error(duplicates.iter()));
    }

    let corrector = DriftCorrector::new(collaborators.directory);
    let mut report = RunReport {
        drift: corrector.detect_config_drift(&mut workspace, &tree, previous.as_ref())?,
        ..RunReport::default()
    };
    let config = workspace.merged();

    // Gate: only findings convergence can fix may pass.
    let first = ReconciliationEngine::new(&config, &tree)
        .with_legacy(legacy.as_ref())
        .with_previous(previous.as_ref())
        .with_policies(collaborators.policies)
        .run();
    let primary_key = root_primary(&config, &tree).map(|(key, _)| key);
    let blocking: Vec<&DriftRecord> = first
        .errors()
        .filter(|e| !correctable(e, primary_key))
        .collect();
    if !blocking.is_empty() {
        return Err(validation_error(blocking.into_iter()));
    }

    let guardian = PolicyGuardian::new(collaborators.policies, &config);
    let quarantine = guardian.quarantine_policy()?;

    let corrections = corrector.converge(&config, &mut tree);
    for failure in &corrections.failures {
        warn!(failure = %failure, "correction failed");
    }
    report.drift.extend(corrections.drift.iter().cloned());
    report.corrections = corrections;
    tree = OrgTree::read(collaborators.directory)?;

    let second = ReconciliationEngine::new(&config, &tree)
        .with_legacy(legacy.as_ref())
        .with_previous(previous.as_ref())
        .with_policies(collaborators.policies)
        .run();
    report.warnings = second.warnings().cloned().collect();
    report.organization = second.into_result()?;

    report.plan = GuardPlan::compute(&config, &tree);
    report.guard = guardian.enforce_with(&quarantine, &report.plan)?;

    report.changes = workspace.changes()?;
    if options.dry_run {
        info!(changes = report.changes.len(), "dry run: nothing committed or published");
        return Ok(report);
    }

    let publisher = ResultPublisher::new(collaborators.source, collaborators.state);
    let message = format!("orgsync: {} configuration correction(s)", report.drift.len());
    let outcome = publisher.commit(&options.location, &report.changes, &message)?;
    report.published = Some(publisher.publish(&report.organization, outcome.commit_id())?);
    report.outcome = Some(outcome);
    Ok(report)
}

/// Fatal findings structural convergence resolves: a missing OU, and the primary account
/// still sitting under the root.
fn correctable(finding: &DriftRecord, root_primary_key: Option<&str>) -> bool {
    match finding.kind {
        DriftKind::MissingOu => true,
        DriftKind::OuMembershipMismatch => root_primary_key == Some(finding.subject_key.as_str()),
        _ => false,
    }
}

fn validation_error<'r>(findings: impl Iterator<Item = &'r DriftRecord>) -> ReconcileError {
    ReconcileError::Validation {
        messages: findings.map(|f| f.message.clone()).collect(),
    }
}
