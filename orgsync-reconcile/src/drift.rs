//! Drift detection and correction.
//!
//! Configuration-side drift (renamed accounts, suspended accounts, renamed OUs) is written
//! back into the [`ConfigWorkspace`]. Structural drift (missing OUs, suspended accounts out of
//! place, the primary account under the root) is corrected against the live organization.

use tracing::{debug, info, warn};

use orgsync_core::{
    path, AccountId, AccountPatch, ConfigWorkspace, Configuration, DriftKind, DriftRecord,
    LegacyAccountType, LiveAccount, LiveOu,
};

use crate::clients::{ClientError, OrganizationDirectory, PublishedState};
use crate::error::ReconcileError;
use crate::matcher::{match_account, match_ou, OuMatch};
use crate::tree::OrgTree;

/// Outcome of [`DriftCorrector::converge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionReport {
    pub created: Vec<LiveOu>,
    /// Account id and the OU path it was moved to.
    pub moved: Vec<(AccountId, String)>,
    /// Failures other than the no-op class. They never stop the remaining work.
    pub failures: Vec<String>,
    pub drift: Vec<DriftRecord>,
}

impl CorrectionReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.moved.is_empty() && self.failures.is_empty()
    }
}

/// The declared primary account when the organization still keeps it directly under the root.
pub fn root_primary<'c>(config: &'c Configuration, tree: &OrgTree) -> Option<(&'c str, LiveAccount)> {
    let declared = config
        .accounts()
        .find(|a| a.config.landing_zone_account_type == Some(LegacyAccountType::Primary))?;
    let live = match_account(&declared.config.email, tree.root_accounts())?;
    Some((declared.key, live.clone()))
}

pub struct DriftCorrector<'a> {
    directory: &'a dyn OrganizationDirectory,
}

impl<'a> DriftCorrector<'a> {
    pub fn new(directory: &'a dyn OrganizationDirectory) -> Self {
        Self { directory }
    }

    // -----------------------------------------------------------------------
    // Configuration drift
    // -----------------------------------------------------------------------

    /// Rewrite the configuration to follow renames and suspensions observed since the last
    /// published state. Only changes produce drift records.
    pub fn detect_config_drift(
        &self,
        workspace: &mut ConfigWorkspace,
        tree: &OrgTree,
        previous: Option<&PublishedState>,
    ) -> Result<Vec<DriftRecord>, ReconcileError> {
        let mut drift = Vec::new();
        if let Some(previous) = previous {
            renamed_accounts(workspace, tree, previous, &mut drift);
        }
        suspended_accounts(workspace, tree, &mut drift);
        if let Some(previous) = previous {
            renamed_ous(workspace, tree, previous, &mut drift)?;
        }
        if !drift.is_empty() {
            info!(records = drift.len(), "configuration drift corrected");
        }
        Ok(drift)
    }

    // -----------------------------------------------------------------------
    // Structural convergence
    // -----------------------------------------------------------------------

    /// Bring the live hierarchy in line with the configuration, best effort. `tree` is kept
    /// in step with every successful mutation.
    pub fn converge(&self, config: &Configuration, tree: &mut OrgTree) -> CorrectionReport {
        let mut report = CorrectionReport::default();
        self.create_missing_ous(config, tree, &mut report);
        self.relocate_suspended(config, tree, &mut report);
        self.relocate_root_primary(config, tree, &mut report);
        info!(
            created = report.created.len(),
            moved = report.moved.len(),
            failures = report.failures.len(),
            "structural convergence complete"
        );
        report
    }

    fn create_missing_ous(&self, config: &Configuration, tree: &mut OrgTree, report: &mut CorrectionReport) {
        let options = &config.global_options;
        for declared in config.declared_ou_paths() {
            if options.is_ignored(path::top_level(&declared)) {
                continue;
            }
            if !matches!(match_ou(&declared, tree.organizational_units()), OuMatch::NotFound) {
                continue;
            }
            for prefix in path::prefixes(&declared) {
                if tree.ou_by_path(&prefix).is_some() {
                    continue;
                }
                match self.create_ou(&prefix, tree) {
                    Ok(Some(created)) => {
                        report.drift.push(DriftRecord::warning(
                            DriftKind::MissingOu,
                            &declared,
                            format!("Created organizational unit \"{}\"", created.path),
                        ));
                        report.created.push(created);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(ou = %prefix, error = %e, "organizational unit creation failed");
                        report.failures.push(e.to_string());
                        break;
                    }
                }
            }
        }
    }

    /// Create the OU at `ou_path` under its (existing) parent. `Ok(None)` when the directory
    /// reports the OU as already present.
    fn create_ou(&self, ou_path: &str, tree: &mut OrgTree) -> Result<Option<LiveOu>, ClientError> {
        let name = path::leaf(ou_path);
        let parent_id = match ou_path.rsplit_once(path::SEPARATOR) {
            Some((parent, _)) => match tree.ou_by_path(parent) {
                Some(ou) => ou.id.0.clone(),
                None => return Err(ClientError::not_found("create_organizational_unit", parent)),
            },
            None => tree.root_id.clone(),
        };
        match self.directory.create_organizational_unit(name, &parent_id) {
            Ok(node) => {
                debug!(ou = ou_path, id = %node.id, "created organizational unit");
                Ok(Some(tree.insert_ou(node.id, &node.name, &node.parent_id).clone()))
            }
            Err(e) if e.is_no_op() => {
                debug!(ou = ou_path, "organizational unit already present");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn relocate_suspended(&self, config: &Configuration, tree: &mut OrgTree, report: &mut CorrectionReport) {
        let suspended_ou = config.global_options.suspended_ou();
        let out_of_place: Vec<LiveAccount> = tree
            .accounts()
            .filter(|a| a.is_suspended() && tree.parent_path(a) != Some(suspended_ou))
            .cloned()
            .collect();
        if out_of_place.is_empty() {
            return;
        }

        let target_id = match tree.ou_by_path(suspended_ou) {
            Some(ou) => ou.id.0.clone(),
            None => match self.create_ou(suspended_ou, tree) {
                Ok(Some(created)) => {
                    let id = created.id.0.clone();
                    report.created.push(created);
                    id
                }
                Ok(None) => match OrgTree::read(self.directory)
                    .ok()
                    .and_then(|fresh| fresh.ou_by_path(suspended_ou).map(|o| o.id.0.clone()))
                {
                    Some(id) => id,
                    None => {
                        report
                            .failures
                            .push(format!("cannot locate organizational unit \"{suspended_ou}\""));
                        return;
                    }
                },
                Err(e) => {
                    report.failures.push(e.to_string());
                    return;
                }
            },
        };

        for account in out_of_place {
            if self.move_account(&account, &target_id, suspended_ou, tree, report) {
                report.drift.push(DriftRecord::warning(
                    DriftKind::SuspendedAccount,
                    &account.id.0,
                    format!(
                        "Moved suspended account \"{}\" ({}) to \"{suspended_ou}\"",
                        account.name, account.id
                    ),
                ));
            }
        }
    }

    fn relocate_root_primary(&self, config: &Configuration, tree: &mut OrgTree, report: &mut CorrectionReport) {
        let Some((key, live)) = root_primary(config, tree) else {
            return;
        };
        let Some(declared) = config.account(key) else {
            return;
        };
        let ou_path = declared.config.effective_ou_path();
        let Some(target) = match_ou(ou_path, tree.organizational_units()).found() else {
            report
                .failures
                .push(format!("cannot move primary account \"{key}\": organizational unit \"{ou_path}\" not found"));
            return;
        };
        let (target_id, target_path) = (target.id.0.clone(), target.path.clone());
        if self.move_account(&live, &target_id, &target_path, tree, report) {
            report.drift.push(DriftRecord::warning(
                DriftKind::OuMembershipMismatch,
                key,
                format!("Moved primary account \"{}\" from the root to \"{target_path}\"", live.name),
            ));
        }
    }

    /// Returns whether the account actually moved.
    fn move_account(
        &self,
        account: &LiveAccount,
        to_id: &str,
        to_path: &str,
        tree: &mut OrgTree,
        report: &mut CorrectionReport,
    ) -> bool {
        match self.directory.move_account(&account.id, &account.parent_id, to_id) {
            Ok(()) => {
                debug!(account = %account.id, to = to_path, "moved account");
                tree.relocate_account(&account.id, to_id);
                report.moved.push((account.id.clone(), to_path.to_string()));
                true
            }
            Err(e) if e.is_no_op() => false,
            Err(e) => {
                warn!(account = %account.id, error = %e, "account move failed");
                report.failures.push(e.to_string());
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration drift steps
// ---------------------------------------------------------------------------

fn renamed_accounts(
    workspace: &mut ConfigWorkspace,
    tree: &OrgTree,
    previous: &PublishedState,
    drift: &mut Vec<DriftRecord>,
) {
    for before in &previous.accounts {
        let Some(id) = &before.cloud_id else { continue };
        let Some(live) = tree.account_by_id(id) else { continue };
        if live.is_suspended() {
            continue;
        }
        // The primary account keeps its configured name whatever the organization calls it.
        let primary = before.legacy_account_type == Some(LegacyAccountType::Primary);
        let renamed = !primary && live.name != before.name;
        if !renamed && live.email.eq_ignore_ascii_case(&before.email) {
            continue;
        }
        let patch = AccountPatch {
            name: renamed.then(|| live.name.clone()),
            email: Some(live.email.clone()),
            ..AccountPatch::default()
        };
        if workspace.update_account(&before.key.0, &patch) {
            drift.push(DriftRecord::warning(
                DriftKind::RenamedAccount,
                &before.key.0,
                format!(
                    "Account \"{}\" ({id}) was renamed from \"{}\" <{}> to \"{}\" <{}>",
                    before.key, before.name, before.email, live.name, live.email
                ),
            ));
        }
    }
}

fn suspended_accounts(workspace: &mut ConfigWorkspace, tree: &OrgTree, drift: &mut Vec<DriftRecord>) {
    let config = workspace.merged();
    for live in tree.accounts().filter(|a| a.is_suspended()) {
        let Some(declared) = config.account_by_email(&live.email) else {
            continue;
        };
        let patch = AccountPatch {
            name: Some(live.name.clone()),
            email: Some(live.email.clone()),
            deleted: Some(true),
            ..AccountPatch::default()
        };
        if workspace.update_account(declared.key, &patch) {
            drift.push(DriftRecord::warning(
                DriftKind::SuspendedAccount,
                declared.key,
                format!(
                    "Account \"{}\" ({}) is suspended and was marked deleted in the configuration",
                    declared.key, live.id
                ),
            ));
        }
    }
}

fn renamed_ous(
    workspace: &mut ConfigWorkspace,
    tree: &OrgTree,
    previous: &PublishedState,
    drift: &mut Vec<DriftRecord>,
) -> Result<(), ReconcileError> {
    let mut recorded: Vec<_> = previous.organizational_units.iter().collect();
    recorded.sort_by_key(|ou| path::segments(&ou.path).count());

    for before in recorded {
        let Some(live) = tree.ou_by_id(&before.id) else { continue };
        if live.path == before.path {
            continue;
        }
        let renamed_key = if before.logical_key == before.path {
            live.path.clone()
        } else if before.logical_key == before.name {
            live.name.clone()
        } else {
            continue;
        };
        if workspace.rename_ou(&before.logical_key, &renamed_key)? {
            drift.push(DriftRecord::warning(
                DriftKind::RenamedOu,
                &before.logical_key,
                format!(
                    "Organizational unit {} moved from \"{}\" to \"{}\"",
                    before.id, before.path, live.path
                ),
            ));
        }
    }
    Ok(())
}
