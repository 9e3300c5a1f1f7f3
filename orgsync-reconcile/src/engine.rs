//! Cross-validation of configuration, live organization and legacy manifest.
//!
//! The engine never stops at the first problem. It walks every declared OU and account,
//! collects findings in encounter order, and only [`Reconciliation::into_result`] turns the
//! fatal ones into a single error.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use orgsync_core::config::DeclaredAccount;
use orgsync_core::{
    path, Account, AccountId, AccountKey, Configuration, DriftKind, DriftRecord, LegacyAccountType,
    LegacyConfig, LiveOu, MatchStatus, OrganizationalUnit, ReconciledOrganization,
};

use crate::clients::{PolicyClient, PublishedState};
use crate::error::ReconcileError;
use crate::matcher::{match_account, match_ou, OuMatch};
use crate::tree::OrgTree;

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub organization: ReconciledOrganization,
    /// Errors and warnings, in encounter order.
    pub findings: Vec<DriftRecord>,
    pub statuses: Vec<(AccountKey, MatchStatus)>,
}

impl Reconciliation {
    pub fn errors(&self) -> impl Iterator<Item = &DriftRecord> {
        self.findings.iter().filter(|f| f.is_fatal())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DriftRecord> {
        self.findings.iter().filter(|f| !f.is_fatal())
    }

    pub fn has_fatal(&self) -> bool {
        self.findings.iter().any(DriftRecord::is_fatal)
    }

    pub fn status(&self, key: &str) -> MatchStatus {
        self.statuses
            .iter()
            .find(|(k, _)| k.0 == key)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }

    /// The canonical records, or one error carrying every fatal message.
    pub fn into_result(self) -> Result<ReconciledOrganization, ReconcileError> {
        if self.has_fatal() {
            return Err(ReconcileError::Validation {
                messages: self.errors().map(|e| e.message.clone()).collect(),
            });
        }
        Ok(self.organization)
    }
}

/// Fatal findings for declared accounts sharing an email (case-insensitive).
pub fn duplicate_emails(config: &Configuration) -> Vec<DriftRecord> {
    let mut seen: Vec<(String, &str)> = Vec::new();
    let mut records = Vec::new();
    for account in config.accounts() {
        let email = account.config.email.to_ascii_lowercase();
        match seen.iter().find(|(e, _)| *e == email) {
            Some((_, first)) => records.push(DriftRecord::error(
                DriftKind::DuplicateEmail,
                account.key,
                format!(
                    "Accounts \"{first}\" and \"{}\" share the email \"{}\"",
                    account.key, account.config.email
                ),
            )),
            None => seen.push((email, account.key)),
        }
    }
    records
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Service control policies the platform allows on one target.
pub const MAX_POLICIES_PER_TARGET: usize = 5;

pub struct ReconciliationEngine<'a> {
    config: &'a Configuration,
    tree: &'a OrgTree,
    legacy: Option<&'a LegacyConfig>,
    previous: Option<&'a PublishedState>,
    policies: Option<&'a dyn PolicyClient>,
}

#[derive(Default)]
struct Findings {
    records: Vec<DriftRecord>,
    reported_ous: HashSet<String>,
    reported_types: HashSet<LegacyAccountType>,
}

impl Findings {
    fn fatal(&mut self, kind: DriftKind, subject: &str, message: String) {
        debug!(%kind, subject, "fatal finding");
        self.records.push(DriftRecord::error(kind, subject, message));
    }

    fn warning(&mut self, kind: DriftKind, subject: &str, message: String) {
        debug!(%kind, subject, "warning");
        self.records.push(DriftRecord::warning(kind, subject, message));
    }

    fn missing_ou(&mut self, reference: &str) {
        if self.reported_ous.insert(reference.to_string()) {
            self.fatal(
                DriftKind::MissingOu,
                reference,
                format!("Cannot find organizational unit \"{reference}\" that is used by the configuration"),
            );
        }
    }

    fn ambiguous_ou(&mut self, reference: &str, candidates: &[&LiveOu]) {
        if self.reported_ous.insert(reference.to_string()) {
            let paths: Vec<&str> = candidates.iter().map(|o| o.path.as_str()).collect();
            self.fatal(
                DriftKind::AmbiguousOu,
                reference,
                format!(
                    "Organizational unit \"{reference}\" is ambiguous: it matches {}",
                    paths.join(", ")
                ),
            );
        }
    }

    fn missing_legacy_type(&mut self, ty: LegacyAccountType, subject: &str) {
        if self.reported_types.insert(ty) {
            self.fatal(
                DriftKind::MissingLegacyAccount,
                subject,
                format!("Could not find Landing Zone account of type \"{ty}\""),
            );
        }
    }
}

#[derive(Default)]
struct Pass {
    findings: Findings,
    accounts: Vec<Account>,
    organizational_units: Vec<OrganizationalUnit>,
    statuses: Vec<(AccountKey, MatchStatus)>,
}

impl Pass {
    fn status(&mut self, key: &str, status: MatchStatus) {
        self.statuses.push((AccountKey::from(key), status));
    }
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(config: &'a Configuration, tree: &'a OrgTree) -> Self {
        Self {
            config,
            tree,
            legacy: None,
            previous: None,
            policies: None,
        }
    }

    pub fn with_legacy(mut self, legacy: Option<&'a LegacyConfig>) -> Self {
        self.legacy = legacy;
        self
    }

    pub fn with_previous(mut self, previous: Option<&'a PublishedState>) -> Self {
        self.previous = previous;
        self
    }

    /// Enables the per-target policy limit check.
    pub fn with_policies(mut self, policies: &'a dyn PolicyClient) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn run(&self) -> Reconciliation {
        let mut pass = Pass::default();
        pass.findings.records.extend(duplicate_emails(self.config));
        self.reconcile_ous(&mut pass);
        self.reconcile_accounts(&mut pass);
        if let Some(policies) = self.policies {
            self.check_policy_limits(policies, &mut pass);
        }
        self.report_unmanaged(&mut pass);
        if let Some(legacy) = self.legacy {
            self.reconcile_legacy(legacy, &mut pass);
        }

        let errors = pass.findings.records.iter().filter(|r| r.is_fatal()).count();
        info!(
            accounts = pass.accounts.len(),
            ous = pass.organizational_units.len(),
            errors,
            warnings = pass.findings.records.len() - errors,
            "reconciliation pass complete"
        );

        let warnings = pass
            .findings
            .records
            .iter()
            .filter(|r| !r.is_fatal())
            .map(|r| r.message.clone())
            .collect();
        Reconciliation {
            organization: ReconciledOrganization {
                accounts: pass.accounts,
                organizational_units: pass.organizational_units,
                warnings,
            },
            findings: pass.findings.records,
            statuses: pass.statuses,
        }
    }

    // -----------------------------------------------------------------------
    // Organizational units
    // -----------------------------------------------------------------------

    fn reconcile_ous(&self, pass: &mut Pass) {
        for declared in self.config.declared_ou_paths() {
            match match_ou(&declared, self.tree.organizational_units()) {
                OuMatch::Found { ou, .. } => pass.organizational_units.push(OrganizationalUnit {
                    id: ou.id.clone(),
                    name: ou.name.clone(),
                    logical_key: declared.clone(),
                    path: ou.path.clone(),
                }),
                OuMatch::Ambiguous(candidates) => pass.findings.ambiguous_ou(&declared, &candidates),
                OuMatch::NotFound => pass.findings.missing_ou(&declared),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    fn reconcile_accounts(&self, pass: &mut Pass) {
        let options = &self.config.global_options;
        for declared in self.config.accounts() {
            let key = declared.key;
            let config = declared.config;
            let ou_path = config.effective_ou_path();

            if options.is_ignored(path::top_level(ou_path)) {
                pass.findings.fatal(
                    DriftKind::IgnoredOuAccount,
                    key,
                    format!("Account \"{key}\" is declared in ignored organizational unit \"{ou_path}\""),
                );
                pass.status(key, MatchStatus::Mismatched);
                continue;
            }

            let ou = match match_ou(ou_path, self.tree.organizational_units()) {
                OuMatch::Found { ou, .. } => ou,
                OuMatch::Ambiguous(candidates) => {
                    pass.findings.ambiguous_ou(ou_path, &candidates);
                    pass.status(key, MatchStatus::Mismatched);
                    continue;
                }
                OuMatch::NotFound => {
                    pass.findings.missing_ou(ou_path);
                    pass.status(key, MatchStatus::Mismatched);
                    continue;
                }
            };

            let Some(live) = match_account(&config.email, self.tree.accounts()) else {
                self.account_not_found(declared, pass);
                continue;
            };

            if live.is_suspended() {
                pass.findings.warning(
                    DriftKind::SuspendedAccount,
                    key,
                    format!("Account \"{key}\" ({}) is suspended in the organization", live.id),
                );
            } else if live.parent_id != ou.id.0 {
                pass.findings.fatal(
                    DriftKind::OuMembershipMismatch,
                    key,
                    format!(
                        "The account with name \"{}\" is not in OU \"{ou_path}\".",
                        config.account_name
                    ),
                );
                pass.status(key, MatchStatus::Mismatched);
                continue;
            } else if config.landing_zone_account_type != Some(LegacyAccountType::Primary)
                && live.name != config.account_name
            {
                pass.findings.fatal(
                    DriftKind::NameMismatch,
                    key,
                    format!(
                        "The account name for account with email \"{}\" does not match the name in the configuration.\n\"{}\" != \"{}\"",
                        config.email, live.name, config.account_name
                    ),
                );
                pass.status(key, MatchStatus::Mismatched);
                continue;
            }

            pass.status(key, MatchStatus::Matched);
            pass.accounts.push(canonical(&declared, Some(live.id.clone())));
        }
    }

    fn account_not_found(&self, declared: DeclaredAccount<'_>, pass: &mut Pass) {
        let key = declared.key;
        let previous = self
            .previous
            .and_then(|p| p.accounts.iter().find(|a| a.key.0 == key));

        if let Some((before, id)) = previous.and_then(|a| a.cloud_id.as_ref().map(|id| (a, id))) {
            match self.tree.account_by_id(id) {
                Some(live) => {
                    pass.findings.fatal(
                        DriftKind::RenamedAccount,
                        key,
                        format!(
                            "Account \"{key}\" ({id}) changed in the organization: \"{}\" <{}> is now \"{}\" <{}>",
                            before.name, before.email, live.name, live.email
                        ),
                    );
                    pass.status(key, MatchStatus::RenamedDetected);
                }
                None => {
                    pass.findings.fatal(
                        DriftKind::StaleAccountRecord,
                        key,
                        format!("Invalid Account Configuration found for account {key}"),
                    );
                    pass.status(key, MatchStatus::MissingInOrg);
                }
            }
            if let Some(ty) = declared.config.landing_zone_account_type {
                pass.findings.missing_legacy_type(ty, key);
            }
            return;
        }

        pass.status(key, MatchStatus::MissingInOrg);
        match declared.config.landing_zone_account_type {
            Some(ty) => pass.findings.missing_legacy_type(ty, key),
            None => {
                debug!(account = key, "account not created yet");
                pass.accounts.push(canonical(&declared, None));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Policy limits
    // -----------------------------------------------------------------------

    fn check_policy_limits(&self, policies: &dyn PolicyClient, pass: &mut Pass) {
        let mut targets: Vec<(&str, &str, String, &[String])> = Vec::new();
        for (key, ou_config) in self.config.organizational_units.iter() {
            if let Some(ou) = pass.organizational_units.iter().find(|o| o.logical_key == key) {
                targets.push(("OU", key, ou.id.0.clone(), ou_config.scps.as_slice()));
            }
        }
        for declared in self.config.accounts() {
            let cloud_id = pass
                .accounts
                .iter()
                .find(|a| a.key.0 == declared.key)
                .and_then(|a| a.cloud_id.as_ref());
            if let Some(id) = cloud_id {
                targets.push(("Account", declared.key, id.0.clone(), declared.config.scps.as_slice()));
            }
        }

        let options = &self.config.global_options;
        for (label, key, target_id, declared) in targets {
            let attached = match policies.list_policies_for_target(&target_id) {
                Ok(attached) => attached,
                Err(e) => {
                    warn!(target = %target_id, error = %e, "could not list attached policies");
                    continue;
                }
            };
            // The quarantine policy never stays on a declared target.
            let unmanaged = attached
                .iter()
                .filter(|p| !options.manages_policy(&p.name) && p.name != options.quarantine_policy())
                .count();
            if unmanaged + declared.len() > MAX_POLICIES_PER_TARGET {
                pass.findings.fatal(
                    DriftKind::PolicyLimitExceeded,
                    key,
                    format!(
                        "Max Allowed SCPs for {label} \"{key}\" is {MAX_POLICIES_PER_TARGET}, found already attached scps count {unmanaged} and configured scps {} => {}",
                        declared.len(),
                        declared.join(", ")
                    ),
                );
            }
        }
    }

    fn report_unmanaged(&self, pass: &mut Pass) {
        let options = &self.config.global_options;
        for live in self.tree.accounts() {
            if live.is_suspended() || self.config.account_by_email(&live.email).is_some() {
                continue;
            }
            let location = self.tree.parent_path(live);
            if let Some(ou_path) = location {
                let top = path::top_level(ou_path);
                if options.is_ignored(top) || top == options.suspended_ou() {
                    continue;
                }
            }
            pass.findings.warning(
                DriftKind::UnmanagedAccount,
                &live.id.0,
                format!(
                    "Account \"{}\" <{}> under \"{}\" is not described by the configuration",
                    live.name,
                    live.email,
                    location.unwrap_or("root")
                ),
            );
        }
    }

    // -----------------------------------------------------------------------
    // Legacy manifest
    // -----------------------------------------------------------------------

    fn reconcile_legacy(&self, legacy: &LegacyConfig, pass: &mut Pass) {
        let live_ous = self.tree.organizational_units();
        let live_names: Vec<&str> = live_ous.iter().map(|o| o.name.as_str()).collect();
        let legacy_names = legacy.ou_names();
        let declared: Vec<&str> = self.config.organizational_units.keys().collect();

        if live_ous.len() != legacy_names.len() {
            pass.findings.warning(
                DriftKind::OuCountMismatch,
                "organizational-units",
                format!(
                    "There are {} organizational units in the organization while there are only {} organizational units in the Landing Zone configuration\n  Organizational units in organization: {}\n  Organizational units in Landing Zone: {}",
                    live_ous.len(),
                    legacy_names.len(),
                    live_names.join(", "),
                    legacy_names.join(", ")
                ),
            );
        }
        if declared != legacy_names {
            pass.findings.fatal(
                DriftKind::LegacyMismatch,
                "organizational-units",
                format!(
                    "There are {} organizational units in the configuration while there are {} organizational units in the Landing Zone configuration\n  Organizational units in configuration: {}\n  Organizational units in Landing Zone: {}",
                    declared.len(),
                    legacy_names.len(),
                    declared.join(", "),
                    legacy_names.join(", ")
                ),
            );
        }
        if legacy_names.iter().any(|n| !live_names.contains(n)) {
            pass.findings.fatal(
                DriftKind::LegacyMismatch,
                "organizational-units",
                format!(
                    "There are missing OUs found in the Landing Zone configuration but not in the organization\n  Organizational units in Landing Zone: {}\n  Organizational units in organization: {}",
                    legacy_names.join(", "),
                    live_names.join(", ")
                ),
            );
        }

        for legacy_ou in &legacy.organizational_units {
            if legacy_ou.core_accounts.is_empty() {
                continue;
            }
            let live_ou = match match_ou(&legacy_ou.name, live_ous) {
                OuMatch::Found { ou, .. } => ou,
                OuMatch::Ambiguous(candidates) => {
                    pass.findings.ambiguous_ou(&legacy_ou.name, &candidates);
                    continue;
                }
                OuMatch::NotFound => {
                    pass.findings.fatal(
                        DriftKind::LegacyMismatch,
                        &legacy_ou.name,
                        format!(
                            "Cannot find organizational unit \"{}\" that is used by Landing Zone",
                            legacy_ou.name
                        ),
                    );
                    continue;
                }
            };

            for legacy_account in &legacy_ou.core_accounts {
                let name = legacy_account.name.as_str();
                let Some(ty) = legacy_account.account_type() else {
                    pass.findings.fatal(
                        DriftKind::UnknownLegacyAccountType,
                        name,
                        format!("Cannot detect Landing Zone account type for account with name \"{name}\""),
                    );
                    continue;
                };
                if ty != LegacyAccountType::Primary
                    && !self
                        .tree
                        .accounts_in(&live_ou.id.0)
                        .iter()
                        .any(|a| a.name == name)
                {
                    pass.findings.fatal(
                        DriftKind::MissingLegacyAccount,
                        name,
                        format!("Cannot find non-primary account with name \"{name}\" that is used by Landing Zone"),
                    );
                    continue;
                }

                let Some(canonical) = pass
                    .accounts
                    .iter()
                    .find(|a| a.legacy_account_type == Some(ty))
                else {
                    if pass.findings.reported_types.insert(ty) {
                        pass.findings.fatal(
                            DriftKind::MissingLegacyAccount,
                            ty.as_str(),
                            format!("Cannot find Landing Zone account of type {ty} in the configuration"),
                        );
                    }
                    continue;
                };

                if ty != LegacyAccountType::Primary && canonical.name != name {
                    pass.findings.fatal(
                        DriftKind::LegacyMismatch,
                        name,
                        format!(
                            "The account name and Landing Zone account name for account type \"{ty}\" do not match.\n\"{}\" != \"{name}\"",
                            canonical.name
                        ),
                    );
                }
                if let Some(email) = &legacy_account.email {
                    if !canonical.email.eq_ignore_ascii_case(email) {
                        pass.findings.fatal(
                            DriftKind::LegacyMismatch,
                            name,
                            format!(
                                "The account email and Landing Zone account email for account type \"{ty}\" do not match.\n\"{}\" != \"{email}\"",
                                canonical.email
                            ),
                        );
                    }
                }
                if canonical.organizational_unit != legacy_ou.name {
                    pass.findings.fatal(
                        DriftKind::LegacyMismatch,
                        name,
                        format!(
                            "The account OU and Landing Zone OU for account type \"{ty}\" do not match.\n\"{}\" != \"{}\"",
                            canonical.organizational_unit, legacy_ou.name
                        ),
                    );
                }
            }
        }

        for ty in LegacyAccountType::ALL {
            if !pass.accounts.iter().any(|a| a.legacy_account_type == Some(ty)) {
                pass.findings.missing_legacy_type(ty, ty.as_str());
            }
        }
    }
}

fn canonical(declared: &DeclaredAccount<'_>, cloud_id: Option<AccountId>) -> Account {
    let config = declared.config;
    Account {
        key: AccountKey::from(declared.key),
        cloud_id,
        name: config.account_name.clone(),
        email: config.email.clone(),
        organizational_unit: config.ou.clone(),
        organizational_unit_path: config.effective_ou_path().to_string(),
        is_mandatory: declared.is_mandatory(),
        legacy_account_type: config.landing_zone_account_type,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rstest::rstest;

    use orgsync_core::{AccountStatus, LiveAccount, OuId};

    use super::*;
    use crate::memory::InMemoryOrganization;

    fn config(yaml: &str) -> Configuration {
        let ws = orgsync_core::ConfigWorkspace::load_with("config.yaml", |_| Ok(yaml.to_string()))
            .expect("config");
        ws.merged()
    }

    fn tree() -> OrgTree {
        OrgTree::from_parts(
            "r-1",
            vec![LiveOu {
                id: OuId::from("ou-core"),
                name: "core".into(),
                parent_id: "r-1".into(),
                path: "core".into(),
            }],
            vec![LiveAccount {
                id: AccountId::from("111"),
                name: "Security".into(),
                email: "sec@example.com".into(),
                status: AccountStatus::Active,
                parent_id: "ou-core".into(),
            }],
        )
    }

    #[test]
    fn duplicate_emails_are_fatal_and_case_insensitive() {
        let config = config(
            "mandatory-account-configs:\n  a: {account-name: A, email: X@example.com, ou: core}\n  b: {account-name: B, email: x@example.com, ou: core}\n",
        );
        let records = duplicate_emails(&config);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, DriftKind::DuplicateEmail);
        assert_eq!(records[0].subject_key, "b");
    }

    #[test]
    fn matched_account_gets_its_cloud_id() {
        let config = config(
            "organizational-units:\n  core: {}\nmandatory-account-configs:\n  security: {account-name: Security, email: SEC@example.com, ou: core, landing-zone-account-type: security}\n",
        );
        let tree = tree();
        let result = ReconciliationEngine::new(&config, &tree).run();
        assert!(!result.has_fatal(), "{:?}", result.findings);
        assert_eq!(result.status("security"), MatchStatus::Matched);
        let account = &result.organization.accounts[0];
        assert_eq!(account.cloud_id, Some(AccountId::from("111")));
        assert_eq!(result.organization.organizational_units[0].id, OuId::from("ou-core"));
    }

    #[test]
    fn name_mismatch_is_fatal_except_for_primary() {
        let yaml = |ty: &str| {
            format!(
                "organizational-units:\n  core: {{}}\nmandatory-account-configs:\n  acct: {{account-name: Other, email: sec@example.com, ou: core, landing-zone-account-type: {ty}}}\n"
            )
        };
        let tree = tree();

        let security = config(&yaml("security"));
        let result = ReconciliationEngine::new(&security, &tree).run();
        assert!(result.errors().any(|e| e.kind == DriftKind::NameMismatch));

        let primary = config(&yaml("primary"));
        let result = ReconciliationEngine::new(&primary, &tree).run();
        assert!(!result.has_fatal(), "{:?}", result.findings);
    }

    #[test]
    fn not_yet_created_account_is_not_an_error() {
        let config = config(
            "organizational-units:\n  core: {}\nworkload-account-configs:\n  dev: {account-name: Dev, email: dev@example.com, ou: core}\nmandatory-account-configs:\n  security: {account-name: Security, email: sec@example.com, ou: core}\n",
        );
        let tree = tree();
        let result = ReconciliationEngine::new(&config, &tree).run();
        assert!(!result.has_fatal(), "{:?}", result.findings);
        assert_eq!(result.status("dev"), MatchStatus::MissingInOrg);
        let dev = result
            .organization
            .accounts
            .iter()
            .find(|a| a.key.0 == "dev")
            .expect("dev");
        assert!(dev.cloud_id.is_none());
    }

    #[test]
    fn aggregated_error_keeps_encounter_order() {
        let config = config(
            "organizational-units:\n  core: {}\n  apps: {}\n  data: {}\n",
        );
        let tree = tree();
        let err = ReconciliationEngine::new(&config, &tree)
            .run()
            .into_result()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "There were errors while loading the configuration:\n\
             Cannot find organizational unit \"apps\" that is used by the configuration\n\
             Cannot find organizational unit \"data\" that is used by the configuration"
        );
    }

    fn published(key: &str, cloud_id: &str, email: &str) -> PublishedState {
        PublishedState {
            published_at: Utc::now(),
            commit_id: "c0".into(),
            accounts: vec![Account {
                key: AccountKey::from(key),
                cloud_id: Some(AccountId::from(cloud_id)),
                name: "Security".into(),
                email: email.into(),
                organizational_unit: "core".into(),
                organizational_unit_path: "core".into(),
                is_mandatory: true,
                legacy_account_type: Some(LegacyAccountType::Security),
            }],
            organizational_units: vec![],
            warnings: vec![],
        }
    }

    // 111 still exists under another email (renamed); 999 is gone (stale record).
    #[rstest]
    #[case("111", DriftKind::RenamedAccount)]
    #[case("999", DriftKind::StaleAccountRecord)]
    fn lost_typed_account_still_reports_its_type(#[case] cloud_id: &str, #[case] kind: DriftKind) {
        let config = config(
            "organizational-units:\n  core: {}\nmandatory-account-configs:\n  security-key: {account-name: Security, email: old-sec@example.com, ou: core, landing-zone-account-type: security}\n",
        );
        let tree = tree();
        let previous = published("security-key", cloud_id, "old-sec@example.com");
        let result = ReconciliationEngine::new(&config, &tree)
            .with_previous(Some(&previous))
            .run();

        let errors: Vec<&DriftRecord> = result.errors().collect();
        assert!(errors.iter().any(|e| e.kind == kind), "{errors:?}");
        assert!(
            errors
                .iter()
                .any(|e| e.message == "Could not find Landing Zone account of type \"security\""),
            "{errors:?}"
        );
    }

    #[test]
    fn ambiguous_legacy_ou_is_reported_as_ambiguous() {
        let config = config("organizational-units:\n  a: {}\n");
        let ou = |id: &str, name: &str, parent: &str, path: &str| LiveOu {
            id: OuId::from(id),
            name: name.into(),
            parent_id: parent.into(),
            path: path.into(),
        };
        let tree = OrgTree::from_parts(
            "r-1",
            vec![
                ou("ou-a", "a", "r-1", "a"),
                ou("ou-b", "b", "r-1", "b"),
                ou("ou-an", "Net", "ou-a", "a/Net"),
                ou("ou-bn", "Net", "ou-b", "b/Net"),
            ],
            vec![],
        );
        let legacy = LegacyConfig::parse(
            "legacy.yaml",
            "organizational_units:\n  - name: Net\n    core_accounts:\n      - name: Security\n        ssm_parameters:\n          - {name: /org/member/security/account_id, value: \"$[AccountId]\"}\n",
        )
        .expect("legacy");
        let result = ReconciliationEngine::new(&config, &tree)
            .with_legacy(Some(&legacy))
            .run();

        assert!(result
            .errors()
            .any(|e| e.kind == DriftKind::AmbiguousOu && e.message.contains("a/Net, b/Net")));
        assert!(!result
            .errors()
            .any(|e| e.message.contains("that is used by Landing Zone")));
    }

    fn policy_org(attached: usize) -> InMemoryOrganization {
        let mut yaml = String::from(
            "root: {id: r-1, name: Root}\norganizational-units:\n  - {id: ou-core, name: core, parent-id: r-1}\naccounts:\n  - {id: \"111\", name: Security, email: sec@example.com, parent-id: ou-core}\npolicies:\n  - {id: p-q, name: Quarantine-New-Object, targets: [ou-core]}\n",
        );
        for n in 1..=attached {
            yaml.push_str(&format!("  - {{id: p-{n}, name: Guard-{n}, targets: [ou-core, \"111\"]}}\n"));
        }
        InMemoryOrganization::new(serde_yaml::from_str(&yaml).expect("snapshot"))
    }

    #[test]
    fn too_many_policies_on_an_ou_is_fatal() {
        let org = policy_org(3);
        let tree = OrgTree::read(&org).expect("tree");
        let config = config("organizational-units:\n  core: {scps: [A, B, C]}\n");
        let result = ReconciliationEngine::new(&config, &tree).with_policies(&org).run();

        let limit: Vec<&DriftRecord> = result
            .errors()
            .filter(|e| e.kind == DriftKind::PolicyLimitExceeded)
            .collect();
        assert_eq!(limit.len(), 1, "{:?}", result.findings);
        assert_eq!(
            limit[0].message,
            "Max Allowed SCPs for OU \"core\" is 5, found already attached scps count 3 and configured scps 3 => A, B, C"
        );
    }

    #[test]
    fn managed_policies_do_not_count_against_the_limit() {
        let org = policy_org(3);
        let tree = OrgTree::read(&org).expect("tree");
        let config = config(
            "global-options:\n  scps: [Guard-1]\norganizational-units:\n  core: {scps: [A, B, C]}\n",
        );
        let result = ReconciliationEngine::new(&config, &tree).with_policies(&org).run();
        assert!(
            !result.errors().any(|e| e.kind == DriftKind::PolicyLimitExceeded),
            "{:?}",
            result.findings
        );
    }

    #[test]
    fn too_many_policies_on_an_account_is_fatal() {
        let org = policy_org(2);
        let tree = OrgTree::read(&org).expect("tree");
        let config = config(
            "organizational-units:\n  core: {}\nmandatory-account-configs:\n  security: {account-name: Security, email: sec@example.com, ou: core, scps: [W, X, Y, Z]}\n",
        );
        let result = ReconciliationEngine::new(&config, &tree).with_policies(&org).run();
        let limit: Vec<&str> = result
            .errors()
            .filter(|e| e.kind == DriftKind::PolicyLimitExceeded)
            .map(|e| e.subject_key.as_str())
            .collect();
        assert_eq!(limit, vec!["security"]);
    }
}
