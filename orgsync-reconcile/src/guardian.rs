//! Quarantine policy enforcement.
//!
//! Every root-level account and every top-level OU lands in exactly one of two sets: governed
//! (declared or ignored) or quarantined (root accounts, the suspended OU, undeclared OUs).

use std::collections::HashSet;

use tracing::{debug, info, warn};

use orgsync_core::{path, Configuration, PolicyTarget, TargetKind, TargetReason};

use crate::clients::{ClientError, Policy, PolicyClient, PolicyFilter};
use crate::error::ReconcileError;
use crate::tree::OrgTree;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardPlan {
    pub targets: Vec<PolicyTarget>,
}

impl GuardPlan {
    pub fn compute(config: &Configuration, tree: &OrgTree) -> Self {
        let options = &config.global_options;
        let declared_tops: HashSet<String> = config
            .declared_ou_paths()
            .iter()
            .map(|p| path::top_level(p).to_string())
            .collect();

        let mut targets: Vec<PolicyTarget> = tree
            .root_accounts()
            .iter()
            .map(|a| PolicyTarget {
                target_id: a.id.0.clone(),
                name: a.name.clone(),
                kind: TargetKind::Account,
                governed: false,
                reason: TargetReason::RootAccount,
            })
            .collect();

        for ou in tree.top_level_ous() {
            let (governed, reason) = if ou.name == options.suspended_ou() {
                (false, TargetReason::Suspended)
            } else if options.is_ignored(&ou.name) {
                (true, TargetReason::Ignored)
            } else if declared_tops.contains(&ou.name) {
                (true, TargetReason::Declared)
            } else {
                (false, TargetReason::Undeclared)
            };
            targets.push(PolicyTarget {
                target_id: ou.id.0.clone(),
                name: ou.name.clone(),
                kind: TargetKind::OrganizationalUnit,
                governed,
                reason,
            });
        }
        Self { targets }
    }

    pub fn governed(&self) -> impl Iterator<Item = &PolicyTarget> {
        self.targets.iter().filter(|t| t.governed)
    }

    pub fn quarantined(&self) -> impl Iterator<Item = &PolicyTarget> {
        self.targets.iter().filter(|t| !t.governed)
    }
}

// ---------------------------------------------------------------------------
// Enforcement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardReport {
    /// `(policy name, target name)` pairs.
    pub attached: Vec<(String, String)>,
    pub detached: Vec<(String, String)>,
    pub failures: Vec<String>,
}

impl GuardReport {
    pub fn mutations(&self) -> usize {
        self.attached.len() + self.detached.len()
    }
}

pub struct PolicyGuardian<'a> {
    policies: &'a dyn PolicyClient,
    quarantine_policy: &'a str,
    baseline_policy: &'a str,
}

impl<'a> PolicyGuardian<'a> {
    pub fn new(policies: &'a dyn PolicyClient, config: &'a Configuration) -> Self {
        Self {
            policies,
            quarantine_policy: config.global_options.quarantine_policy(),
            baseline_policy: config.global_options.baseline_policy(),
        }
    }

    /// Look up the quarantine policy. Callers resolve it before changing anything so a
    /// missing policy fails the run up front.
    pub fn quarantine_policy(&self) -> Result<Policy, ReconcileError> {
        self.policies
            .list_policies(&PolicyFilter::named(self.quarantine_policy))?
            .into_iter()
            .next()
            .ok_or_else(|| ReconcileError::QuarantinePolicyMissing {
                name: self.quarantine_policy.to_string(),
            })
    }

    pub fn enforce(&self, plan: &GuardPlan) -> Result<GuardReport, ReconcileError> {
        let quarantine = self.quarantine_policy()?;
        self.enforce_with(&quarantine, plan)
    }

    /// Attach or detach `quarantine` so the live targets agree with `plan`. Per-target
    /// failures are collected and the remaining targets still run.
    pub fn enforce_with(&self, quarantine: &Policy, plan: &GuardPlan) -> Result<GuardReport, ReconcileError> {
        let quarantined_now: HashSet<String> = self
            .policies
            .list_targets_for_policy(&quarantine.id)?
            .into_iter()
            .collect();

        let mut report = GuardReport::default();
        for target in &plan.targets {
            let attached = quarantined_now.contains(&target.target_id);
            match target.reason {
                TargetReason::Ignored => {
                    debug!(target = %target.name, "ignored organizational unit left alone");
                }
                TargetReason::Declared => {
                    if attached {
                        self.detach(quarantine, target, &mut report);
                    }
                }
                TargetReason::Undeclared | TargetReason::RootAccount | TargetReason::Suspended => {
                    let current = match self.policies.list_policies_for_target(&target.target_id) {
                        Ok(policies) => policies,
                        Err(e) => {
                            warn!(target = %target.name, error = %e, "could not list attached policies");
                            report.failures.push(e.to_string());
                            continue;
                        }
                    };
                    for policy in current {
                        if policy.id != quarantine.id && policy.name != self.baseline_policy {
                            self.detach(&policy, target, &mut report);
                        }
                    }
                    if !attached {
                        self.attach(quarantine, target, &mut report);
                    }
                }
            }
        }

        info!(
            attached = report.attached.len(),
            detached = report.detached.len(),
            failures = report.failures.len(),
            "quarantine policy enforced"
        );
        Ok(report)
    }

    fn attach(&self, policy: &Policy, target: &PolicyTarget, report: &mut GuardReport) {
        let result = self.policies.attach_policy(&policy.id, &target.target_id);
        if self.settle(result, "attach", policy, target, report) {
            report.attached.push((policy.name.clone(), target.name.clone()));
        }
    }

    fn detach(&self, policy: &Policy, target: &PolicyTarget, report: &mut GuardReport) {
        let result = self.policies.detach_policy(&policy.id, &target.target_id);
        if self.settle(result, "detach", policy, target, report) {
            report.detached.push((policy.name.clone(), target.name.clone()));
        }
    }

    /// True when the call changed something.
    fn settle(
        &self,
        result: Result<(), ClientError>,
        action: &str,
        policy: &Policy,
        target: &PolicyTarget,
        report: &mut GuardReport,
    ) -> bool {
        match result {
            Ok(()) => {
                debug!(action, policy = %policy.name, target = %target.name, "policy updated");
                true
            }
            Err(e) if e.is_no_op() => false,
            Err(e) => {
                warn!(action, policy = %policy.name, target = %target.name, error = %e, "policy update failed");
                report.failures.push(e.to_string());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use orgsync_core::{AccountId, AccountStatus, LiveAccount, LiveOu, OuId};

    use super::*;
    use crate::memory::InMemoryOrganization;

    fn ou(id: &str, name: &str) -> LiveOu {
        LiveOu {
            id: OuId::from(id),
            name: name.into(),
            parent_id: "r-1".into(),
            path: name.into(),
        }
    }

    fn config(yaml: &str) -> Configuration {
        orgsync_core::ConfigWorkspace::load_with("config.yaml", |_| Ok(yaml.to_string()))
            .expect("config")
            .merged()
    }

    #[test]
    fn every_target_gets_exactly_one_verdict() {
        let config = config(
            "global-options:\n  ignored-ous: [Sandbox]\norganizational-units:\n  core/Net: {}\n",
        );
        let tree = OrgTree::from_parts(
            "r-1",
            vec![
                ou("ou-1", "core"),
                ou("ou-2", "apps"),
                ou("ou-3", "Sandbox"),
                ou("ou-4", "Suspended"),
            ],
            vec![LiveAccount {
                id: AccountId::from("9"),
                name: "Stray".into(),
                email: "stray@example.com".into(),
                status: AccountStatus::Active,
                parent_id: "r-1".into(),
            }],
        );
        let plan = GuardPlan::compute(&config, &tree);
        let reasons: Vec<(&str, TargetReason)> =
            plan.targets.iter().map(|t| (t.name.as_str(), t.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                ("Stray", TargetReason::RootAccount),
                ("core", TargetReason::Declared),
                ("apps", TargetReason::Undeclared),
                ("Sandbox", TargetReason::Ignored),
                ("Suspended", TargetReason::Suspended),
            ]
        );
        assert_eq!(plan.governed().count() + plan.quarantined().count(), plan.targets.len());
    }

    #[test]
    fn failed_lookup_does_not_stop_other_targets() {
        let config = config("organizational-units:\n  core: {}\n");
        let org = InMemoryOrganization::new(
            serde_yaml::from_str(
                r#"root: {id: r-1, name: Root}
organizational-units:
  - {id: ou-1, name: apps, parent-id: r-1}
  - {id: ou-2, name: data, parent-id: r-1}
policies:
  - {id: p-q, name: Quarantine-New-Object}
  - {id: p-x, name: Data-Guardrails, targets: [ou-2]}
"#,
            )
            .expect("snapshot"),
        );
        org.fail_on("ou-1");
        let tree = OrgTree::read(&org).expect("tree");
        let plan = GuardPlan::compute(&config, &tree);

        let report = PolicyGuardian::new(&org, &config).enforce(&plan).expect("enforce");
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("ou-1"), "{:?}", report.failures);
        assert_eq!(
            report.attached,
            vec![("Quarantine-New-Object".to_string(), "data".to_string())]
        );
        assert_eq!(
            report.detached,
            vec![("Data-Guardrails".to_string(), "data".to_string())]
        );
    }
}
