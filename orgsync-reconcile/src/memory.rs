//! In-memory organization backed by a YAML snapshot.
//!
//! Implements both [`OrganizationDirectory`] and [`PolicyClient`]. Every mutation attempt is
//! appended to a call log, so callers can assert exactly what a run did to the platform.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use orgsync_core::{path, AccountId, LiveAccount, LiveOu, OuId};

use crate::clients::{
    ClientError, OrganizationDirectory, OuNode, Policy, PolicyClient, PolicyFilter, Root,
};
use crate::error::{io_err, ReconcileError};
use crate::repository::write_atomic;

// ---------------------------------------------------------------------------
// Snapshot format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPolicy {
    pub id: String,
    pub name: String,
    /// Root, OU or account ids the policy is attached to.
    #[serde(default)]
    pub targets: Vec<String>,
}

/// On-disk organization state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<Root>,
    #[serde(default)]
    pub organizational_units: Vec<OuNode>,
    #[serde(default)]
    pub accounts: Vec<LiveAccount>,
    #[serde(default)]
    pub policies: Vec<SnapshotPolicy>,
}

impl Snapshot {
    fn is_root(&self, id: &str) -> bool {
        self.root.as_ref().is_some_and(|r| r.id == id)
    }

    fn is_parent(&self, id: &str) -> bool {
        self.is_root(id) || self.organizational_units.iter().any(|o| o.id.0 == id)
    }

    fn is_target(&self, id: &str) -> bool {
        self.is_parent(id) || self.accounts.iter().any(|a| a.id.0 == id)
    }

    /// Full path of an OU, walking parent links up to the root.
    fn path_of(&self, node: &OuNode) -> String {
        let mut segments = vec![node.name.as_str()];
        let mut parent = node.parent_id.as_str();
        // Bounded by the OU count so a corrupt snapshot with a cycle still terminates.
        for _ in 0..self.organizational_units.len() {
            match self.organizational_units.iter().find(|o| o.id.0 == parent) {
                Some(up) => {
                    segments.push(up.name.as_str());
                    parent = up.parent_id.as_str();
                }
                None => break,
            }
        }
        segments
            .iter()
            .rev()
            .fold(String::new(), |parent, name| path::join(&parent, name))
    }

    fn next_ou_id(&self) -> OuId {
        let mut n = self.organizational_units.len() + 1;
        loop {
            let id = format!("ou-{n:04}");
            if !self.organizational_units.iter().any(|o| o.id.0 == id) {
                return OuId(id);
            }
            n += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Call log
// ---------------------------------------------------------------------------

/// A mutation attempted against the organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateOrganizationalUnit { name: String, parent_id: String },
    MoveAccount { account_id: String, from: String, to: String },
    AttachPolicy { policy_id: String, target_id: String },
    DetachPolicy { policy_id: String, target_id: String },
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::CreateOrganizationalUnit { name, parent_id } => {
                write!(f, "create-organizational-unit {name} under {parent_id}")
            }
            Call::MoveAccount { account_id, from, to } => {
                write!(f, "move-account {account_id} {from} -> {to}")
            }
            Call::AttachPolicy { policy_id, target_id } => {
                write!(f, "attach-policy {policy_id} to {target_id}")
            }
            Call::DetachPolicy { policy_id, target_id } => {
                write!(f, "detach-policy {policy_id} from {target_id}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryOrganization
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryOrganization {
    state: RefCell<Snapshot>,
    calls: RefCell<Vec<Call>>,
    failing: RefCell<HashSet<String>>,
}

impl InMemoryOrganization {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: RefCell::new(snapshot),
            calls: RefCell::new(Vec::new()),
            failing: RefCell::new(HashSet::new()),
        }
    }

    pub fn load_at(path: &Path) -> Result<Self, ReconcileError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let snapshot: Snapshot = serde_yaml::from_str(&contents)?;
        Ok(Self::new(snapshot))
    }

    /// Write the current state back, atomically.
    pub fn save_at(&self, path: &Path) -> Result<(), ReconcileError> {
        let yaml = serde_yaml::to_string(&*self.state.borrow())?;
        write_atomic(path, &yaml)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    /// Every mutation attempted so far, no-ops included.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Make every call touching `subject` (an OU name, an account id or a target id) fail
    /// with a non-no-op error. Failed calls are still logged.
    pub fn fail_on(&self, subject: impl Into<String>) {
        self.failing.borrow_mut().insert(subject.into());
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn check(&self, operation: &str, subjects: &[&str]) -> Result<(), ClientError> {
        let failing = self.failing.borrow();
        match subjects.iter().find(|s| failing.contains(**s)) {
            Some(subject) => Err(ClientError::failed(operation, format!("{subject} is unavailable"))),
            None => Ok(()),
        }
    }
}

impl OrganizationDirectory for InMemoryOrganization {
    fn list_roots(&self) -> Result<Vec<Root>, ClientError> {
        Ok(self.state.borrow().root.iter().cloned().collect())
    }

    fn list_organizational_units(&self) -> Result<Vec<OuNode>, ClientError> {
        Ok(self.state.borrow().organizational_units.clone())
    }

    fn get_organizational_unit_with_path(&self, id: &OuId) -> Result<LiveOu, ClientError> {
        let state = self.state.borrow();
        let node = state
            .organizational_units
            .iter()
            .find(|o| &o.id == id)
            .ok_or_else(|| ClientError::not_found("get_organizational_unit", id.0.as_str()))?;
        Ok(LiveOu {
            id: node.id.clone(),
            name: node.name.clone(),
            parent_id: node.parent_id.clone(),
            path: state.path_of(node),
        })
    }

    fn list_accounts_for_parent(&self, parent_id: &str) -> Result<Vec<LiveAccount>, ClientError> {
        let state = self.state.borrow();
        if !state.is_parent(parent_id) {
            return Err(ClientError::not_found("list_accounts_for_parent", parent_id));
        }
        Ok(state
            .accounts
            .iter()
            .filter(|a| a.parent_id == parent_id)
            .cloned()
            .collect())
    }

    fn move_account(&self, account_id: &AccountId, from: &str, to: &str) -> Result<(), ClientError> {
        self.record(Call::MoveAccount {
            account_id: account_id.0.clone(),
            from: from.to_string(),
            to: to.to_string(),
        });
        self.check("move_account", &[&account_id.0, to])?;
        let mut state = self.state.borrow_mut();
        if !state.is_parent(to) {
            return Err(ClientError::not_found("move_account", to));
        }
        let account = state
            .accounts
            .iter_mut()
            .find(|a| &a.id == account_id)
            .ok_or_else(|| ClientError::not_found("move_account", account_id.0.as_str()))?;
        if account.parent_id == to {
            return Err(ClientError::no_op("move_account", format!("{account_id} already in {to}")));
        }
        if account.parent_id != from {
            return Err(ClientError::failed(
                "move_account",
                format!("{account_id} is not in {from}"),
            ));
        }
        account.parent_id = to.to_string();
        Ok(())
    }

    fn create_organizational_unit(&self, name: &str, parent_id: &str) -> Result<OuNode, ClientError> {
        self.record(Call::CreateOrganizationalUnit {
            name: name.to_string(),
            parent_id: parent_id.to_string(),
        });
        self.check("create_organizational_unit", &[name, parent_id])?;
        let mut state = self.state.borrow_mut();
        if !state.is_parent(parent_id) {
            return Err(ClientError::not_found("create_organizational_unit", parent_id));
        }
        if state
            .organizational_units
            .iter()
            .any(|o| o.name == name && o.parent_id == parent_id)
        {
            return Err(ClientError::no_op(
                "create_organizational_unit",
                format!("{name} already exists under {parent_id}"),
            ));
        }
        let node = OuNode {
            id: state.next_ou_id(),
            name: name.to_string(),
            parent_id: parent_id.to_string(),
        };
        state.organizational_units.push(node.clone());
        Ok(node)
    }
}

impl PolicyClient for InMemoryOrganization {
    fn list_policies(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, ClientError> {
        Ok(self
            .state
            .borrow()
            .policies
            .iter()
            .map(|p| Policy {
                id: p.id.clone(),
                name: p.name.clone(),
            })
            .filter(|p| filter.matches(p))
            .collect())
    }

    fn list_policies_for_target(&self, target_id: &str) -> Result<Vec<Policy>, ClientError> {
        self.check("list_policies_for_target", &[target_id])?;
        Ok(self
            .state
            .borrow()
            .policies
            .iter()
            .filter(|p| p.targets.iter().any(|t| t == target_id))
            .map(|p| Policy {
                id: p.id.clone(),
                name: p.name.clone(),
            })
            .collect())
    }

    fn list_targets_for_policy(&self, policy_id: &str) -> Result<Vec<String>, ClientError> {
        self.state
            .borrow()
            .policies
            .iter()
            .find(|p| p.id == policy_id)
            .map(|p| p.targets.clone())
            .ok_or_else(|| ClientError::not_found("list_targets_for_policy", policy_id))
    }

    fn attach_policy(&self, policy_id: &str, target_id: &str) -> Result<(), ClientError> {
        self.record(Call::AttachPolicy {
            policy_id: policy_id.to_string(),
            target_id: target_id.to_string(),
        });
        self.check("attach_policy", &[target_id])?;
        let mut state = self.state.borrow_mut();
        if !state.is_target(target_id) {
            return Err(ClientError::not_found("attach_policy", target_id));
        }
        let policy = state
            .policies
            .iter_mut()
            .find(|p| p.id == policy_id)
            .ok_or_else(|| ClientError::not_found("attach_policy", policy_id))?;
        if policy.targets.iter().any(|t| t == target_id) {
            return Err(ClientError::no_op("attach_policy", format!("{policy_id} already on {target_id}")));
        }
        policy.targets.push(target_id.to_string());
        Ok(())
    }

    fn detach_policy(&self, policy_id: &str, target_id: &str) -> Result<(), ClientError> {
        self.record(Call::DetachPolicy {
            policy_id: policy_id.to_string(),
            target_id: target_id.to_string(),
        });
        self.check("detach_policy", &[target_id])?;
        let mut state = self.state.borrow_mut();
        let policy = state
            .policies
            .iter_mut()
            .find(|p| p.id == policy_id)
            .ok_or_else(|| ClientError::not_found("detach_policy", policy_id))?;
        let before = policy.targets.len();
        policy.targets.retain(|t| t != target_id);
        if policy.targets.len() == before {
            return Err(ClientError::no_op("detach_policy", format!("{policy_id} not on {target_id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const SNAPSHOT: &str = r#"root: {id: r-1, name: Root}
organizational-units:
  - {id: ou-a, name: A, parent-id: r-1}
  - {id: ou-b, name: B, parent-id: ou-a}
accounts:
  - {id: "111", name: Ops, email: ops@example.com, parent-id: ou-b}
policies:
  - {id: p-q, name: Quarantine-New-Object}
"#;

    fn org() -> InMemoryOrganization {
        InMemoryOrganization::new(serde_yaml::from_str(SNAPSHOT).expect("snapshot"))
    }

    #[test]
    fn paths_are_computed_from_parent_links() {
        let org = org();
        let ou = org
            .get_organizational_unit_with_path(&OuId::from("ou-b"))
            .expect("ou");
        assert_eq!(ou.path, "A/B");
    }

    #[test]
    fn repeated_mutations_are_no_ops() {
        let org = org();
        let created = org.create_organizational_unit("C", "ou-b").expect("create");
        let dup = org.create_organizational_unit("C", "ou-b").unwrap_err();
        assert!(dup.is_no_op());

        org.move_account(&AccountId::from("111"), "ou-b", &created.id.0)
            .expect("move");
        let again = org
            .move_account(&AccountId::from("111"), "ou-b", &created.id.0)
            .unwrap_err();
        assert!(again.is_no_op());

        org.attach_policy("p-q", "ou-a").expect("attach");
        assert!(org.attach_policy("p-q", "ou-a").unwrap_err().is_no_op());
        org.detach_policy("p-q", "ou-a").expect("detach");
        assert!(org.detach_policy("p-q", "ou-a").unwrap_err().is_no_op());

        assert_eq!(org.calls().len(), 8);
        assert_eq!(org.calls()[0].to_string(), "create-organizational-unit C under ou-b");
    }

    #[test]
    fn injected_failures_are_not_no_ops() {
        let org = org();
        org.fail_on("C");
        org.fail_on("111");

        let err = org.create_organizational_unit("C", "ou-b").unwrap_err();
        assert!(!err.is_no_op());
        assert!(org.create_organizational_unit("D", "ou-b").is_ok());
        assert!(!org.move_account(&AccountId::from("111"), "ou-b", "ou-a").unwrap_err().is_no_op());
        assert!(org.list_policies_for_target("111").is_err());
        assert_eq!(org.calls().len(), 3);
        assert_eq!(org.snapshot().accounts[0].parent_id, "ou-b");
    }

    #[test]
    fn snapshot_survives_save_and_load() {
        let tmp = TempDir::new().expect("tmp");
        let path = tmp.path().join("org.yaml");
        let org = org();
        org.attach_policy("p-q", "111").expect("attach");
        org.save_at(&path).expect("save");

        let loaded = InMemoryOrganization::load_at(&path).expect("load");
        assert_eq!(loaded.snapshot(), org.snapshot());
        assert!(!path.with_extension("yaml.tmp").exists());
    }
}
