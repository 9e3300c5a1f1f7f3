//! Snapshot of the live organization hierarchy.

use std::collections::BTreeMap;

use tracing::debug;

use orgsync_core::{path, AccountId, LiveAccount, LiveOu, OuId};

use crate::clients::OrganizationDirectory;
use crate::error::ReconcileError;

/// Every OU with its path, and the accounts directly under the root and each OU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgTree {
    pub root_id: String,
    organizational_units: Vec<LiveOu>,
    accounts_by_parent: BTreeMap<String, Vec<LiveAccount>>,
}

impl OrgTree {
    /// Read the whole hierarchy, one call at a time.
    pub fn read(directory: &dyn OrganizationDirectory) -> Result<Self, ReconcileError> {
        let root = directory
            .list_roots()?
            .into_iter()
            .next()
            .ok_or(ReconcileError::NoRoot)?;

        let mut organizational_units = Vec::new();
        for node in directory.list_organizational_units()? {
            organizational_units.push(directory.get_organizational_unit_with_path(&node.id)?);
        }

        let mut accounts_by_parent = BTreeMap::new();
        accounts_by_parent.insert(root.id.clone(), directory.list_accounts_for_parent(&root.id)?);
        for ou in &organizational_units {
            accounts_by_parent.insert(ou.id.0.clone(), directory.list_accounts_for_parent(&ou.id.0)?);
        }

        debug!(
            root = %root.id,
            ous = organizational_units.len(),
            accounts = accounts_by_parent.values().map(Vec::len).sum::<usize>(),
            "read organization tree"
        );
        Ok(Self {
            root_id: root.id,
            organizational_units,
            accounts_by_parent,
        })
    }

    /// Build a tree from parts already read.
    pub fn from_parts(
        root_id: impl Into<String>,
        organizational_units: Vec<LiveOu>,
        accounts: Vec<LiveAccount>,
    ) -> Self {
        let root_id = root_id.into();
        let mut accounts_by_parent: BTreeMap<String, Vec<LiveAccount>> = BTreeMap::new();
        accounts_by_parent.insert(root_id.clone(), Vec::new());
        for ou in &organizational_units {
            accounts_by_parent.insert(ou.id.0.clone(), Vec::new());
        }
        for account in accounts {
            accounts_by_parent
                .entry(account.parent_id.clone())
                .or_default()
                .push(account);
        }
        Self {
            root_id,
            organizational_units,
            accounts_by_parent,
        }
    }

    pub fn organizational_units(&self) -> &[LiveOu] {
        &self.organizational_units
    }

    pub fn top_level_ous(&self) -> impl Iterator<Item = &LiveOu> {
        self.organizational_units.iter().filter(|o| o.is_top_level())
    }

    pub fn ou_by_path(&self, ou_path: &str) -> Option<&LiveOu> {
        self.organizational_units.iter().find(|o| o.path == ou_path)
    }

    pub fn ou_by_id(&self, id: &OuId) -> Option<&LiveOu> {
        self.organizational_units.iter().find(|o| &o.id == id)
    }

    /// Every account, root-level ones first.
    pub fn accounts(&self) -> impl Iterator<Item = &LiveAccount> {
        let root = self.root_accounts().iter();
        let rest = self
            .accounts_by_parent
            .iter()
            .filter(|(parent, _)| **parent != self.root_id)
            .flat_map(|(_, accounts)| accounts.iter());
        root.chain(rest)
    }

    pub fn accounts_in(&self, parent_id: &str) -> &[LiveAccount] {
        self.accounts_by_parent
            .get(parent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn root_accounts(&self) -> &[LiveAccount] {
        self.accounts_in(&self.root_id)
    }

    pub fn account_by_id(&self, id: &AccountId) -> Option<&LiveAccount> {
        self.accounts().find(|a| &a.id == id)
    }

    /// Path of the OU holding `account`, or `None` when it sits under the root.
    pub fn parent_path(&self, account: &LiveAccount) -> Option<&str> {
        self.organizational_units
            .iter()
            .find(|o| o.id.0 == account.parent_id)
            .map(|o| o.path.as_str())
    }

    // -----------------------------------------------------------------------
    // Local bookkeeping after successful mutations
    // -----------------------------------------------------------------------

    /// Record an OU created under `parent_id`.
    pub fn insert_ou(&mut self, id: OuId, name: &str, parent_id: &str) -> &LiveOu {
        let parent_path = self
            .organizational_units
            .iter()
            .find(|o| o.id.0 == parent_id)
            .map(|o| o.path.clone())
            .unwrap_or_default();
        self.accounts_by_parent.entry(id.0.clone()).or_default();
        self.organizational_units.push(LiveOu {
            id,
            name: name.to_string(),
            parent_id: parent_id.to_string(),
            path: path::join(&parent_path, name),
        });
        let last = self.organizational_units.len() - 1;
        &self.organizational_units[last]
    }

    /// Record an account moved to `to`.
    pub fn relocate_account(&mut self, id: &AccountId, to: &str) {
        let mut moved = None;
        for accounts in self.accounts_by_parent.values_mut() {
            if let Some(i) = accounts.iter().position(|a| &a.id == id) {
                moved = Some(accounts.remove(i));
                break;
            }
        }
        if let Some(mut account) = moved {
            account.parent_id = to.to_string();
            self.accounts_by_parent.entry(to.to_string()).or_default().push(account);
        }
    }
}
