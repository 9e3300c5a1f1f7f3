//! Collaborator interfaces.
//!
//! Reconciliation never talks to a platform directly. It receives these traits at
//! construction; retries and authentication belong to the implementations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use orgsync_core::{Account, AccountId, LiveAccount, LiveOu, OrganizationalUnit, OuId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The target is already in the requested state.
    #[error("{operation}: no change ({detail})")]
    NoOp { operation: String, detail: String },

    #[error("{operation}: {resource} not found")]
    NotFound { operation: String, resource: String },

    #[error("{operation} failed: {message}")]
    Failed { operation: String, message: String },
}

impl ClientError {
    pub fn no_op(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        ClientError::NoOp {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn not_found(operation: impl Into<String>, resource: impl Into<String>) -> Self {
        ClientError::NotFound {
            operation: operation.into(),
            resource: resource.into(),
        }
    }

    pub fn failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        ClientError::Failed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// "Already in desired state" class. Callers treat it as success.
    pub fn is_no_op(&self) -> bool {
        matches!(self, ClientError::NoOp { .. })
    }
}

// ---------------------------------------------------------------------------
// Organization directory
// ---------------------------------------------------------------------------

/// Root of the organization hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub id: String,
    pub name: String,
}

/// An organizational unit as the directory lists it, before its path is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OuNode {
    pub id: OuId,
    pub name: String,
    pub parent_id: String,
}

pub trait OrganizationDirectory {
    fn list_roots(&self) -> Result<Vec<Root>, ClientError>;
    fn list_organizational_units(&self) -> Result<Vec<OuNode>, ClientError>;
    fn get_organizational_unit_with_path(&self, id: &OuId) -> Result<LiveOu, ClientError>;
    /// Accounts directly under `parent_id` (a root id or an OU id).
    fn list_accounts_for_parent(&self, parent_id: &str) -> Result<Vec<LiveAccount>, ClientError>;
    fn move_account(&self, account_id: &AccountId, from: &str, to: &str) -> Result<(), ClientError>;
    fn create_organizational_unit(&self, name: &str, parent_id: &str) -> Result<OuNode, ClientError>;
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub name: String,
}

/// Selects policies by name; the default selects all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyFilter {
    pub name: Option<String>,
}

impl PolicyFilter {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    pub fn matches(&self, policy: &Policy) -> bool {
        self.name.as_deref().map_or(true, |n| n == policy.name)
    }
}

pub trait PolicyClient {
    fn list_policies(&self, filter: &PolicyFilter) -> Result<Vec<Policy>, ClientError>;
    fn list_policies_for_target(&self, target_id: &str) -> Result<Vec<Policy>, ClientError>;
    fn list_targets_for_policy(&self, policy_id: &str) -> Result<Vec<String>, ClientError>;
    fn attach_policy(&self, policy_id: &str, target_id: &str) -> Result<(), ClientError>;
    fn detach_policy(&self, policy_id: &str, target_id: &str) -> Result<(), ClientError>;
}

// ---------------------------------------------------------------------------
// Source control
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub branch: String,
    pub parent_commit_id: String,
    pub message: String,
    pub put_files: Vec<PutFile>,
    pub delete_files: Vec<String>,
}

pub trait SourceControl {
    fn get_file(&self, repository: &str, path: &str, commit_id: &str) -> Result<String, ClientError>;
    /// Returns the new commit id. A commit that changes nothing fails with [`ClientError::NoOp`].
    fn commit(&self, repository: &str, request: &CommitRequest) -> Result<String, ClientError>;
}

// ---------------------------------------------------------------------------
// Published state
// ---------------------------------------------------------------------------

/// Canonical records handed to downstream steps, and the "previously recorded" view
/// the next run compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedState {
    pub published_at: DateTime<Utc>,
    pub commit_id: String,
    pub accounts: Vec<Account>,
    pub organizational_units: Vec<OrganizationalUnit>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

pub trait StateStore {
    fn load_previous(&self) -> Result<Option<PublishedState>, ClientError>;
    fn publish(&self, state: &PublishedState) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_is_classified() {
        assert!(ClientError::no_op("attach_policy", "already attached").is_no_op());
        assert!(!ClientError::failed("attach_policy", "throttled").is_no_op());
    }

    #[test]
    fn filter_by_name() {
        let policy = Policy {
            id: "p-1".into(),
            name: "Quarantine-New-Object".into(),
        };
        assert!(PolicyFilter::default().matches(&policy));
        assert!(PolicyFilter::named("Quarantine-New-Object").matches(&policy));
        assert!(!PolicyFilter::named("FullAWSAccess").matches(&policy));
    }
}
