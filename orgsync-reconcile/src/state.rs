//! File-backed published state.
//!
//! Persists a [`PublishedState`] JSON document at
//! `<home>/.orgsync/state/<organization>.json`.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::clients::{ClientError, PublishedState, StateStore};
use crate::error::{io_err, ReconcileError};
use crate::repository::write_atomic;

/// `~/.orgsync/state/<organization>.json`
pub fn state_path_at(home: &Path, organization: &str) -> PathBuf {
    home.join(".orgsync")
        .join("state")
        .join(format!("{organization}.json"))
}

/// `None` when nothing was published yet.
pub fn load_at(home: &Path, organization: &str) -> Result<Option<PublishedState>, ReconcileError> {
    let path = state_path_at(home, organization);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

pub fn save_at(home: &Path, organization: &str, state: &PublishedState) -> Result<(), ReconcileError> {
    let path = state_path_at(home, organization);
    let json = serde_json::to_string_pretty(state)?;
    write_atomic(&path, &json)?;
    debug!(path = %path.display(), accounts = state.accounts.len(), "published state saved");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct FileStateStore {
    home: PathBuf,
    organization: String,
}

impl FileStateStore {
    /// Store rooted at the user's home directory.
    pub fn new(organization: impl Into<String>) -> Result<Self, ReconcileError> {
        let home = dirs::home_dir().ok_or(ReconcileError::HomeNotFound)?;
        Ok(Self::at(home, organization))
    }

    pub fn at(home: impl Into<PathBuf>, organization: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            organization: organization.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        state_path_at(&self.home, &self.organization)
    }
}

impl StateStore for FileStateStore {
    fn load_previous(&self) -> Result<Option<PublishedState>, ClientError> {
        load_at(&self.home, &self.organization).map_err(|e| ClientError::failed("load_previous", e.to_string()))
    }

    fn publish(&self, state: &PublishedState) -> Result<(), ClientError> {
        save_at(&self.home, &self.organization, state).map_err(|e| ClientError::failed("publish", e.to_string()))
    }
}
