//! Commits rewritten configuration and publishes the canonical records.

use chrono::Utc;
use tracing::info;

use orgsync_core::{FileChange, ReconciledOrganization};

use crate::clients::{CommitRequest, PublishedState, PutFile, SourceControl, StateStore};
use crate::error::ReconcileError;
use crate::pipeline::ConfigLocation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Committed { commit_id: String },
    /// Nothing to commit; the configuration stays at its parent commit.
    Unchanged { commit_id: String },
}

impl PublishOutcome {
    pub fn commit_id(&self) -> &str {
        match self {
            PublishOutcome::Committed { commit_id } | PublishOutcome::Unchanged { commit_id } => commit_id,
        }
    }
}

pub struct ResultPublisher<'a> {
    source: &'a dyn SourceControl,
    state: &'a dyn StateStore,
}

impl<'a> ResultPublisher<'a> {
    pub fn new(source: &'a dyn SourceControl, state: &'a dyn StateStore) -> Self {
        Self { source, state }
    }

    /// Commit `changes` on top of the loaded commit. A commit the store rejects as a no-op
    /// is not an error.
    pub fn commit(
        &self,
        location: &ConfigLocation,
        changes: &[FileChange],
        message: &str,
    ) -> Result<PublishOutcome, ReconcileError> {
        let unchanged = || PublishOutcome::Unchanged {
            commit_id: location.commit_id.clone(),
        };
        if changes.is_empty() {
            return Ok(unchanged());
        }

        let mut request = CommitRequest {
            branch: location.branch.clone(),
            parent_commit_id: location.commit_id.clone(),
            message: message.to_string(),
            put_files: Vec::new(),
            delete_files: Vec::new(),
        };
        for change in changes {
            match change {
                FileChange::Put { path, content, .. } => request.put_files.push(PutFile {
                    path: path.clone(),
                    content: content.clone(),
                }),
                FileChange::Delete { path, .. } => request.delete_files.push(path.clone()),
            }
        }

        match self.source.commit(&location.repository, &request) {
            Ok(commit_id) => {
                info!(commit = %commit_id, files = changes.len(), "configuration committed");
                Ok(PublishOutcome::Committed { commit_id })
            }
            Err(e) if e.is_no_op() => {
                info!("configuration already up to date");
                Ok(unchanged())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn publish(
        &self,
        organization: &ReconciledOrganization,
        commit_id: &str,
    ) -> Result<PublishedState, ReconcileError> {
        let state = PublishedState {
            published_at: Utc::now(),
            commit_id: commit_id.to_string(),
            accounts: organization.accounts.clone(),
            organizational_units: organization.organizational_units.clone(),
            warnings: organization.warnings.clone(),
        };
        self.state.publish(&state)?;
        info!(
            accounts = state.accounts.len(),
            ous = state.organizational_units.len(),
            "canonical state published"
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::clients::ClientError;

    struct NoOpSource;

    impl SourceControl for NoOpSource {
        fn get_file(&self, _: &str, path: &str, _: &str) -> Result<String, ClientError> {
            Err(ClientError::not_found("get_file", path))
        }

        fn commit(&self, _: &str, _: &CommitRequest) -> Result<String, ClientError> {
            Err(ClientError::no_op("commit", "no changes"))
        }
    }

    #[derive(Default)]
    struct MemoryState(RefCell<Option<PublishedState>>);

    impl StateStore for MemoryState {
        fn load_previous(&self) -> Result<Option<PublishedState>, ClientError> {
            Ok(self.0.borrow().clone())
        }

        fn publish(&self, state: &PublishedState) -> Result<(), ClientError> {
            *self.0.borrow_mut() = Some(state.clone());
            Ok(())
        }
    }

    fn location() -> ConfigLocation {
        ConfigLocation {
            repository: "config".into(),
            branch: "main".into(),
            commit_id: "c1".into(),
            root_path: "config.yaml".into(),
        }
    }

    #[test]
    fn no_op_commit_keeps_the_parent() {
        let state = MemoryState::default();
        let publisher = ResultPublisher::new(&NoOpSource, &state);
        let changes = vec![FileChange::Put {
            path: "config.yaml".into(),
            content: "a: 1\n".into(),
            previous: Some("a: 1\n".into()),
        }];
        let outcome = publisher.commit(&location(), &changes, "update").expect("commit");
        assert_eq!(
            outcome,
            PublishOutcome::Unchanged {
                commit_id: "c1".into()
            }
        );
    }

    #[test]
    fn published_state_carries_the_commit() {
        let state = MemoryState::default();
        let publisher = ResultPublisher::new(&NoOpSource, &state);
        let organization = ReconciledOrganization {
            warnings: vec!["w".into()],
            ..ReconciledOrganization::default()
        };
        publisher.publish(&organization, "c2").expect("publish");
        let stored = state.load_previous().expect("load").expect("state");
        assert_eq!(stored.commit_id, "c2");
        assert_eq!(stored.warnings, vec!["w".to_string()]);
    }
}
