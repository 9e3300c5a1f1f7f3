//! Directory-backed source control.
//!
//! The working tree of a directory is the only revision. Its commit id is a SHA-256
//! fingerprint over every file path and content, so an unchanged tree keeps its id.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::clients::{ClientError, CommitRequest, SourceControl};
use crate::error::{io_err, ReconcileError};

/// Write `content` to `<path>.tmp`, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<(), ReconcileError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    std::fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LocalRepository {
    name: String,
    dir: PathBuf,
}

impl LocalRepository {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fingerprint of the current tree.
    pub fn head(&self) -> Result<String, ReconcileError> {
        let mut files = Vec::new();
        collect_files(&self.dir, &self.dir, &mut files)?;
        files.sort();
        let mut hasher = Sha256::new();
        for relative in &files {
            let full = self.dir.join(relative);
            let content = std::fs::read(&full).map_err(|e| io_err(&full, e))?;
            hasher.update(relative.as_bytes());
            hasher.update([0u8]);
            hasher.update(&content);
            hasher.update([0u8]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn check(&self, operation: &str, repository: &str, commit_id: &str) -> Result<(), ClientError> {
        if repository != self.name {
            return Err(ClientError::not_found(operation, format!("repository {repository}")));
        }
        let head = self
            .head()
            .map_err(|e| ClientError::failed(operation, e.to_string()))?;
        if commit_id != head {
            return Err(ClientError::failed(
                operation,
                format!("commit {commit_id} is not the head of {repository} ({head})"),
            ));
        }
        Ok(())
    }

    fn changes_anything(&self, request: &CommitRequest) -> bool {
        let puts = request.put_files.iter().any(|file| {
            std::fs::read_to_string(self.dir.join(&file.path))
                .map_or(true, |existing| existing != file.content)
        });
        let deletes = request
            .delete_files
            .iter()
            .any(|path| self.dir.join(path).exists());
        puts || deletes
    }
}

/// Relative paths of every regular file under `dir`, skipping hidden entries.
fn collect_files(base: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), ReconcileError> {
    if !dir.exists() {
        return Ok(());
    }
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(base) {
            let relative: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(relative.join("/"));
        }
    }
    Ok(())
}

impl SourceControl for LocalRepository {
    fn get_file(&self, repository: &str, path: &str, commit_id: &str) -> Result<String, ClientError> {
        self.check("get_file", repository, commit_id)?;
        let full = self.dir.join(path);
        if !full.exists() {
            return Err(ClientError::not_found("get_file", path));
        }
        std::fs::read_to_string(&full).map_err(|e| ClientError::failed("get_file", format!("{path}: {e}")))
    }

    fn commit(&self, repository: &str, request: &CommitRequest) -> Result<String, ClientError> {
        self.check("commit", repository, &request.parent_commit_id)?;
        if !self.changes_anything(request) {
            return Err(ClientError::no_op("commit", "no changes"));
        }

        for file in &request.put_files {
            write_atomic(&self.dir.join(&file.path), &file.content)
                .map_err(|e| ClientError::failed("commit", e.to_string()))?;
            debug!(path = %file.path, "wrote file");
        }
        for path in &request.delete_files {
            let full = self.dir.join(path);
            if full.exists() {
                std::fs::remove_file(&full)
                    .map_err(|e| ClientError::failed("commit", format!("{path}: {e}")))?;
                debug!(path = %path, "deleted file");
            }
        }

        let head = self
            .head()
            .map_err(|e| ClientError::failed("commit", e.to_string()))?;
        info!(
            branch = %request.branch,
            commit = %head,
            files = request.put_files.len() + request.delete_files.len(),
            message = %request.message,
            "committed configuration"
        );
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::clients::PutFile;

    fn repo() -> (TempDir, LocalRepository) {
        let tmp = TempDir::new().expect("tmp");
        std::fs::write(tmp.path().join("config.yaml"), "organizational-units: {}\n").expect("seed");
        let repo = LocalRepository::new("config", tmp.path());
        (tmp, repo)
    }

    fn request(parent: String, put: &str, delete: &[&str]) -> CommitRequest {
        CommitRequest {
            branch: "main".into(),
            parent_commit_id: parent,
            message: "update".into(),
            put_files: vec![PutFile {
                path: "config.yaml".into(),
                content: put.into(),
            }],
            delete_files: delete.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn head_is_stable_for_an_unchanged_tree() {
        let (_tmp, repo) = repo();
        assert_eq!(repo.head().expect("head"), repo.head().expect("head"));
    }

    #[test]
    fn commit_writes_and_moves_the_head() {
        let (tmp, repo) = repo();
        let before = repo.head().expect("head");
        let after = repo
            .commit("config", &request(before.clone(), "organizational-units:\n  core: {}\n", &[]))
            .expect("commit");
        assert_ne!(before, after);
        let content = repo.get_file("config", "config.yaml", &after).expect("read");
        assert!(content.contains("core"));
        assert!(!tmp.path().join("config.yaml.tmp").exists());
    }

    #[test]
    fn identical_content_is_a_no_op() {
        let (_tmp, repo) = repo();
        let head = repo.head().expect("head");
        let err = repo
            .commit("config", &request(head, "organizational-units: {}\n", &["missing.yaml"]))
            .unwrap_err();
        assert!(err.is_no_op());
    }

    #[test]
    fn stale_parent_is_rejected() {
        let (_tmp, repo) = repo();
        let err = repo
            .commit("config", &request("0000".into(), "x: 1\n", &[]))
            .unwrap_err();
        assert!(!err.is_no_op());
    }
}
