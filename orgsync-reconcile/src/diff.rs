//! Unified diffs of proposed configuration rewrites for `orgsync plan`.

use similar::TextDiff;

use orgsync_core::FileChange;

/// A single configuration file diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub unified_diff: String,
}

/// Diff every change against the content it replaces. Unchanged puts are skipped.
pub fn config_diffs(changes: &[FileChange]) -> Vec<FileDiff> {
    let mut diffs = Vec::new();
    for change in changes {
        let (before, after) = match change {
            FileChange::Put { content, previous, .. } => (
                normalize_line_endings(previous.as_deref().unwrap_or("")),
                normalize_line_endings(content),
            ),
            FileChange::Delete { previous, .. } => (
                normalize_line_endings(previous.as_deref().unwrap_or("")),
                String::new(),
            ),
        };
        if before == after {
            continue;
        }

        let old_header = format!("a/{}", change.path());
        let new_header = format!("b/{}", change.path());
        let unified = TextDiff::from_lines(&before, &after)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string();
        diffs.push(FileDiff {
            path: change.path().to_string(),
            unified_diff: unified,
        });
    }
    diffs
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}
