//! Split configuration workspace.
//!
//! # Layout
//!
//! ```text
//! <repo>/
//!   config.yaml                      (root: global-options + sections, inline or __LOAD)
//!   organizational-units/core.yaml   (one flat `key -> entry` mapping per loaded file)
//!   accounts/workloads.yaml
//! ```
//!
//! A [`ConfigWorkspace`] keeps every file it loaded, remembers which file declares each
//! entry, and records the edits drift correction makes so that [`ConfigWorkspace::changes`]
//! can hand back exactly the files to put and delete.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::{
    AccountConfig, AccountSection, ConfigFormat, Configuration, GlobalOptions, OuConfig,
    RootDocument, Section,
};
use crate::error::ConfigError;
use crate::keyed::KeyedMap;
use crate::path;

// ---------------------------------------------------------------------------
// 1. File model
// ---------------------------------------------------------------------------

/// One file listed under a section's `__LOAD`.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitFile<V> {
    pub path: String,
    pub entries: KeyedMap<V>,
    dirty: bool,
}

/// A file write or removal produced by rewriting the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Put {
        path: String,
        content: String,
        /// Text loaded from this path, if the file existed.
        previous: Option<String>,
    },
    Delete {
        path: String,
        previous: Option<String>,
    },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            FileChange::Put { path, .. } | FileChange::Delete { path, .. } => path,
        }
    }
}

/// Field updates for one declared account. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub ou: Option<String>,
    pub ou_path: Option<String>,
    pub deleted: Option<bool>,
}

impl AccountPatch {
    /// Apply to `config`, returning whether anything changed.
    pub fn apply(&self, config: &mut AccountConfig) -> bool {
        let mut changed = false;
        if let Some(name) = &self.name {
            changed |= replace(&mut config.account_name, name);
        }
        if let Some(email) = &self.email {
            changed |= replace(&mut config.email, email);
        }
        if let Some(ou) = &self.ou {
            changed |= replace(&mut config.ou, ou);
        }
        if let Some(ou_path) = &self.ou_path {
            if config.ou_path.as_deref() != Some(ou_path.as_str()) {
                config.ou_path = Some(ou_path.clone());
                changed = true;
            }
        }
        if let Some(deleted) = self.deleted {
            if config.deleted != deleted {
                config.deleted = deleted;
                changed = true;
            }
        }
        changed
    }
}

fn replace(slot: &mut String, value: &str) -> bool {
    if slot == value {
        return false;
    }
    *slot = value.to_string();
    true
}

// ---------------------------------------------------------------------------
// 2. Workspace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConfigWorkspace {
    root_path: String,
    root: RootDocument,
    root_dirty: bool,
    ou_files: Vec<SplitFile<OuConfig>>,
    mandatory_files: Vec<SplitFile<AccountConfig>>,
    workload_files: Vec<SplitFile<AccountConfig>>,
    deleted: Vec<String>,
    originals: BTreeMap<String, String>,
}

impl ConfigWorkspace {
    /// Load the root file and every `__LOAD` file through `fetch`, which maps a
    /// repository-relative path to its contents.
    pub fn load_with<F>(root_path: &str, mut fetch: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Result<String, ConfigError>,
    {
        let mut originals = BTreeMap::new();
        let root_text = fetch(root_path)?;
        let root: RootDocument = parse(root_path, &root_text)?;
        originals.insert(root_path.to_string(), root_text);

        let ou_files = load_section(
            "organizational-units",
            &root.organizational_units,
            &mut fetch,
            &mut originals,
        )?;
        let mandatory_files = load_section(
            AccountSection::Mandatory.key(),
            &root.mandatory_accounts,
            &mut fetch,
            &mut originals,
        )?;
        let workload_files = load_section(
            AccountSection::Workload.key(),
            &root.workload_accounts,
            &mut fetch,
            &mut originals,
        )?;

        debug!(
            root = root_path,
            files = originals.len(),
            "loaded configuration workspace"
        );
        Ok(Self {
            root_path: root_path.to_string(),
            root,
            root_dirty: false,
            ou_files,
            mandatory_files,
            workload_files,
            deleted: Vec::new(),
            originals,
        })
    }

    /// Load from a directory on disk.
    pub fn load_dir_at(dir: &Path, root_path: &str) -> Result<Self, ConfigError> {
        Self::load_with(root_path, |relative| {
            let full = dir.join(relative);
            std::fs::read_to_string(&full).map_err(|e| ConfigError::io_err(full, e))
        })
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn root(&self) -> &RootDocument {
        &self.root
    }

    pub fn global_options(&self) -> &GlobalOptions {
        &self.root.global_options
    }

    /// Text of `path` as loaded, before any rewrite.
    pub fn original(&self, path: &str) -> Option<&str> {
        self.originals.get(path).map(String::as_str)
    }

    /// Every section merged into one view, in declaration order. A key declared by more
    /// than one file keeps its first position and takes the last file's entry.
    pub fn merged(&self) -> Configuration {
        Configuration {
            global_options: self.root.global_options.clone(),
            organizational_units: merge_section(&self.root.organizational_units, &self.ou_files),
            mandatory_accounts: merge_section(&self.root.mandatory_accounts, &self.mandatory_files),
            workload_accounts: merge_section(&self.root.workload_accounts, &self.workload_files),
        }
    }

    /// Files that declare the account `key`.
    pub fn files_declaring_account(&self, key: &str) -> Vec<&str> {
        let mut out = Vec::new();
        for section in [AccountSection::Mandatory, AccountSection::Workload] {
            let (inline, files) = match section {
                AccountSection::Mandatory => (&self.root.mandatory_accounts, &self.mandatory_files),
                AccountSection::Workload => (&self.root.workload_accounts, &self.workload_files),
            };
            match inline {
                Section::Inline(map) if map.contains_key(key) => out.push(self.root_path.as_str()),
                Section::Inline(_) => {}
                Section::Load { .. } => out.extend(
                    files
                        .iter()
                        .filter(|f| f.entries.contains_key(key))
                        .map(|f| f.path.as_str()),
                ),
            }
        }
        out
    }

    // -----------------------------------------------------------------------
    // 3. Rewrites
    // -----------------------------------------------------------------------

    /// Apply `patch` to the account `key` in every file that declares it.
    pub fn update_account(&mut self, key: &str, patch: &AccountPatch) -> bool {
        let mut changed = false;
        for section in [AccountSection::Mandatory, AccountSection::Workload] {
            let (inline, files, root_dirty) = self.account_parts_mut(section);
            changed |= edit_entry(inline, files, root_dirty, key, |config| patch.apply(config));
        }
        if changed {
            debug!(account = key, "account entry rewritten");
        }
        changed
    }

    /// Move configuration keyed by OU path `old` (and everything below it) to `new`.
    ///
    /// Rewrites `organizational-units` keys, re-points account `ou`/`ou-path` fields, and
    /// relocates an OU's dedicated file to its path-derived name, scheduling the old file
    /// for deletion.
    pub fn rename_ou(&mut self, old: &str, new: &str) -> Result<bool, ConfigError> {
        if old == new {
            return Ok(false);
        }
        let mut changed = self.rename_ou_keys(old, new)?;

        for section in [AccountSection::Mandatory, AccountSection::Workload] {
            let (inline, files, root_dirty) = self.account_parts_mut(section);
            let keys: Vec<String> = section_keys(inline, files);
            for key in keys {
                changed |= edit_entry(inline, files, root_dirty, &key, |config| {
                    repoint_account(config, old, new)
                });
            }
        }
        if changed {
            debug!(from = old, to = new, "organizational unit renamed in configuration");
        }
        Ok(changed)
    }

    fn rename_ou_keys(&mut self, old: &str, new: &str) -> Result<bool, ConfigError> {
        let section_name = "organizational-units";
        let mut renames: Vec<(String, String)> = Vec::new();
        let existing: HashSet<String> = section_keys(&self.root.organizational_units, &self.ou_files)
            .into_iter()
            .collect();
        for key in &existing {
            if let Some(rebased) = rebase(key, old, new) {
                renames.push((key.clone(), rebased));
            }
        }
        renames.sort();
        for (from, to) in &renames {
            if existing.contains(to) && !renames.iter().any(|(f, _)| f == to) {
                return Err(ConfigError::RenameConflict {
                    section: section_name.to_string(),
                    from: from.clone(),
                    to: to.clone(),
                });
            }
        }
        if renames.is_empty() {
            return Ok(false);
        }

        // Deepest keys first so a parent rename never collides with a child's new key.
        renames.reverse();
        match &mut self.root.organizational_units {
            Section::Inline(map) => {
                for (from, to) in &renames {
                    map.rename_key(from, to);
                }
                self.root_dirty = true;
            }
            Section::Load { load } => {
                for file in &mut self.ou_files {
                    for (from, to) in &renames {
                        if file.entries.rename_key(from, to) {
                            file.dirty = true;
                        }
                    }
                    if let Some((from, to)) = renames
                        .iter()
                        .find(|(_, to)| file.entries.len() == 1 && file.entries.contains_key(to))
                    {
                        if let Some(target) = relocated_path(&file.path, from, to) {
                            for entry in load.iter_mut().filter(|p| **p == file.path) {
                                *entry = target.clone();
                            }
                            self.deleted.retain(|p| p != &target);
                            if !self.deleted.contains(&file.path) {
                                self.deleted.push(file.path.clone());
                            }
                            debug!(from = %file.path, to = %target, "relocating OU file");
                            file.path = target;
                            file.dirty = true;
                            self.root_dirty = true;
                        }
                    }
                }
            }
        }
        Ok(true)
    }

    fn account_parts_mut(
        &mut self,
        section: AccountSection,
    ) -> (
        &mut Section<AccountConfig>,
        &mut Vec<SplitFile<AccountConfig>>,
        &mut bool,
    ) {
        match section {
            AccountSection::Mandatory => (
                &mut self.root.mandatory_accounts,
                &mut self.mandatory_files,
                &mut self.root_dirty,
            ),
            AccountSection::Workload => (
                &mut self.root.workload_accounts,
                &mut self.workload_files,
                &mut self.root_dirty,
            ),
        }
    }

    // -----------------------------------------------------------------------
    // 4. Output
    // -----------------------------------------------------------------------

    pub fn has_changes(&self) -> bool {
        self.root_dirty
            || !self.deleted.is_empty()
            || self.ou_files.iter().any(|f| f.dirty)
            || self.mandatory_files.iter().any(|f| f.dirty)
            || self.workload_files.iter().any(|f| f.dirty)
    }

    /// Files to write and delete, root first, deletions last.
    pub fn changes(&self) -> Result<Vec<FileChange>, ConfigError> {
        let mut out = Vec::new();
        if self.root_dirty {
            out.push(self.put(&self.root_path, &self.root)?);
        }
        for file in self.ou_files.iter().filter(|f| f.dirty) {
            out.push(self.put(&file.path, &file.entries)?);
        }
        for file in self.mandatory_files.iter().chain(&self.workload_files).filter(|f| f.dirty) {
            out.push(self.put(&file.path, &file.entries)?);
        }
        for path in &self.deleted {
            out.push(FileChange::Delete {
                path: path.clone(),
                previous: self.originals.get(path).cloned(),
            });
        }
        Ok(out)
    }

    fn put<T: Serialize>(&self, path: &str, value: &T) -> Result<FileChange, ConfigError> {
        Ok(FileChange::Put {
            path: path.to_string(),
            content: render(ConfigFormat::from_path(path), value)?,
            previous: self.originals.get(path).cloned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn parse<T: DeserializeOwned>(path: &str, contents: &str) -> Result<T, ConfigError> {
    match ConfigFormat::from_path(path) {
        ConfigFormat::Json => serde_json::from_str(contents).map_err(|source| ConfigError::ParseJson {
            path: path.to_string(),
            source,
        }),
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|source| ConfigError::ParseYaml {
            path: path.to_string(),
            source,
        }),
    }
}

/// Serialize in the given format, always ending with a newline.
pub fn render<T: Serialize>(format: ConfigFormat, value: &T) -> Result<String, ConfigError> {
    match format {
        ConfigFormat::Json => {
            let mut text = serde_json::to_string_pretty(value)?;
            text.push('\n');
            Ok(text)
        }
        ConfigFormat::Yaml => Ok(serde_yaml::to_string(value)?),
    }
}

fn load_section<V, F>(
    section_name: &str,
    section: &Section<V>,
    fetch: &mut F,
    originals: &mut BTreeMap<String, String>,
) -> Result<Vec<SplitFile<V>>, ConfigError>
where
    V: DeserializeOwned,
    F: FnMut(&str) -> Result<String, ConfigError>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut files = Vec::new();
    for file_path in section.load_files() {
        let text = fetch(file_path.as_str())?;
        let entries: KeyedMap<V> = parse(file_path, &text)?;
        for key in entries.keys() {
            if !seen.insert(key.to_string()) {
                debug!(section = section_name, key, path = %file_path, "key declared in more than one file");
            }
        }
        originals.insert(file_path.clone(), text);
        files.push(SplitFile {
            path: file_path.clone(),
            entries,
            dirty: false,
        });
    }
    Ok(files)
}

fn merge_section<V: Clone>(section: &Section<V>, files: &[SplitFile<V>]) -> KeyedMap<V> {
    match section {
        Section::Inline(map) => map.clone(),
        Section::Load { .. } => files
            .iter()
            .flat_map(|f| f.entries.iter().map(|(k, v)| (k.to_string(), v.clone())))
            .collect(),
    }
}

fn section_keys<V>(section: &Section<V>, files: &[SplitFile<V>]) -> Vec<String> {
    match section {
        Section::Inline(map) => map.keys().map(str::to_string).collect(),
        Section::Load { .. } => files
            .iter()
            .flat_map(|f| f.entries.keys().map(str::to_string))
            .collect(),
    }
}

fn edit_entry<V>(
    section: &mut Section<V>,
    files: &mut [SplitFile<V>],
    root_dirty: &mut bool,
    key: &str,
    mut edit: impl FnMut(&mut V) -> bool,
) -> bool {
    let mut changed = false;
    match section {
        Section::Inline(map) => {
            if let Some(entry) = map.get_mut(key) {
                if edit(entry) {
                    *root_dirty = true;
                    changed = true;
                }
            }
        }
        Section::Load { .. } => {
            for file in files.iter_mut() {
                if let Some(entry) = file.entries.get_mut(key) {
                    if edit(entry) {
                        file.dirty = true;
                        changed = true;
                    }
                }
            }
        }
    }
    changed
}

/// `path` with the `old` prefix swapped for `new`, if `path` lies at or under `old`.
fn rebase(path: &str, old: &str, new: &str) -> Option<String> {
    if path == old {
        return Some(new.to_string());
    }
    path.strip_prefix(old)
        .filter(|rest| rest.starts_with(path::SEPARATOR))
        .map(|rest| format!("{new}{rest}"))
}

fn repoint_account(config: &mut AccountConfig, old: &str, new: &str) -> bool {
    let Some(rebased) = rebase(config.effective_ou_path(), old, new) else {
        return false;
    };
    let patch = AccountPatch {
        ou: Some(path::top_level(&rebased).to_string()),
        ou_path: config.ou_path.as_ref().map(|_| rebased.clone()),
        ..AccountPatch::default()
    };
    patch.apply(config)
}

/// New location for an OU's dedicated file, when its name was derived from the old path.
fn relocated_path(file_path: &str, old_key: &str, new_key: &str) -> Option<String> {
    let (dir, file_name) = match file_path.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, file_path),
    };
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem != path::file_stem(old_key) {
        return None;
    }
    let renamed = format!("{}.{ext}", path::file_stem(new_key));
    Some(match dir {
        Some(dir) => format!("{dir}/{renamed}"),
        None => renamed,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace(files: &[(&str, &str)]) -> ConfigWorkspace {
        let files: BTreeMap<String, String> = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect();
        ConfigWorkspace::load_with("config.yaml", |p| {
            files.get(p).cloned().ok_or_else(|| ConfigError::Fetch {
                path: p.to_string(),
                message: "missing".into(),
            })
        })
        .expect("load")
    }

    #[test]
    fn rebase_only_matches_whole_segments() {
        assert_eq!(rebase("core/dev", "core", "base").as_deref(), Some("base/dev"));
        assert_eq!(rebase("core", "core", "base").as_deref(), Some("base"));
        assert_eq!(rebase("corex/dev", "core", "base"), None);
    }

    #[test]
    fn relocated_path_follows_the_key() {
        assert_eq!(
            relocated_path("organizational-units/Infra_Net.yaml", "Infra/Net", "Infra/Network")
                .as_deref(),
            Some("organizational-units/Infra_Network.yaml")
        );
        assert_eq!(relocated_path("ous/shared.yaml", "core", "base"), None);
    }

    #[test]
    fn untouched_workspace_has_no_changes() {
        let ws = workspace(&[(
            "config.yaml",
            "mandatory-account-configs:\n  sec:\n    account-name: Security\n    email: sec@x.io\n    ou: core\n",
        )]);
        assert!(!ws.has_changes());
        assert!(ws.changes().expect("changes").is_empty());
    }

    #[test]
    fn patch_reports_no_change_when_values_match() {
        let ws = workspace(&[(
            "config.yaml",
            "mandatory-account-configs:\n  sec:\n    account-name: Security\n    email: sec@x.io\n    ou: core\n",
        )]);
        let mut ws = ws;
        let patch = AccountPatch {
            name: Some("Security".into()),
            ..AccountPatch::default()
        };
        assert!(!ws.update_account("sec", &patch));
        assert!(!ws.has_changes());
    }
}
