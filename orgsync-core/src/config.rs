//! Declarative configuration schema.
//!
//! Only the fields reconciliation reads are typed. Everything else an entry carries is
//! kept in `extra` so that rewriting a file never drops data owned by other tooling.

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use crate::keyed::KeyedMap;
use crate::types::LegacyAccountType;

/// Directive that moves a section's entries into separate files.
pub const LOAD_DIRECTIVE: &str = "__LOAD";

pub const DEFAULT_QUARANTINE_POLICY: &str = "Quarantine-New-Object";
pub const DEFAULT_BASELINE_POLICY: &str = "FullAWSAccess";
pub const DEFAULT_SUSPENDED_OU: &str = "Suspended";

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

/// Serialization format of a configuration file, chosen from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &str) -> Self {
        match path.rsplit_once('.') {
            Some((_, ext)) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Json => "json",
        }
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

fn is_false(value: &bool) -> bool {
    !*value
}

/// `global-options` section.
///
/// Policy and OU names are optional so that rewriting the root file does not spell out
/// defaults the operator never wrote.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalOptions {
    /// Top-level OUs the engine and the guardian leave alone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored_ous: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarantine_policy: Option<String>,
    /// Unrestricted-access policy that is never detached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended_ou: Option<String>,
    /// Policies this configuration deploys. They do not count against a target's limit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scps: Vec<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl GlobalOptions {
    pub fn is_ignored(&self, top_level_ou: &str) -> bool {
        self.ignored_ous.iter().any(|o| o == top_level_ou)
    }

    pub fn quarantine_policy(&self) -> &str {
        self.quarantine_policy.as_deref().unwrap_or(DEFAULT_QUARANTINE_POLICY)
    }

    pub fn baseline_policy(&self) -> &str {
        self.baseline_policy.as_deref().unwrap_or(DEFAULT_BASELINE_POLICY)
    }

    pub fn suspended_ou(&self) -> &str {
        self.suspended_ou.as_deref().unwrap_or(DEFAULT_SUSPENDED_OU)
    }

    pub fn manages_policy(&self, name: &str) -> bool {
        self.scps.iter().any(|p| p == name)
    }

    fn is_empty(&self) -> bool {
        *self == GlobalOptions::default()
    }
}

/// An `organizational-units` entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OuConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scps: Vec<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// A `mandatory-account-configs` or `workload-account-configs` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountConfig {
    pub account_name: String,
    pub email: String,
    /// Top-level OU the account belongs to.
    pub ou: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ou_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landing_zone_account_type: Option<LegacyAccountType>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scps: Vec<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl AccountConfig {
    /// Full OU path, falling back to the bare `ou` name.
    pub fn effective_ou_path(&self) -> &str {
        self.ou_path.as_deref().unwrap_or(&self.ou)
    }
}

/// Which account section an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountSection {
    Mandatory,
    Workload,
}

impl AccountSection {
    pub fn key(&self) -> &'static str {
        match self {
            AccountSection::Mandatory => "mandatory-account-configs",
            AccountSection::Workload => "workload-account-configs",
        }
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// A root-file section: inline entries or a list of files to load them from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Section<V> {
    Load {
        #[serde(rename = "__LOAD")]
        load: Vec<String>,
    },
    Inline(KeyedMap<V>),
}

impl<V> Default for Section<V> {
    fn default() -> Self {
        Section::Inline(KeyedMap::new())
    }
}

impl<V> Section<V> {
    /// Files listed under `__LOAD`, empty for inline sections.
    pub fn load_files(&self) -> &[String] {
        match self {
            Section::Load { load } => load,
            Section::Inline(_) => &[],
        }
    }

    fn is_empty_inline(&self) -> bool {
        matches!(self, Section::Inline(map) if map.is_empty())
    }
}

/// The root configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootDocument {
    #[serde(
        rename = "global-options",
        default,
        skip_serializing_if = "GlobalOptions::is_empty"
    )]
    pub global_options: GlobalOptions,
    #[serde(
        rename = "organizational-units",
        default,
        skip_serializing_if = "Section::is_empty_inline"
    )]
    pub organizational_units: Section<OuConfig>,
    #[serde(
        rename = "mandatory-account-configs",
        default,
        skip_serializing_if = "Section::is_empty_inline"
    )]
    pub mandatory_accounts: Section<AccountConfig>,
    #[serde(
        rename = "workload-account-configs",
        default,
        skip_serializing_if = "Section::is_empty_inline"
    )]
    pub workload_accounts: Section<AccountConfig>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl RootDocument {
    pub fn account_section(&self, section: AccountSection) -> &Section<AccountConfig> {
        match section {
            AccountSection::Mandatory => &self.mandatory_accounts,
            AccountSection::Workload => &self.workload_accounts,
        }
    }

    pub fn account_section_mut(&mut self, section: AccountSection) -> &mut Section<AccountConfig> {
        match section {
            AccountSection::Mandatory => &mut self.mandatory_accounts,
            AccountSection::Workload => &mut self.workload_accounts,
        }
    }
}

// ---------------------------------------------------------------------------
// Merged view
// ---------------------------------------------------------------------------

/// The configuration with every `__LOAD` file merged in, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Configuration {
    pub global_options: GlobalOptions,
    pub organizational_units: KeyedMap<OuConfig>,
    pub mandatory_accounts: KeyedMap<AccountConfig>,
    pub workload_accounts: KeyedMap<AccountConfig>,
}

/// A declared account with its key and section.
#[derive(Debug, Clone, Copy)]
pub struct DeclaredAccount<'a> {
    pub key: &'a str,
    pub config: &'a AccountConfig,
    pub section: AccountSection,
}

impl DeclaredAccount<'_> {
    pub fn is_mandatory(&self) -> bool {
        self.section == AccountSection::Mandatory
    }
}

impl Configuration {
    /// Mandatory accounts first, then workload accounts. Deleted entries are skipped.
    pub fn accounts(&self) -> impl Iterator<Item = DeclaredAccount<'_>> {
        let mandatory = self.mandatory_accounts.iter().map(|(key, config)| DeclaredAccount {
            key,
            config,
            section: AccountSection::Mandatory,
        });
        let workload = self.workload_accounts.iter().map(|(key, config)| DeclaredAccount {
            key,
            config,
            section: AccountSection::Workload,
        });
        mandatory.chain(workload).filter(|a| !a.config.deleted)
    }

    /// Every account, deleted ones included.
    pub fn all_accounts(&self) -> impl Iterator<Item = DeclaredAccount<'_>> {
        let mandatory = self.mandatory_accounts.iter().map(|(key, config)| DeclaredAccount {
            key,
            config,
            section: AccountSection::Mandatory,
        });
        let workload = self.workload_accounts.iter().map(|(key, config)| DeclaredAccount {
            key,
            config,
            section: AccountSection::Workload,
        });
        mandatory.chain(workload)
    }

    pub fn account(&self, key: &str) -> Option<DeclaredAccount<'_>> {
        self.all_accounts().find(|a| a.key == key)
    }

    /// Declared account whose email matches, case-insensitively. Deleted entries included.
    pub fn account_by_email(&self, email: &str) -> Option<DeclaredAccount<'_>> {
        self.all_accounts()
            .find(|a| a.config.email.eq_ignore_ascii_case(email))
    }

    /// Declared OU references: `organizational-units` keys, then workload `ou-path`s,
    /// deduplicated in declaration order.
    pub fn declared_ou_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.organizational_units.keys().map(str::to_string).collect();
        for account in self.accounts().filter(|a| !a.is_mandatory()) {
            let path = account.config.effective_ou_path();
            if !paths.iter().any(|p| p == path) {
                paths.push(path.to_string());
            }
        }
        paths
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
