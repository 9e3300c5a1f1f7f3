//! Domain types shared by every orgsync crate.
//!
//! Live records (`LiveAccount`, `LiveOu`) describe what the organization reports.
//! Canonical records (`Account`, `OrganizationalUnit`) are what reconciliation hands to
//! downstream provisioning steps.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Logical account key as declared in configuration (unique within it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountKey(pub String);

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AccountKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier the platform assigns to an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier the platform assigns to an organizational unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OuId(pub String);

impl fmt::Display for OuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for OuId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OuId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Role of an account in the legacy bootstrap deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LegacyAccountType {
    Primary,
    Security,
    LogArchive,
    SharedServices,
}

impl LegacyAccountType {
    /// Every legacy account type, in the order completeness is checked.
    pub const ALL: [LegacyAccountType; 4] = [
        LegacyAccountType::Primary,
        LegacyAccountType::Security,
        LegacyAccountType::LogArchive,
        LegacyAccountType::SharedServices,
    ];

    /// Infer the type from the name of the parameter that publishes the account id.
    pub fn from_parameter_name(name: &str) -> Option<Self> {
        match name {
            "/org/primary/account_id" => Some(LegacyAccountType::Primary),
            "/org/member/security/account_id" => Some(LegacyAccountType::Security),
            "/org/member/logging/account_id" => Some(LegacyAccountType::LogArchive),
            "/org/member/sharedservices/account_id" => Some(LegacyAccountType::SharedServices),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LegacyAccountType::Primary => "primary",
            LegacyAccountType::Security => "security",
            LegacyAccountType::LogArchive => "log-archive",
            LegacyAccountType::SharedServices => "shared-services",
        }
    }
}

impl fmt::Display for LegacyAccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status as reported by the organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    #[default]
    Active,
    Suspended,
    PendingClosure,
}

/// Finding severity. Errors block the workflow, warnings never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Classification of a discrepancy between configuration and the organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftKind {
    RenamedAccount,
    RenamedOu,
    MissingOu,
    UnmanagedAccount,
    SuspendedAccount,
    MissingLegacyAccount,
    DuplicateEmail,
    AmbiguousOu,
    OuMembershipMismatch,
    NameMismatch,
    LegacyMismatch,
    OuCountMismatch,
    UnknownLegacyAccountType,
    StaleAccountRecord,
    IgnoredOuAccount,
    PolicyLimitExceeded,
}

impl fmt::Display for DriftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DriftKind::RenamedAccount => "renamed-account",
            DriftKind::RenamedOu => "renamed-ou",
            DriftKind::MissingOu => "missing-ou",
            DriftKind::UnmanagedAccount => "unmanaged-account",
            DriftKind::SuspendedAccount => "suspended-account",
            DriftKind::MissingLegacyAccount => "missing-legacy-account",
            DriftKind::DuplicateEmail => "duplicate-email",
            DriftKind::AmbiguousOu => "ambiguous-ou",
            DriftKind::OuMembershipMismatch => "ou-membership-mismatch",
            DriftKind::NameMismatch => "name-mismatch",
            DriftKind::LegacyMismatch => "legacy-mismatch",
            DriftKind::OuCountMismatch => "ou-count-mismatch",
            DriftKind::UnknownLegacyAccountType => "unknown-legacy-account-type",
            DriftKind::StaleAccountRecord => "stale-account-record",
            DriftKind::IgnoredOuAccount => "ignored-ou-account",
            DriftKind::PolicyLimitExceeded => "policy-limit-exceeded",
        };
        f.write_str(label)
    }
}

/// Per-account reconciliation status. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStatus {
    #[default]
    Unvalidated,
    Matched,
    MissingInOrg,
    RenamedDetected,
    Mismatched,
}

// ---------------------------------------------------------------------------
// Live organization records
// ---------------------------------------------------------------------------

/// An account as the organization reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LiveAccount {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub status: AccountStatus,
    /// Root id or OU id the account sits under.
    pub parent_id: String,
}

impl LiveAccount {
    pub fn is_suspended(&self) -> bool {
        self.status == AccountStatus::Suspended
    }
}

/// An organizational unit with its computed path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LiveOu {
    pub id: OuId,
    pub name: String,
    pub parent_id: String,
    pub path: String,
}

impl LiveOu {
    pub fn is_top_level(&self) -> bool {
        self.path == self.name
    }
}

// ---------------------------------------------------------------------------
// Canonical records
// ---------------------------------------------------------------------------

/// Canonical account record handed to downstream provisioning steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub key: AccountKey,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cloud_id: Option<AccountId>,
    pub name: String,
    pub email: String,
    /// Top-level OU name the account is declared under.
    pub organizational_unit: String,
    pub organizational_unit_path: String,
    pub is_mandatory: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub legacy_account_type: Option<LegacyAccountType>,
}

/// Canonical organizational unit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationalUnit {
    pub id: OuId,
    pub name: String,
    pub logical_key: String,
    pub path: String,
}

/// A single reconciliation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftRecord {
    pub kind: DriftKind,
    pub severity: Severity,
    pub subject_key: String,
    pub message: String,
}

impl DriftRecord {
    pub fn error(kind: DriftKind, subject_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            subject_key: subject_key.into(),
            message: message.into(),
        }
    }

    pub fn warning(
        kind: DriftKind,
        subject_key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            subject_key: subject_key.into(),
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for DriftRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.kind, self.message)
    }
}

/// What a guard-rail target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    Account,
    OrganizationalUnit,
}

/// Why a target landed in the governed or the quarantined set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetReason {
    /// Top-level OU declared in configuration.
    Declared,
    /// Top-level OU listed in `ignored-ous`.
    Ignored,
    /// Top-level OU absent from configuration.
    Undeclared,
    /// Account directly under the root.
    RootAccount,
    /// The suspended-accounts OU.
    Suspended,
}

/// A guard-rail target with its governance verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTarget {
    pub target_id: String,
    pub name: String,
    pub kind: TargetKind,
    pub governed: bool,
    pub reason: TargetReason,
}

/// Canonical result of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledOrganization {
    pub accounts: Vec<Account>,
    pub organizational_units: Vec<OrganizationalUnit>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
