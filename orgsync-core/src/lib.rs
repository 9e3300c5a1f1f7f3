//! orgsync core library: domain types, declarative configuration, legacy manifest, errors.
//!
//! - [`types`]: newtypes, live and canonical records, findings
//! - [`config`]: declarative configuration schema and the merged view
//! - [`source`]: split-file workspace (load, rewrite, file changes)
//! - [`legacy`]: bootstrap manifest and account-type inference
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod keyed;
pub mod legacy;
pub mod path;
pub mod source;
pub mod types;

pub use config::{AccountConfig, AccountSection, Configuration, GlobalOptions, OuConfig};
pub use error::ConfigError;
pub use keyed::KeyedMap;
pub use legacy::LegacyConfig;
pub use source::{AccountPatch, ConfigWorkspace, FileChange};
pub use types::{
    Account, AccountId, AccountKey, AccountStatus, DriftKind, DriftRecord, LegacyAccountType,
    LiveAccount, LiveOu, MatchStatus, OrganizationalUnit, OuId, PolicyTarget,
    ReconciledOrganization, Severity, TargetKind, TargetReason,
};
