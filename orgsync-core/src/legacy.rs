//! Legacy bootstrap manifest.
//!
//! The bootstrap deployment predates the declarative configuration. It lists OUs and the
//! core accounts under each; an account's role is only recoverable from the parameter
//! that publishes its id.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::LegacyAccountType;

/// Placeholder value marking the parameter that receives the account id.
pub const ACCOUNT_ID_PLACEHOLDER: &str = "$[AccountId]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsmParameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyAccount {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub ssm_parameters: Vec<SsmParameter>,
}

impl LegacyAccount {
    /// Role inferred from the parameter whose value is [`ACCOUNT_ID_PLACEHOLDER`].
    pub fn account_type(&self) -> Option<LegacyAccountType> {
        self.ssm_parameters
            .iter()
            .find(|p| p.value == ACCOUNT_ID_PLACEHOLDER)
            .and_then(|p| LegacyAccountType::from_parameter_name(&p.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyOu {
    pub name: String,
    #[serde(default)]
    pub core_accounts: Vec<LegacyAccount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LegacyConfig {
    #[serde(default)]
    pub organizational_units: Vec<LegacyOu>,
}

impl LegacyConfig {
    /// Parse a manifest; `path` only annotates errors.
    pub fn parse(path: &str, contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|source| ConfigError::ParseYaml {
            path: path.to_string(),
            source,
        })
    }

    pub fn ou_names(&self) -> Vec<&str> {
        self.organizational_units.iter().map(|o| o.name.as_str()).collect()
    }
}
