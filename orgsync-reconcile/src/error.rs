//! Error types for orgsync-reconcile.

use std::path::PathBuf;

use thiserror::Error;

use orgsync_core::ConfigError;

use crate::clients::ClientError;

/// All errors that can arise from a reconciliation run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Configuration could not be loaded or rewritten.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A collaborator call failed outside of best-effort correction.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Every fatal finding of one validation pass, in encounter order.
    #[error("There were errors while loading the configuration:\n{}", messages.join("\n"))]
    Validation { messages: Vec<String> },

    #[error("the organization reports no root")]
    NoRoot,

    /// The quarantine policy is provisioned elsewhere and must already exist.
    #[error("quarantine policy \"{name}\" does not exist in the organization")]
    QuarantinePolicyMissing { name: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// `dirs::home_dir()` returned `None`, so `~/.orgsync/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Convenience constructor for [`ReconcileError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ReconcileError {
    ReconcileError::Io {
        path: path.into(),
        source,
    }
}
