//! Error types for orgsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading, merging or rewriting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration store could not return a file.
    #[error("cannot fetch configuration file {path}: {message}")]
    Fetch { path: String, message: String },

    /// YAML parse error on load, with the file path and serde_yaml's line context.
    #[error("failed to parse {path}: {source}")]
    ParseYaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse {path}: {source}")]
    ParseJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// YAML serialization error (rewrite path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A rename would overwrite an existing entry.
    #[error("cannot rename `{from}` to `{to}` in {section}: target already declared")]
    RenameConflict {
        section: String,
        from: String,
        to: String,
    },
}

impl ConfigError {
    pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}
