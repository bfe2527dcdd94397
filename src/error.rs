use std::path::PathBuf;

use thiserror::Error;

pub type SourceResult<T> = Result<T, SourceError>;
pub type TargetResult<T> = Result<T, TargetError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API token is invalid or unauthorized")]
    Unauthorized,

    #[error("rate limited, retry after {retry_after:?}s")]
    RateLimited { retry_after: Option<u64> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AnkiConnect error for action '{action}': {message}")]
    Api { action: String, message: String },

    #[error("note type '{0}' does not exist")]
    MissingTemplate(String),

    #[error("note type '{template}' has no field named '{field}'")]
    MissingField { template: String, field: String },
}

impl TargetError {
    /// Missing templates and fields are only fixed by the user, never by retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingTemplate(_) | Self::MissingField { .. })
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write checkpoint {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error")]
    Configuration(#[source] TargetError),

    #[error("source credentials rejected")]
    Authentication(#[source] SourceError),

    #[error("failed to fetch highlights")]
    Fetch(#[source] SourceError),

    #[error("flashcard application is unreachable")]
    TargetUnavailable,

    #[error("failed to prepare flashcard environment")]
    Environment(#[source] TargetError),

    #[error("checkpoint store failed")]
    Checkpoint(#[from] CheckpointError),
}
