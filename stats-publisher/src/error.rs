//! Error kinds for configuration, document mapping and publishing
//!
//! The split lets a caller decide programmatically what to do:
//! - `ConfigError` is fatal and only happens at startup
//! - `MappingError` means a snapshot could not become a complete document
//! - `PublishError` covers everything that can go wrong talking to the backend

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Invalid or missing settings detected while building the publisher
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A snapshot or counter that cannot be turned into a complete document
#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    #[error("metric {field} is not a finite number")]
    NonFinite { field: &'static str },
    #[error("counter name is empty")]
    EmptyCounterName,
}

/// Failure of a single publish call
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    /// Connection refused, timeout, TLS failure... The underlying error is kept as `source()`.
    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),
    /// The backend answered with a non-success status
    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },
    /// The backend answered with a body we could not understand
    #[error("malformed backend response: {0}")]
    Response(String),
    #[error("failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PublishError {
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PublishError::Transport(Box::new(err))
    }

    /// Whether trying again on the next cycle has a chance to succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PublishError::Transport(_) => true,
            PublishError::Backend { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        PublishError::transport(err)
    }
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;
