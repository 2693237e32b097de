use std::time::Duration;

use crate::config::ConfigError;
use crate::repository::RepositoryError;

/// Errors surfaced by a [`CookieCache`](crate::store::CookieCache).
#[derive(Debug, thiserror::Error)]
pub enum CookieCacheError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Stored cookie index is malformed: {0}")]
    MalformedIndex(#[source] serde_json::Error),

    #[error("Cannot decode cookie {domain}{path} {name}: {source}")]
    CookieDecode {
        domain: String,
        path: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot encode cookie index: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Bootstrap did not complete within {0:?}")]
    BootstrapTimeout(Duration),

    #[error("Persistence worker is no longer running")]
    PersistenceClosed,
}

pub type Result<T, E = CookieCacheError> = std::result::Result<T, E>;
