//! Cookie cache configuration.
//!
//! `CookieCacheConfig` tells a [`CookieCache`](crate::store::CookieCache) where its
//! backing document lives and how writes are acknowledged. It is built through a
//! fluent [`CookieCacheConfig::builder()`] that validates the result, or read from
//! the environment with [`CookieCacheConfig::from_env()`].
//!
//! # Examples
//!
//! ```rust
//! use gosub_cookie_cache::config::{CookieCacheConfig, Durability};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = CookieCacheConfig::builder()
//!     .connection("sqlite://cookies.db")
//!     .collection("cookie_jars")
//!     .query_column("user_id")
//!     .durability(Durability::Optimistic)
//!     .build()?; // returns Result<CookieCacheConfig, ConfigError>
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `connection`: repository location, `memory://<name>`, `json://<path>` or `sqlite://<path>`.
//! - `collection`: collection holding the documents (JSON top-level key, SQLite table).
//! - `query_column`: name of the field that addresses a cache's document.
//! - `payload_field`: name of the field that holds the serialized index (default: `cookie`).
//! - `durability`: whether writes wait for the repository (default: [`Durability::Durable`]).
//! - `bootstrap_timeout`: how long construction may wait for the initial load (default: 30s).
//!
//! # Errors
//!
//! Validation returns [`ConfigError`] when one of the first three fields is missing,
//! when a collection or field name is not a plain identifier, or when the connection
//! scheme is unknown. None of this touches the repository.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PAYLOAD_FIELD: &str = "cookie";
const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_CONNECTION: &str = "COOKIE_CACHE_CONNECTION";
pub const ENV_COLLECTION: &str = "COOKIE_CACHE_COLLECTION";
pub const ENV_QUERY_COLUMN: &str = "COOKIE_CACHE_QUERY_COLUMN";

/// How a mutation is acknowledged with respect to the repository write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// The mutating call returns once the repository confirmed the upsert, and
    /// surfaces its error.
    #[default]
    Durable,
    /// The mutating call returns right after the in-memory update. A crash before
    /// the queued upsert lands loses that write; failures are only logged.
    Optimistic,
}

/// Where the document repository lives, parsed from [`CookieCacheConfig::connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryLocation {
    /// Process-local repository, shared by every cache opened with the same name.
    Memory(String),
    /// Single JSON file.
    JsonFile(PathBuf),
    /// SQLite database file.
    Sqlite(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CookieCacheConfig {
    pub connection: String,
    pub collection: String,
    pub query_column: String,
    pub payload_field: String,
    pub durability: Durability,
    pub bootstrap_timeout: Duration,
}

impl CookieCacheConfig {
    pub fn builder() -> CookieCacheConfigBuilder {
        CookieCacheConfigBuilder::default()
    }

    /// Reads the three required options from `COOKIE_CACHE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |name: &str| std::env::var(name).unwrap_or_default();

        Self::builder()
            .connection(var(ENV_CONNECTION))
            .collection(var(ENV_COLLECTION))
            .query_column(var(ENV_QUERY_COLUMN))
            .build()
    }

    /// Checks the configuration without performing any I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate(self)
    }

    /// Like [`validate`](Self::validate), but ignores `connection`. Used when the
    /// repository is supplied by the caller.
    pub fn validate_document(&self) -> Result<(), ConfigError> {
        validate_document(self)
    }

    /// Parses the connection string into a repository location.
    pub fn location(&self) -> Result<RepositoryLocation, ConfigError> {
        parse_location(&self.connection)
    }
}

/// Builder for [`CookieCacheConfig`], mirroring the zone config builder.
#[derive(Debug, Clone)]
pub struct CookieCacheConfigBuilder {
    inner: CookieCacheConfig,
}

impl Default for CookieCacheConfigBuilder {
    fn default() -> Self {
        Self {
            inner: CookieCacheConfig {
                connection: String::new(),
                collection: String::new(),
                query_column: String::new(),
                payload_field: DEFAULT_PAYLOAD_FIELD.to_string(),
                durability: Durability::default(),
                bootstrap_timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
            },
        }
    }
}

impl CookieCacheConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut CookieCacheConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn connection<S: Into<String>>(self, conn: S) -> Self { self.map(|c| c.connection = conn.into()) }
    pub fn collection<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.collection = name.into()) }
    pub fn query_column<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.query_column = name.into()) }
    pub fn payload_field<S: Into<String>>(self, name: S) -> Self { self.map(|c| c.payload_field = name.into()) }
    pub fn durability(self, durability: Durability) -> Self { self.map(|c| c.durability = durability) }
    pub fn bootstrap_timeout(self, timeout: Duration) -> Self { self.map(|c| c.bootstrap_timeout = timeout) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut CookieCacheConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<CookieCacheConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }

    /// Builds a config for a caller-supplied repository; `connection` may be empty.
    pub fn build_without_connection(self) -> Result<CookieCacheConfig, ConfigError> {
        validate_document(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("repository connection is required")]
    MissingConnection,
    #[error("collection name is required")]
    MissingCollection,
    #[error("query column is required")]
    MissingQueryColumn,
    #[error("{what} {name:?} is not a valid identifier (expected [A-Za-z_][A-Za-z0-9_]*)")]
    InvalidIdentifier { what: &'static str, name: String },
    #[error("unsupported repository connection {0:?}")]
    UnsupportedConnection(String),
    #[error("bootstrap_timeout must be greater than zero")]
    ZeroBootstrapTimeout,
}

fn validate(c: &CookieCacheConfig) -> Result<(), ConfigError> {
    if c.connection.trim().is_empty() {
        return Err(ConfigError::MissingConnection);
    }
    validate_document(c)?;
    parse_location(&c.connection)?;
    Ok(())
}

// Everything except the connection: what a cache needs to address its document.
fn validate_document(c: &CookieCacheConfig) -> Result<(), ConfigError> {
    if c.collection.is_empty() {
        return Err(ConfigError::MissingCollection);
    }
    if c.query_column.is_empty() {
        return Err(ConfigError::MissingQueryColumn);
    }

    check_identifier("collection", &c.collection)?;
    check_identifier("query column", &c.query_column)?;
    check_identifier("payload field", &c.payload_field)?;

    if c.query_column == c.payload_field {
        return Err(ConfigError::InvalidIdentifier {
            what: "payload field",
            name: c.payload_field.clone(),
        });
    }
    if c.bootstrap_timeout.is_zero() {
        return Err(ConfigError::ZeroBootstrapTimeout);
    }
    Ok(())
}

// Collection and field names end up as SQL identifiers.
fn check_identifier(what: &'static str, name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid_head = chars
        .next()
        .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');

    if valid_head && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier { what, name: name.to_string() })
    }
}

fn parse_location(conn: &str) -> Result<RepositoryLocation, ConfigError> {
    let conn = conn.trim();
    let unsupported = || ConfigError::UnsupportedConnection(conn.to_string());

    let (scheme, rest) = conn.split_once("://").ok_or_else(unsupported)?;
    if rest.is_empty() {
        return Err(unsupported());
    }

    match scheme {
        "memory" => Ok(RepositoryLocation::Memory(rest.to_string())),
        "json" => Ok(RepositoryLocation::JsonFile(PathBuf::from(rest))),
        "sqlite" if cfg!(feature = "sqlite_store") => Ok(RepositoryLocation::Sqlite(PathBuf::from(rest))),
        _ => Err(unsupported()),
    }
}
