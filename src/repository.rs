//! Document repository infrastructure.
//!
//! A **document repository** is the durable side of a cookie cache: a collection
//! of documents, each addressed by the value of one identifier field. A cache
//! owns exactly one document, `{ <query column>: <id>, <payload field>: <blob> }`,
//! and only ever needs two operations on it:
//! - [`DocumentRepository::find_one`] when the cache is constructed;
//! - [`DocumentRepository::upsert`] after every mutation.
//!
//! Both are asynchronous so backends can do real I/O without blocking the
//! runtime. This module exports three implementations:
//! - [`InMemoryRepository`]: process-local, for tests and ephemeral caches.
//! - [`JsonFileRepository`]: one JSON file for all collections.
//! - [`SqliteRepository`]: SQLite-backed, one table per collection.
//!
//! [`open_repository`] picks one of them from a [`CookieCacheConfig`].
mod in_memory;
mod json;
#[cfg(feature = "sqlite_store")]
mod sqlite;

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::config::{CookieCacheConfig, RepositoryLocation};

/// Process-local repository.
pub use in_memory::InMemoryRepository;
/// File-backed JSON repository.
pub use json::JsonFileRepository;
/// SQLite-backed repository.
#[cfg(feature = "sqlite_store")]
pub use sqlite::SqliteRepository;

/// A handle to a document repository.
pub type RepositoryHandle = Arc<dyn DocumentRepository>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "sqlite_store")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] r2d2_sqlite::rusqlite::Error),

    #[cfg(feature = "sqlite_store")]
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Document {field}={id} has no usable {payload_field:?} field")]
    MalformedDocument {
        field: String,
        id: String,
        payload_field: String,
    },

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Repository unavailable: {0}")]
    Unavailable(String),
}

impl From<tokio::task::JoinError> for RepositoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        RepositoryError::Task(err.to_string())
    }
}

/// Selects a single document: `field == value`, projecting `payload_field`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentFilter {
    pub field: String,
    pub value: String,
    pub payload_field: String,
}

/// A stored document: the identifier and the opaque payload blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub field: String,
    pub id: String,
    pub payload_field: String,
    pub payload: String,
}

impl Document {
    /// Document shape as persisted: `{ <field>: <id>, <payload_field>: <payload> }`.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.field.clone(), Value::String(self.id.clone()));
        map.insert(self.payload_field.clone(), Value::String(self.payload.clone()));
        Value::Object(map)
    }

    /// Projects a stored JSON document through `filter`.
    ///
    /// Returns `Ok(None)` when the document is not the one addressed by `filter`.
    pub fn from_json(value: &Value, filter: &DocumentFilter) -> Result<Option<Self>, RepositoryError> {
        if !filter.matches(value) {
            return Ok(None);
        }

        match value.get(&filter.payload_field) {
            Some(Value::String(payload)) => Ok(Some(filter.document(payload.clone()))),
            _ => Err(filter.malformed()),
        }
    }
}

impl DocumentFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>, payload_field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            payload_field: payload_field.into(),
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        value.get(&self.field).and_then(Value::as_str) == Some(self.value.as_str())
    }

    /// The document this filter addresses, carrying `payload`.
    pub fn document(&self, payload: String) -> Document {
        Document {
            field: self.field.clone(),
            id: self.value.clone(),
            payload_field: self.payload_field.clone(),
            payload,
        }
    }

    pub(crate) fn malformed(&self) -> RepositoryError {
        RepositoryError::MalformedDocument {
            field: self.field.clone(),
            id: self.value.clone(),
            payload_field: self.payload_field.clone(),
        }
    }
}

/// A key-value document store addressed by an identifier field.
///
/// Implementations must be `Send + Sync` and safe for concurrent use; the
/// returned futures are driven on a Tokio runtime.
pub trait DocumentRepository: Send + Sync {
    /// Looks up the single document selected by `filter`.
    ///
    /// `Ok(None)` means no such document exists yet. Connectivity or query
    /// failures are errors.
    fn find_one(&self, filter: DocumentFilter) -> BoxFuture<'_, Result<Option<Document>, RepositoryError>>;

    /// Inserts `document`, or replaces the payload of the existing document with
    /// the same identifier. Other fields of an existing document are kept.
    fn upsert(&self, document: Document) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

/// Opens the repository described by `config.connection` for `config.collection`.
pub fn open_repository(config: &CookieCacheConfig) -> Result<RepositoryHandle, crate::errors::CookieCacheError> {
    let location = config.location()?;
    log::debug!("opening document repository {location:?} collection {}", config.collection);

    let handle: RepositoryHandle = match location {
        RepositoryLocation::Memory(name) => InMemoryRepository::named(&name, &config.collection),
        RepositoryLocation::JsonFile(path) => Arc::new(JsonFileRepository::new(path, &config.collection)),
        #[cfg(feature = "sqlite_store")]
        RepositoryLocation::Sqlite(path) => Arc::new(SqliteRepository::open(path, &config.collection)?),
        #[cfg(not(feature = "sqlite_store"))]
        RepositoryLocation::Sqlite(_) => {
            return Err(crate::config::ConfigError::UnsupportedConnection(config.connection.clone()).into())
        }
    };

    Ok(handle)
}
