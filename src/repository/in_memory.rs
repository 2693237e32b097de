use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::{self, BoxFuture, FutureExt};
use lazy_static::lazy_static;
use serde_json::{Map, Value};

use crate::repository::{Document, DocumentFilter, DocumentRepository, RepositoryError};

lazy_static! {
    /// Named repositories, so `memory://name` resolves to the same data within a process.
    static ref NAMED: Mutex<HashMap<(String, String), Arc<InMemoryRepository>>> = Mutex::new(HashMap::new());
}

/// Process-local document repository.
///
/// Documents are kept as JSON objects keyed by `(identifier field, identifier)`.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    documents: RwLock<HashMap<(String, String), Map<String, Value>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the repository registered as `name`/`collection`, creating it on first use.
    pub fn named(name: &str, collection: &str) -> Arc<Self> {
        let mut named = NAMED.lock().unwrap_or_else(PoisonError::into_inner);
        named
            .entry((name.to_string(), collection.to_string()))
            .or_default()
            .clone()
    }

    /// Raw stored document, for inspection.
    pub fn raw(&self, field: &str, id: &str) -> Option<Value> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        documents
            .get(&(field.to_string(), id.to_string()))
            .cloned()
            .map(Value::Object)
    }

    /// Stores a raw document as-is, bypassing [`DocumentRepository::upsert`].
    pub fn insert_raw(&self, field: &str, id: &str, document: Map<String, Value>) {
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        documents.insert((field.to_string(), id.to_string()), document);
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentRepository for InMemoryRepository {
    fn find_one(&self, filter: DocumentFilter) -> BoxFuture<'_, Result<Option<Document>, RepositoryError>> {
        let result = match self.raw(&filter.field, &filter.value) {
            Some(stored) => Document::from_json(&stored, &filter),
            None => Ok(None),
        };
        future::ready(result).boxed()
    }

    fn upsert(&self, document: Document) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        let stored = documents
            .entry((document.field.clone(), document.id.clone()))
            .or_default();

        stored.insert(document.field, Value::String(document.id));
        stored.insert(document.payload_field, Value::String(document.payload));

        future::ready(Ok(())).boxed()
    }
}
