//! JSON-backed document repository.
//!
//! `JsonFileRepository` keeps **all collections** in a single JSON file on disk:
//!
//! ```json
//! { "cookie_jars": [ { "user_id": "42", "cookie": "{...}" } ] }
//! ```
//!
//! ### I/O characteristics & caveats
//! - Every `upsert` **reads then rewrites** the entire file. The new contents are
//!   written to a uniquely named sibling `.tmp` file and renamed over the original.
//! - File access runs on Tokio's blocking pool.
//! - All repositories in one process that point at the same file share one lock,
//!   whatever collection they are bound to. Several processes sharing a file are
//!   not coordinated.
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use lazy_static::lazy_static;
use serde_json::{Map, Value};

use crate::repository::{Document, DocumentFilter, DocumentRepository, RepositoryError};

lazy_static! {
    /// One lock per file, keyed by absolute path.
    static ref FILE_LOCKS: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> = Mutex::new(HashMap::new());
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns the process-wide lock guarding `path`.
fn lock_for(path: &Path) -> Arc<Mutex<()>> {
    let key = absolute(path);
    let mut locks = FILE_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
}

// The file may not exist yet, so resolve the directory and re-attach the name.
fn absolute(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    match (fs::canonicalize(&parent), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => std::env::current_dir().map(|cwd| cwd.join(path)).unwrap_or_else(|_| path.to_path_buf()),
    }
}

/// A JSON file based document repository bound to one collection.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    /// Path to the JSON file holding every collection.
    path: PathBuf,
    collection: String,
    /// Shared with every other repository on the same file.
    file_lock: Arc<Mutex<()>>,
}

impl JsonFileRepository {
    /// Binds to `collection` inside the file at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>, collection: &str) -> Self {
        let path = path.into();
        Self {
            file_lock: lock_for(&path),
            path,
            collection: collection.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the whole file. A missing or empty file is an empty set of collections.
    fn load_file(path: &Path) -> Result<Map<String, Value>, RepositoryError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        Ok(serde_json::from_str(&contents)?)
    }

    fn save_file(path: &Path, collections: &Map<String, Value>) -> Result<(), RepositoryError> {
        let contents = serde_json::to_string_pretty(collections)?;
        let tmp = Self::tmp_path(path);
        if let Err(e) = fs::write(&tmp, contents).and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// `cookies.json` -> `cookies.json.<pid>.<n>.tmp`, unique within the process.
    fn tmp_path(path: &Path) -> PathBuf {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(format!(".{}.{n}.tmp", std::process::id()));
        path.with_file_name(name)
    }

    fn find_blocking(&self, filter: &DocumentFilter) -> Result<Option<Document>, RepositoryError> {
        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let collections = Self::load_file(&self.path)?;

        let Some(Value::Array(documents)) = collections.get(&self.collection) else {
            return Ok(None);
        };
        for stored in documents {
            if let Some(document) = Document::from_json(stored, filter)? {
                return Ok(Some(document));
            }
        }

        Ok(None)
    }

    fn upsert_blocking(&self, document: Document) -> Result<(), RepositoryError> {
        let _guard = self.file_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut collections = Self::load_file(&self.path)?;

        let documents = collections
            .entry(self.collection.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(documents) = documents else {
            return Err(RepositoryError::Unavailable(format!(
                "collection {:?} in {} is not an array",
                self.collection,
                self.path.display()
            )));
        };

        let existing = documents.iter().position(|stored| {
            stored.get(&document.field).and_then(Value::as_str) == Some(document.id.as_str())
        });
        match existing.map(|idx| &mut documents[idx]) {
            Some(Value::Object(stored)) => {
                stored.insert(document.payload_field, Value::String(document.payload));
            }
            Some(other) => *other = document.to_json(),
            None => documents.push(document.to_json()),
        }

        Self::save_file(&self.path, &collections)
    }
}

impl DocumentRepository for JsonFileRepository {
    fn find_one(&self, filter: DocumentFilter) -> BoxFuture<'_, Result<Option<Document>, RepositoryError>> {
        let repo = self.clone();
        async move { tokio::task::spawn_blocking(move || repo.find_blocking(&filter)).await? }.boxed()
    }

    fn upsert(&self, document: Document) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let repo = self.clone();
        async move { tokio::task::spawn_blocking(move || repo.upsert_blocking(document)).await? }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(id: &str) -> DocumentFilter {
        DocumentFilter::new("user_id", id, "cookie")
    }

    #[tokio::test]
    async fn missing_file_has_no_documents() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("cookies.json"), "jars");

        assert!(repo.find_one(filter("1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_writes_documents_per_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        let jars = JsonFileRepository::new(&path, "jars");
        let other = JsonFileRepository::new(&path, "other");

        jars.upsert(filter("1").document("a".into())).await.unwrap();
        jars.upsert(filter("1").document("b".into())).await.unwrap();
        other.upsert(filter("1").document("c".into())).await.unwrap();

        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            on_disk,
            json!({
                "jars": [{"user_id": "1", "cookie": "b"}],
                "other": [{"user_id": "1", "cookie": "c"}],
            })
        );

        let doc = jars.find_one(filter("1")).await.unwrap().unwrap();
        assert_eq!(doc.payload, "b");

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn repositories_on_one_file_share_a_lock() {
        let dir = tempfile::tempdir().unwrap();
        let a = JsonFileRepository::new(dir.path().join("cookies.json"), "jars");
        let b = JsonFileRepository::new(dir.path().join(".").join("cookies.json"), "other");
        let c = JsonFileRepository::new(dir.path().join("elsewhere.json"), "jars");

        assert!(Arc::ptr_eq(&a.file_lock, &b.file_lock));
        assert!(!Arc::ptr_eq(&a.file_lock, &c.file_lock));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_on_one_file_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");

        let mut tasks = Vec::new();
        for id in 0..8 {
            // A fresh repository per writer, as separate caches would have.
            let repo = JsonFileRepository::new(&path, "jars");
            tasks.push(tokio::spawn(async move {
                for round in 0..10 {
                    repo.upsert(filter(&id.to_string()).document(format!("{id}-{round}"))).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let repo = JsonFileRepository::new(&path, "jars");
        for id in 0..8 {
            let doc = repo.find_one(filter(&id.to_string())).await.unwrap().unwrap();
            assert_eq!(doc.payload, format!("{id}-9"));
        }
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        fs::write(&path, "{ not json").unwrap();

        let repo = JsonFileRepository::new(&path, "jars");
        assert!(matches!(repo.find_one(filter("1")).await, Err(RepositoryError::Json(_))));
    }
}
