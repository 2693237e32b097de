//! The cookie cache façade.
//!
//! A [`CookieCache`] is a fully materialized, in-memory [`CookieIndex`] mirrored
//! to a single document in a [`DocumentRepository`].
//!
//! ## Lifecycle
//! - Construction loads the document once and **blocks until it is loaded**,
//!   even though the repository is asynchronous. A load failure, a broken
//!   cookie in the stored index or a timeout fails construction.
//! - Reads (`find_*`, `all_cookies`) are served from memory; they never touch
//!   the repository.
//! - Every mutation updates the index and then writes the **entire** index as
//!   one document. Snapshots are taken under the index lock and applied by a
//!   single worker task, so the repository always sees them in mutation order.
//!
//! ## Durability
//! With [`Durability::Durable`] a mutating call returns once the repository has
//! confirmed the write and reports its failure. With [`Durability::Optimistic`]
//! it returns as soon as memory is updated: a crash before the queued write lands
//! loses it, and write failures are only logged. [`CookieCache::flush`] waits
//! for everything queued so far.
//!
//! In both modes a failed write leaves the in-memory change in place.
//!
//! ## Example
//! ```rust,no_run
//! use gosub_cookie_cache::config::CookieCacheConfig;
//! use gosub_cookie_cache::cookies::Cookie;
//! use gosub_cookie_cache::store::CookieCache;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = tokio::runtime::Runtime::new()?;
//! let config = CookieCacheConfig::builder()
//!     .connection("sqlite://cookies.db")
//!     .collection("cookie_jars")
//!     .query_column("user_id")
//!     .build()?;
//!
//! let cache = CookieCache::open(&config, "user-42", runtime.handle())?;
//! cache.put_cookie(Cookie::new("example.com", "/", "sid", "abc"))?;
//! assert_eq!(cache.find_cookies("www.example.com", Some("/")).len(), 1);
//! # Ok(()) }
//! ```
mod worker;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::config::{CookieCacheConfig, Durability};
use crate::cookies::{
    codec, match_cookies, CandidateGenerator, Cookie, CookieIndex, PublicSuffixCandidates,
};
use crate::errors::{CookieCacheError, Result};
use crate::repository::{open_repository, DocumentFilter, RepositoryError, RepositoryHandle};
use worker::{PersistCommand, PersistenceWorker};

/// Persisted, in-process cookie cache for one identifier.
///
/// Internally synchronized; share it behind an `Arc` if several threads need it.
///
/// # Panics
/// Construction and every mutating method block the calling thread on the
/// runtime. Calling them from inside an asynchronous task panics; use
/// `tokio::task::spawn_blocking` there.
pub struct CookieCache {
    /// Addresses this cache's document in the repository.
    filter: DocumentFilter,
    durability: Durability,
    index: RwLock<CookieIndex>,
    candidates: Arc<dyn CandidateGenerator>,
    cmd_tx: mpsc::UnboundedSender<PersistCommand>,
}

impl CookieCache {
    /// Opens the repository named by `config.connection` and loads the document
    /// identified by `id`.
    pub fn open(config: &CookieCacheConfig, id: impl Into<String>, runtime: &Handle) -> Result<Self> {
        config.validate()?;
        let repository = open_repository(config)?;
        Self::with_repository(config, id, repository, runtime)
    }

    /// Like [`open`](Self::open), with an already constructed repository.
    /// `config.connection` is ignored and may be empty.
    pub fn with_repository(
        config: &CookieCacheConfig,
        id: impl Into<String>,
        repository: RepositoryHandle,
        runtime: &Handle,
    ) -> Result<Self> {
        config.validate_document()?;

        let filter = DocumentFilter::new(&config.query_column, id, &config.payload_field);
        let index = bootstrap(&repository, filter.clone(), config.bootstrap_timeout, runtime)?;
        log::info!(
            "cookie cache {}={} loaded {} cookie(s)",
            filter.field,
            filter.value,
            index.len()
        );

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        runtime.spawn(PersistenceWorker::new(repository, cmd_rx).run());

        Ok(Self {
            filter,
            durability: config.durability,
            index: RwLock::new(index),
            candidates: Arc::new(PublicSuffixCandidates),
            cmd_tx,
        })
    }

    /// Replaces the domain/path candidate generator.
    pub fn with_candidates(mut self, candidates: impl CandidateGenerator + 'static) -> Self {
        self.candidates = Arc::new(candidates);
        self
    }

    /// Identifier of this cache's document.
    pub fn id(&self) -> &str {
        &self.filter.value
    }

    pub fn durability(&self) -> Durability {
        self.durability
    }

    /// Every call returns with its work done in memory; there are no callbacks.
    pub fn is_synchronous(&self) -> bool {
        true
    }

    /// Exact lookup by `(domain, path, name)`.
    pub fn find_cookie(&self, domain: &str, path: &str, name: &str) -> Option<Cookie> {
        self.read().get(domain, path, name).cloned()
    }

    /// Every cookie visible to a request for `domain` and `path`.
    ///
    /// - An empty `domain` matches nothing.
    /// - `None` or an empty path matches every path; `"/"` matches only the `/`
    ///   path; any other path matches itself and its ancestors.
    /// - `domain` matches itself and its parent domains.
    pub fn find_cookies(&self, domain: &str, path: Option<&str>) -> Vec<Cookie> {
        match_cookies(&self.read(), self.candidates.as_ref(), domain, path)
    }

    pub fn all_cookies(&self) -> Vec<Cookie> {
        self.read().iter().cloned().collect()
    }

    /// Copy of the current index.
    pub fn snapshot(&self) -> CookieIndex {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Inserts `cookie`, replacing any cookie with the same `(domain, path, name)`.
    pub fn put_cookie(&self, cookie: Cookie) -> Result<()> {
        self.mutate(|index| {
            index.insert(cookie);
        })
    }

    /// Same as [`put_cookie`](Self::put_cookie) with `new`; `old` is not consulted.
    pub fn update_cookie(&self, _old: &Cookie, new: Cookie) -> Result<()> {
        self.put_cookie(new)
    }

    /// Removes one cookie. Removing a cookie that does not exist still persists.
    pub fn remove_cookie(&self, domain: &str, path: &str, name: &str) -> Result<()> {
        self.mutate(|index| {
            index.remove(domain, path, name);
        })
    }

    /// Removes every cookie stored under `domain` and `path`, or under `domain`
    /// on any path when `path` is `None` or empty.
    pub fn remove_cookies(&self, domain: &str, path: Option<&str>) -> Result<()> {
        self.mutate(|index| match path {
            Some(path) if !path.is_empty() => {
                index.remove_path(domain, path);
            }
            _ => {
                index.remove_domain(domain);
            }
        })
    }

    pub fn remove_all_cookies(&self) -> Result<()> {
        self.mutate(CookieIndex::clear)
    }

    /// Blocks until every write queued so far has been applied.
    pub fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(PersistCommand::Flush(done_tx))
            .map_err(|_| CookieCacheError::PersistenceClosed)?;
        done_rx.blocking_recv().map_err(|_| CookieCacheError::PersistenceClosed)
    }

    fn read(&self) -> RwLockReadGuard<'_, CookieIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `f` to the index and queues the resulting snapshot, both under
    /// the write lock.
    fn mutate(&self, f: impl FnOnce(&mut CookieIndex)) -> Result<()> {
        let ack_rx = {
            let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut *index);
            self.enqueue_snapshot(&index)?
        };

        match ack_rx {
            Some(ack_rx) => {
                let written = ack_rx.blocking_recv().map_err(|_| CookieCacheError::PersistenceClosed)?;
                Ok(written?)
            }
            None => Ok(()),
        }
    }

    fn enqueue_snapshot(
        &self,
        index: &CookieIndex,
    ) -> Result<Option<oneshot::Receiver<Result<(), RepositoryError>>>> {
        let document = self.filter.document(codec::encode_index(index)?);

        let (ack, ack_rx) = match self.durability {
            Durability::Durable => {
                let (tx, rx) = oneshot::channel();
                (Some(tx), Some(rx))
            }
            Durability::Optimistic => (None, None),
        };

        self.cmd_tx
            .send(PersistCommand::Save { document, ack })
            .map_err(|_| CookieCacheError::PersistenceClosed)?;

        Ok(ack_rx)
    }
}

/// Prints the index two levels deep: domains, paths and the cookie names under them.
impl fmt::Debug for CookieCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Outline<'a>(&'a CookieIndex);

        impl fmt::Debug for Outline<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut map = f.debug_map();
                for (domain, paths) in self.0.outline() {
                    let paths: std::collections::BTreeMap<_, Vec<_>> = paths
                        .iter()
                        .map(|(path, names)| (path, names.keys().collect()))
                        .collect();
                    map.entry(domain, &paths);
                }
                map.finish()
            }
        }

        let index = self.read();
        f.debug_struct("CookieCache")
            .field("id", &self.filter.value)
            .field("durability", &self.durability)
            .field("idx", &Outline(&index))
            .finish()
    }
}

/// Loads the stored index, blocking the caller until the fetch completes or
/// `timeout` elapses.
fn bootstrap(
    repository: &RepositoryHandle,
    filter: DocumentFilter,
    timeout: Duration,
    runtime: &Handle,
) -> Result<CookieIndex> {
    let (done_tx, done_rx) = oneshot::channel();
    let repository = Arc::clone(repository);
    let query = filter.clone();

    runtime.spawn(async move {
        let fetched = tokio::time::timeout(timeout, repository.find_one(query)).await;
        let _ = done_tx.send(fetched);
    });

    let fetched = done_rx.blocking_recv().map_err(|_| {
        RepositoryError::Unavailable("bootstrap task was dropped before completing".to_string())
    })?;
    let document = fetched.map_err(|_| CookieCacheError::BootstrapTimeout(timeout))??;

    match document {
        Some(document) => codec::decode_index(&document.payload),
        None => {
            log::debug!("no stored cookie index for {}={}, starting empty", filter.field, filter.value);
            Ok(CookieIndex::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::{self, BoxFuture, FutureExt};
    use serde_json::{json, Map};
    use tokio::runtime::Runtime;

    use super::*;
    use crate::repository::{Document, DocumentRepository, InMemoryRepository};

    fn runtime() -> Runtime {
        let _ = env_logger::builder().is_test(true).try_init();
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to create Tokio runtime")
    }

    fn config() -> CookieCacheConfig {
        CookieCacheConfig::builder()
            .collection("cookie_jars")
            .query_column("user_id")
            .build_without_connection()
            .unwrap()
    }

    fn open(repo: &Arc<InMemoryRepository>, rt: &Runtime) -> CookieCache {
        CookieCache::with_repository(&config(), "42", repo.clone(), rt.handle()).unwrap()
    }

    fn names(mut cookies: Vec<Cookie>) -> Vec<String> {
        cookies.sort_by(|a, b| (&a.domain, &a.path, &a.name).cmp(&(&b.domain, &b.path, &b.name)));
        cookies.into_iter().map(|c| c.name).collect()
    }

    fn stored_index(repo: &InMemoryRepository) -> CookieIndex {
        let raw = repo.raw("user_id", "42").expect("document was written");
        codec::decode_index(raw["cookie"].as_str().unwrap()).unwrap()
    }

    /// Repository double with switchable failures that counts its calls.
    #[derive(Default)]
    struct ScriptedRepository {
        inner: InMemoryRepository,
        fail_reads: bool,
        fail_writes: bool,
        hang_reads: bool,
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl DocumentRepository for ScriptedRepository {
        fn find_one(&self, filter: DocumentFilter) -> BoxFuture<'_, Result<Option<Document>, RepositoryError>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.hang_reads {
                return future::pending().boxed();
            }
            if self.fail_reads {
                return future::ready(Err(RepositoryError::Unavailable("connection refused".into()))).boxed();
            }
            self.inner.find_one(filter)
        }

        fn upsert(&self, document: Document) -> BoxFuture<'_, Result<(), RepositoryError>> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return future::ready(Err(RepositoryError::Unavailable("disk full".into()))).boxed();
            }
            self.inner.upsert(document)
        }
    }

    #[test]
    fn empty_backing_document_scenario() {
        let rt = runtime();
        let repo = Arc::new(InMemoryRepository::new());
        let cache = open(&repo, &rt);

        assert!(cache.find_cookies("example.com", Some("/")).is_empty());

        let sid = Cookie::new("example.com", "/", "sid", "abc");
        cache.put_cookie(sid.clone()).unwrap();
        assert_eq!(cache.find_cookie("example.com", "/", "sid"), Some(sid));

        cache.remove_cookies("example.com", None).unwrap();
        assert!(cache.find_cookies("example.com", Some("/")).is_empty());
        assert!(stored_index(&repo).is_empty());
    }

    #[test]
    fn put_then_find_returns_equal_cookie() {
        let rt = runtime();
        let repo = Arc::new(InMemoryRepository::new());
        let cache = open(&repo, &rt);

        let cookies = [
            Cookie { secure: true, ..Cookie::new("example.com", "/", "a", "1") },
            Cookie::new("example.com", "/docs", "a", "2"),
            Cookie::new("shop.example.com", "/", "a", "3"),
        ];
        for cookie in &cookies {
            cache.put_cookie(cookie.clone()).unwrap();
        }

        for cookie in &cookies {
            assert_eq!(cache.find_cookie(&cookie.domain, &cookie.path, &cookie.name).as_ref(), Some(cookie));
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn find_cookie_is_exact() {
        let rt = runtime();
        let cache = open(&Arc::new(InMemoryRepository::new()), &rt);
        cache.put_cookie(Cookie::new("example.com", "/", "sid", "abc")).unwrap();

        assert!(cache.find_cookie("www.example.com", "/", "sid").is_none());
        assert!(cache.find_cookie("example.com", "/a", "sid").is_none());
        assert!(cache.find_cookie("example.com", "/", "other").is_none());
    }

    #[test]
    fn put_then_remove_makes_cookie_absent() {
        let rt = runtime();
        let repo = Arc::new(InMemoryRepository::new());
        let cache = open(&repo, &rt);

        cache.put_cookie(Cookie::new("example.com", "/", "sid", "abc")).unwrap();
        cache.remove_cookie("example.com", "/", "sid").unwrap();

        assert!(cache.find_cookie("example.com", "/", "sid").is_none());
        assert!(stored_index(&repo).get("example.com", "/", "sid").is_none());
    }

    #[test]
    fn removing_missing_entries_still_persists() {
        let rt = runtime();
        let repo = Arc::new(ScriptedRepository::default());
        let cache = CookieCache::with_repository(&config(), "42", repo.clone(), rt.handle()).unwrap();

        cache.remove_cookie("nowhere.com", "/", "sid").unwrap();
        cache.remove_cookies("nowhere.com", Some("/")).unwrap();
        cache.remove_cookies("nowhere.com", None).unwrap();

        assert_eq!(repo.writes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn root_path_does_not_include_sub_paths() {
        let rt = runtime();
        let cache = open(&Arc::new(InMemoryRepository::new()), &rt);
        cache.put_cookie(Cookie::new("example.com", "/", "root", "r")).unwrap();
        cache.put_cookie(Cookie::new("example.com", "/a", "sub", "s")).unwrap();

        assert_eq!(names(cache.find_cookies("example.com", Some("/"))), vec!["root"]);
        assert_eq!(names(cache.find_cookies("example.com", None)), vec!["root", "sub"]);
        assert_eq!(names(cache.find_cookies("example.com", Some(""))), vec!["root", "sub"]);
        assert_eq!(names(cache.find_cookies("example.com", Some("/a/b"))), vec!["root", "sub"]);
        assert!(cache.find_cookies("", None).is_empty());
        assert!(cache.find_cookies("", Some("/a")).is_empty());
    }

    #[test]
    fn parent_domain_cookies_are_visible_to_subdomains() {
        let rt = runtime();
        let cache = open(&Arc::new(InMemoryRepository::new()), &rt);
        cache.put_cookie(Cookie::new("example.com", "/", "sid", "abc")).unwrap();

        assert_eq!(names(cache.find_cookies("www.example.com", Some("/"))), vec!["sid"]);
        assert!(cache.find_cookies("other.com", Some("/")).is_empty());
    }

    #[test]
    fn custom_candidate_generator_is_used() {
        struct ExactOnly;
        impl CandidateGenerator for ExactOnly {
            fn domain_candidates(&self, domain: &str) -> Vec<String> {
                vec![domain.to_string()]
            }
            fn path_candidates(&self, path: &str) -> Vec<String> {
                vec![path.to_string()]
            }
        }

        let rt = runtime();
        let cache = open(&Arc::new(InMemoryRepository::new()), &rt).with_candidates(ExactOnly);
        cache.put_cookie(Cookie::new("example.com", "/", "sid", "abc")).unwrap();

        assert!(cache.find_cookies("www.example.com", Some("/")).is_empty());
        assert!(cache.find_cookies("example.com", Some("/a")).is_empty());
        assert_eq!(cache.find_cookies("example.com", Some("/")).len(), 1);
    }

    #[test]
    fn remove_cookies_by_path_keeps_other_paths() {
        let rt = runtime();
        let cache = open(&Arc::new(InMemoryRepository::new()), &rt);
        cache.put_cookie(Cookie::new("example.com", "/", "root", "r")).unwrap();
        cache.put_cookie(Cookie::new("example.com", "/a", "sub", "s")).unwrap();
        cache.put_cookie(Cookie::new("example.com", "/a", "sub2", "s")).unwrap();

        cache.remove_cookies("example.com", Some("/a")).unwrap();
        assert_eq!(names(cache.all_cookies()), vec!["root"]);

        cache.remove_cookies("example.com", Some("")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn update_is_a_put_of_the_new_cookie() {
        let rt = runtime();
        let repo = Arc::new(ScriptedRepository::default());
        let cache = CookieCache::with_repository(&config(), "42", repo.clone(), rt.handle()).unwrap();

        let old = Cookie::new("example.com", "/", "sid", "old");
        cache.put_cookie(old.clone()).unwrap();

        cache.update_cookie(&old, old.clone()).unwrap();
        assert_eq!(repo.writes.load(Ordering::SeqCst), 2);

        let new = Cookie { value: "new".into(), ..old.clone() };
        cache.update_cookie(&old, new.clone()).unwrap();
        assert_eq!(cache.find_cookie("example.com", "/", "sid"), Some(new));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn reopening_restores_every_cookie() {
        let rt = runtime();
        let repo = Arc::new(InMemoryRepository::new());

        let mut secure = Cookie::new("example.com", "/account", "auth", "xyz");
        secure.secure = true;
        secure.host_only = Some(true);
        secure.extensions.insert("priority".into(), json!("High"));

        let expected = {
            let cache = open(&repo, &rt);
            cache.put_cookie(Cookie::new("example.com", "/", "sid", "abc")).unwrap();
            cache.put_cookie(secure.clone()).unwrap();
            cache.put_cookie(Cookie::new("other.com", "/", "lang", "nl")).unwrap();
            cache.snapshot()
        };

        let reopened = open(&repo, &rt);
        assert_eq!(reopened.snapshot(), expected);
        assert_eq!(reopened.find_cookie("example.com", "/account", "auth"), Some(secure));
    }

    #[test]
    fn caches_with_different_ids_do_not_share_cookies() {
        let rt = runtime();
        let repo = Arc::new(InMemoryRepository::new());

        let a = CookieCache::with_repository(&config(), "a", repo.clone(), rt.handle()).unwrap();
        a.put_cookie(Cookie::new("example.com", "/", "sid", "a")).unwrap();

        let b = CookieCache::with_repository(&config(), "b", repo.clone(), rt.handle()).unwrap();
        assert!(b.is_empty());
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn broken_stored_cookie_fails_construction() {
        let rt = runtime();
        let repo = Arc::new(InMemoryRepository::new());

        let blob = json!({
            "example.com": {"/": {
                "ok": {"key": "ok", "domain": "example.com", "path": "/"},
                "bad": {"key": "bad", "domain": "example.com", "path": "/", "httpOnly": "sometimes"},
            }}
        });
        let mut document = Map::new();
        document.insert("user_id".into(), json!("42"));
        document.insert("cookie".into(), json!(blob.to_string()));
        repo.insert_raw("user_id", "42", document);

        let err = CookieCache::with_repository(&config(), "42", repo, rt.handle()).unwrap_err();
        assert!(matches!(err, CookieCacheError::CookieDecode { ref name, .. } if name == "bad"));
    }

    #[test]
    fn repository_read_failure_fails_construction() {
        let rt = runtime();
        let repo = Arc::new(ScriptedRepository { fail_reads: true, ..Default::default() });

        let err = CookieCache::with_repository(&config(), "42", repo, rt.handle()).unwrap_err();
        assert!(matches!(err, CookieCacheError::Repository(RepositoryError::Unavailable(_))));
    }

    #[test]
    fn hanging_repository_times_out() {
        let rt = runtime();
        let repo = Arc::new(ScriptedRepository { hang_reads: true, ..Default::default() });
        let cfg = CookieCacheConfig { bootstrap_timeout: Duration::from_millis(50), ..config() };

        let err = CookieCache::with_repository(&cfg, "42", repo, rt.handle()).unwrap_err();
        assert!(matches!(err, CookieCacheError::BootstrapTimeout(t) if t == Duration::from_millis(50)));
    }

    #[test]
    fn invalid_config_fails_before_any_io() {
        let rt = runtime();
        let repo = Arc::new(ScriptedRepository::default());
        let cfg = CookieCacheConfig { collection: String::new(), ..config() };

        let err = CookieCache::with_repository(&cfg, "42", repo.clone(), rt.handle()).unwrap_err();
        assert!(matches!(err, CookieCacheError::Config(crate::config::ConfigError::MissingCollection)));
        assert_eq!(repo.reads.load(Ordering::SeqCst), 0);

        let err = CookieCache::open(&config(), "42", rt.handle()).unwrap_err();
        assert!(matches!(err, CookieCacheError::Config(crate::config::ConfigError::MissingConnection)));
    }

    #[test]
    fn injected_repository_needs_no_connection() {
        let rt = runtime();
        let repo = Arc::new(InMemoryRepository::new());
        assert!(config().connection.is_empty());

        let cache = CookieCache::with_repository(&config(), "42", repo.clone(), rt.handle()).unwrap();
        cache.put_cookie(Cookie::new("example.com", "/", "sid", "1")).unwrap();
        assert_eq!(stored_index(&repo).len(), 1);
    }

    #[test]
    fn durable_write_failure_is_surfaced() {
        let rt = runtime();
        let repo = Arc::new(ScriptedRepository { fail_writes: true, ..Default::default() });
        let cache = CookieCache::with_repository(&config(), "42", repo, rt.handle()).unwrap();

        let err = cache.put_cookie(Cookie::new("example.com", "/", "sid", "abc")).unwrap_err();
        assert!(matches!(err, CookieCacheError::Repository(_)));
        // memory keeps the change
        assert!(cache.find_cookie("example.com", "/", "sid").is_some());
    }

    #[test]
    fn optimistic_writes_are_acknowledged_before_the_repository() {
        let rt = runtime();
        let repo = Arc::new(ScriptedRepository { fail_writes: true, ..Default::default() });
        let cfg = CookieCacheConfig { durability: Durability::Optimistic, ..config() };
        let cache = CookieCache::with_repository(&cfg, "42", repo.clone(), rt.handle()).unwrap();

        cache.put_cookie(Cookie::new("example.com", "/", "sid", "abc")).unwrap();
        cache.remove_cookie("example.com", "/", "sid").unwrap();
        cache.flush().unwrap();

        assert_eq!(repo.writes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn optimistic_writes_land_in_order() {
        let rt = runtime();
        let repo = Arc::new(InMemoryRepository::new());
        let cfg = CookieCacheConfig { durability: Durability::Optimistic, ..config() };
        let cache = CookieCache::with_repository(&cfg, "42", repo.clone(), rt.handle()).unwrap();

        for i in 0..50 {
            cache.put_cookie(Cookie::new("example.com", "/", "counter", i.to_string())).unwrap();
        }
        cache.flush().unwrap();

        let stored = stored_index(&repo);
        assert_eq!(stored.get("example.com", "/", "counter").unwrap().value, "49");
    }

    #[test]
    fn remove_all_cookies_clears_memory_and_document() {
        let rt = runtime();
        let repo = Arc::new(InMemoryRepository::new());
        let cache = open(&repo, &rt);
        cache.put_cookie(Cookie::new("example.com", "/", "a", "1")).unwrap();
        cache.put_cookie(Cookie::new("other.com", "/x", "b", "2")).unwrap();

        cache.remove_all_cookies().unwrap();

        assert!(cache.all_cookies().is_empty());
        assert!(stored_index(&repo).is_empty());
    }

    #[test]
    fn debug_output_lists_domains_paths_and_names() {
        let rt = runtime();
        let cache = open(&Arc::new(InMemoryRepository::new()), &rt);
        cache.put_cookie(Cookie::new("example.com", "/", "sid", "secret-value")).unwrap();

        let out = format!("{cache:?}");
        assert!(out.contains("example.com"));
        assert!(out.contains("sid"));
        assert!(!out.contains("secret-value"));
        assert!(cache.is_synchronous());
    }

    #[test]
    fn json_file_backend_survives_reopen() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let cfg = CookieCacheConfig {
            connection: format!("json://{}", dir.path().join("cookies.json").display()),
            ..config()
        };

        {
            let cache = CookieCache::open(&cfg, "42", rt.handle()).unwrap();
            cache.put_cookie(Cookie::new("example.com", "/", "sid", "abc")).unwrap();
        }

        let cache = CookieCache::open(&cfg, "42", rt.handle()).unwrap();
        assert_eq!(cache.find_cookie("example.com", "/", "sid").unwrap().value, "abc");
    }

    #[test]
    fn caches_sharing_a_json_file_keep_every_write() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let cfg = CookieCacheConfig {
            connection: format!("json://{}", dir.path().join("cookies.json").display()),
            ..config()
        };

        std::thread::scope(|scope| {
            for id in 0..4 {
                let cfg = &cfg;
                let handle = rt.handle();
                scope.spawn(move || {
                    let cache = CookieCache::open(cfg, id.to_string(), handle).unwrap();
                    for n in 0..10 {
                        cache.put_cookie(Cookie::new("example.com", "/", &format!("c{n}"), "v")).unwrap();
                    }
                });
            }
        });

        for id in 0..4 {
            let cache = CookieCache::open(&cfg, id.to_string(), rt.handle()).unwrap();
            assert_eq!(cache.len(), 10, "cache {id} lost writes");
        }
    }

    #[test]
    fn concurrent_mutations_leave_memory_and_storage_in_step() {
        let rt = runtime();
        let repo = Arc::new(InMemoryRepository::new());
        let cache = Arc::new(open(&repo, &rt));

        let workers: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for n in 0..25 {
                        let domain = format!("d{}.example.com", n % 3);
                        cache.put_cookie(Cookie::new(&domain, "/", &format!("t{t}-{n}"), "v")).unwrap();
                        if n % 5 == 4 {
                            cache.remove_cookie(&domain, "/", &format!("t{t}-{}", n - 1)).unwrap();
                        }
                        if t == 0 && n == 20 {
                            cache.remove_cookies("d0.example.com", None).unwrap();
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        cache.flush().unwrap();
        assert_eq!(cache.snapshot(), stored_index(&repo));
        assert!(!cache.is_empty());
    }

    #[cfg(feature = "sqlite_store")]
    #[test]
    fn sqlite_backend_survives_reopen() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let cfg = CookieCacheConfig {
            connection: format!("sqlite://{}", dir.path().join("cookies.db").display()),
            ..config()
        };

        {
            let cache = CookieCache::open(&cfg, "42", rt.handle()).unwrap();
            cache.put_cookie(Cookie::new("example.com", "/", "sid", "abc")).unwrap();
            cache.put_cookie(Cookie::new("example.com", "/a", "sub", "s")).unwrap();
            cache.remove_cookie("example.com", "/a", "sub").unwrap();
        }

        let cache = CookieCache::open(&cfg, "42", rt.handle()).unwrap();
        assert_eq!(names(cache.all_cookies()), vec!["sid"]);
    }
}
