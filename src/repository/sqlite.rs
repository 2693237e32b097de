//! SQLite-backed document repository.
//!
//! `SqliteRepository` stores one collection as one table. The table is created
//! on first use with the identifier field as primary key and a text column for
//! the payload:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS <collection> (
//!     <field> TEXT PRIMARY KEY,
//!     <payload_field> TEXT
//! );
//! ```
//!
//! Missing columns are added on the fly, so several payload fields and query
//! columns can share a table. Every query column also gets a unique index,
//! which the `ON CONFLICT` upsert relies on. Collection and field names are validated as plain identifiers
//! by [`CookieCacheConfig`](crate::config::CookieCacheConfig) before they reach SQL.
//!
//! ## Concurrency
//! - Database access is via an `r2d2` pool for safe multi-threaded use.
//! - Every statement runs on Tokio's blocking pool.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::rusqlite::{params, OpenFlags, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;

use crate::repository::{Document, DocumentFilter, DocumentRepository, RepositoryError};

/// A SQLite-based document repository bound to one collection (table).
#[derive(Clone)]
pub struct SqliteRepository {
    /// Connection pool for SQLite database (so it can run multithreaded)
    pool: Pool<SqliteConnectionManager>,
    collection: String,
    /// `(field, payload_field)` pairs whose schema has already been ensured.
    ensured: Arc<Mutex<HashSet<(String, String)>>>,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Opens (or creates) a SQLite database at `path` for `collection`.
    pub fn open(path: impl Into<PathBuf>, collection: &str) -> Result<Self, RepositoryError> {
        let manager = SqliteConnectionManager::file(path.into())
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_WRITE |
                    OpenFlags::SQLITE_OPEN_CREATE |
                    OpenFlags::SQLITE_OPEN_URI
            )
            .with_init(|c| {
                c.busy_timeout(Duration::from_millis(500))?;
                c.pragma_update(None, "journal_mode", "WAL")?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(4)
            .connection_timeout(Duration::from_secs(5))
            .build(manager)?;

        Ok(Self {
            pool,
            collection: collection.to_string(),
            ensured: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, RepositoryError> {
        Ok(self.pool.get()?)
    }

    /// Creates the collection table and the payload column if they do not exist yet.
    fn ensure_schema(
        &self,
        conn: &PooledConnection<SqliteConnectionManager>,
        field: &str,
        payload_field: &str,
    ) -> Result<(), RepositoryError> {
        let key = (field.to_string(), payload_field.to_string());
        let mut ensured = self.ensured.lock().unwrap_or_else(PoisonError::into_inner);
        if ensured.contains(&key) {
            return Ok(());
        }

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                \"{field}\" TEXT PRIMARY KEY,
                \"{payload_field}\" TEXT
            );",
            table = self.collection,
        ))?;

        let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", self.collection))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<HashSet<_>, _>>()?;

        for column in [field, payload_field] {
            if !columns.contains(column) {
                log::debug!("adding column {column} to {}", self.collection);
                conn.execute_batch(&format!(
                    "ALTER TABLE \"{}\" ADD COLUMN \"{column}\" TEXT",
                    self.collection
                ))?;
            }
        }

        // `ON CONFLICT` needs a unique constraint on the query column, and an
        // added column has none.
        conn.execute_batch(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS \"{table}_{field}_key\" ON \"{table}\" (\"{field}\")",
            table = self.collection,
        ))?;

        ensured.insert(key);
        Ok(())
    }

    fn find_blocking(&self, filter: &DocumentFilter) -> Result<Option<Document>, RepositoryError> {
        let conn = self.conn()?;
        self.ensure_schema(&conn, &filter.field, &filter.payload_field)?;

        let payload: Option<Option<String>> = conn
            .query_row(
                &format!(
                    "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = ?1",
                    filter.payload_field, self.collection, filter.field
                ),
                params![filter.value],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            None => Ok(None),
            Some(Some(payload)) => Ok(Some(filter.document(payload))),
            Some(None) => Err(filter.malformed()),
        }
    }

    fn upsert_blocking(&self, document: &Document) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        self.ensure_schema(&conn, &document.field, &document.payload_field)?;

        conn.execute(
            &format!(
                "INSERT INTO \"{table}\" (\"{field}\", \"{payload}\") VALUES (?1, ?2)
                 ON CONFLICT(\"{field}\") DO UPDATE SET \"{payload}\" = excluded.\"{payload}\"",
                table = self.collection,
                field = document.field,
                payload = document.payload_field,
            ),
            params![document.id, document.payload],
        )?;
        Ok(())
    }
}

impl DocumentRepository for SqliteRepository {
    fn find_one(&self, filter: DocumentFilter) -> BoxFuture<'_, Result<Option<Document>, RepositoryError>> {
        let repo = self.clone();
        async move { tokio::task::spawn_blocking(move || repo.find_blocking(&filter)).await? }.boxed()
    }

    fn upsert(&self, document: Document) -> BoxFuture<'_, Result<(), RepositoryError>> {
        let repo = self.clone();
        async move { tokio::task::spawn_blocking(move || repo.upsert_blocking(&document)).await? }.boxed()
    }
}
