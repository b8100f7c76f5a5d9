//! SQLite result store
//!
//! Each platform gets its own `<code>_media_crawler` table. The post id is the
//! primary key, so an upsert keeps the row's original rowid and listing by
//! rowid returns posts in first-seen order.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{to_results, ResultStore, StorageError};
use crate::models::{CrawlMetadata, CrawlResult, CrawledPost, Platform, PlatformStats};

/// SQLite-backed [`ResultStore`]
///
/// All statements run on the blocking pool; the connection is shared behind a
/// `Mutex`.
#[derive(Clone)]
pub struct SqliteResultStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteResultStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::create_schema(&conn)?;

        tracing::info!(path = %path.display(), "SQLite result store initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_schema(conn: &Connection) -> Result<(), StorageError> {
        for platform in Platform::all() {
            let table = platform.collection_name();
            conn.execute_batch(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    post_id TEXT PRIMARY KEY,
                    post_detail TEXT NOT NULL,
                    comments TEXT NOT NULL,
                    comment_count INTEGER NOT NULL DEFAULT 0,
                    task_id TEXT NOT NULL,
                    crawl_metadata TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_{table}_updated_at ON {table}(updated_at);
                CREATE INDEX IF NOT EXISTS idx_{table}_task_id ON {table}(task_id);
                "#
            ))?;
        }
        Ok(())
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Unavailable("connection mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await?
    }
}

/// Row as stored, before JSON decoding
struct StoredRow {
    post_id: String,
    post_detail: String,
    comments: String,
    comment_count: i64,
    crawl_metadata: String,
    updated_at: String,
}

impl StoredRow {
    const COLUMNS: &'static str =
        "post_id, post_detail, comments, comment_count, crawl_metadata, updated_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            post_id: row.get(0)?,
            post_detail: row.get(1)?,
            comments: row.get(2)?,
            comment_count: row.get(3)?,
            crawl_metadata: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn decode(self) -> Result<CrawlResult, StorageError> {
        let crawl_metadata: CrawlMetadata = serde_json::from_str(&self.crawl_metadata)?;
        Ok(CrawlResult {
            post_id: self.post_id,
            post_detail: serde_json::from_str(&self.post_detail)?,
            comments: serde_json::from_str(&self.comments)?,
            comment_count: self.comment_count.max(0) as usize,
            crawl_metadata,
            updated_at: DateTime::parse_from_rfc3339(&self.updated_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn upsert_all(
        &self,
        platform: Platform,
        posts: Vec<CrawledPost>,
        metadata: &CrawlMetadata,
    ) -> Result<usize, StorageError> {
        let results = to_results(posts, metadata);
        if results.is_empty() {
            return Ok(0);
        }

        let table = platform.collection_name();
        let written = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(&format!(
                        r#"
                        INSERT INTO {table}
                            (post_id, post_detail, comments, comment_count, task_id, crawl_metadata, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        ON CONFLICT(post_id) DO UPDATE SET
                            post_detail = excluded.post_detail,
                            comments = excluded.comments,
                            comment_count = excluded.comment_count,
                            task_id = excluded.task_id,
                            crawl_metadata = excluded.crawl_metadata,
                            updated_at = excluded.updated_at
                        "#
                    ))?;

                    for result in &results {
                        stmt.execute(params![
                            result.post_id,
                            serde_json::to_string(&result.post_detail)?,
                            serde_json::to_string(&result.comments)?,
                            result.comment_count as i64,
                            result.crawl_metadata.task_id,
                            serde_json::to_string(&result.crawl_metadata)?,
                            result.updated_at.to_rfc3339(),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(results.len())
            })
            .await?;

        tracing::debug!(platform = %platform, written, "Upserted crawl results");
        Ok(written)
    }

    async fn query(
        &self,
        platform: Platform,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<CrawlResult>, StorageError> {
        let table = platform.collection_name();
        // SQLite treats a negative OFFSET as 0 and a negative LIMIT as unbounded.
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let skip = i64::try_from(skip).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM {table} ORDER BY rowid LIMIT ?1 OFFSET ?2",
                StoredRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![limit, skip], StoredRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(StoredRow::decode).collect()
        })
        .await
    }

    async fn count_stats(&self, platform: Platform) -> Result<PlatformStats, StorageError> {
        let table = platform.collection_name();
        self.with_conn(move |conn| {
            let (posts, comments): (i64, i64) = conn.query_row(
                &format!("SELECT COUNT(*), COALESCE(SUM(comment_count), 0) FROM {table}"),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(PlatformStats {
                total_posts: posts.max(0) as u64,
                total_comments: comments.max(0) as u64,
            })
        })
        .await
    }

    async fn clear(&self, platform: Platform) -> Result<u64, StorageError> {
        let table = platform.collection_name();
        let deleted = self
            .with_conn(move |conn| Ok(conn.execute(&format!("DELETE FROM {table}"), [])?))
            .await?;
        tracing::info!(platform = %platform, deleted, "Cleared stored results");
        Ok(deleted as u64)
    }

    async fn get(
        &self,
        platform: Platform,
        post_id: &str,
    ) -> Result<Option<CrawlResult>, StorageError> {
        let table = platform.collection_name();
        let post_id = post_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM {table} WHERE post_id = ?1",
                        StoredRow::COLUMNS
                    ),
                    params![post_id],
                    StoredRow::from_row,
                )
                .optional()?;
            row.map(StoredRow::decode).transpose()
        })
        .await
    }
}
