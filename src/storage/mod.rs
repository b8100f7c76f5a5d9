//! Result persistence
//!
//! Crawled posts are stored per platform, keyed by `post_id`. Writing the same
//! post again replaces its detail, comments and metadata, so re-crawling a
//! keyword never produces duplicates.
//!
//! # Backends
//!
//! - [`SqliteResultStore`] - one table per platform in a SQLite file
//! - [`MemoryResultStore`] - process-local, used by tests and `backend = "memory"`
//!
//! [`importer`] loads crawler JSON exports from disk into either backend.

pub mod importer;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CrawlMetadata, CrawlResult, CrawledPost, Platform, PlatformStats};

pub use importer::{find_platform_files, import_platform, ImportReport, PlatformFiles};
pub use memory::MemoryResultStore;
pub use sqlite::SqliteResultStore;

/// Errors raised by result stores
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking worker panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(String),

    /// Backend cannot accept requests
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Whether a later attempt could succeed without operator action
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::Io(_) | Self::Unavailable(_) => true,
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Per-platform document store for crawl results
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert or replace every post, stamping it with `metadata`
    ///
    /// Posts with an empty id are skipped. Returns the number written.
    async fn upsert_all(
        &self,
        platform: Platform,
        posts: Vec<CrawledPost>,
        metadata: &CrawlMetadata,
    ) -> Result<usize, StorageError>;

    /// Stored results in insertion order
    async fn query(
        &self,
        platform: Platform,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<CrawlResult>, StorageError>;

    /// Remove every stored result of `platform`, returning how many went
    async fn clear(&self, platform: Platform) -> Result<u64, StorageError>;

    /// Post and comment totals
    async fn count_stats(&self, platform: Platform) -> Result<PlatformStats, StorageError>;

    /// One stored result by post id
    async fn get(
        &self,
        platform: Platform,
        post_id: &str,
    ) -> Result<Option<CrawlResult>, StorageError>;
}

/// Convert posts to their stored form, dropping those without an id
pub(crate) fn to_results(posts: Vec<CrawledPost>, metadata: &CrawlMetadata) -> Vec<CrawlResult> {
    posts
        .into_iter()
        .filter(|post| !post.post_id.is_empty())
        .map(|post| CrawlResult::from_post(post, metadata.clone()))
        .collect()
}
