//! In-memory result store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{to_results, ResultStore, StorageError};
use crate::models::{CrawlMetadata, CrawlResult, CrawledPost, Platform, PlatformStats};

#[derive(Default)]
struct Collection {
    rows: Vec<CrawlResult>,
    index: HashMap<String, usize>,
}

impl Collection {
    fn upsert(&mut self, result: CrawlResult) {
        match self.index.get(&result.post_id) {
            Some(&pos) => self.rows[pos] = result,
            None => {
                self.index.insert(result.post_id.clone(), self.rows.len());
                self.rows.push(result);
            }
        }
    }
}

/// Process-local [`ResultStore`]; contents are lost on exit
#[derive(Default)]
pub struct MemoryResultStore {
    collections: RwLock<HashMap<Platform, Collection>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn upsert_all(
        &self,
        platform: Platform,
        posts: Vec<CrawledPost>,
        metadata: &CrawlMetadata,
    ) -> Result<usize, StorageError> {
        let results = to_results(posts, metadata);
        let written = results.len();

        let mut collections = self.collections.write().await;
        let collection = collections.entry(platform).or_default();
        for result in results {
            collection.upsert(result);
        }

        Ok(written)
    }

    async fn query(
        &self,
        platform: Platform,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<CrawlResult>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&platform)
            .map(|c| c.rows.iter().skip(skip).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn count_stats(&self, platform: Platform) -> Result<PlatformStats, StorageError> {
        let collections = self.collections.read().await;
        let Some(collection) = collections.get(&platform) else {
            return Ok(PlatformStats::default());
        };

        Ok(PlatformStats {
            total_posts: collection.rows.len() as u64,
            total_comments: collection.rows.iter().map(|r| r.comment_count as u64).sum(),
        })
    }

    async fn clear(&self, platform: Platform) -> Result<u64, StorageError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .remove(&platform)
            .map_or(0, |c| c.rows.len() as u64))
    }

    async fn get(
        &self,
        platform: Platform,
        post_id: &str,
    ) -> Result<Option<CrawlResult>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections.get(&platform).and_then(|c| {
            c.index.get(post_id).map(|&pos| c.rows[pos].clone())
        }))
    }
}
