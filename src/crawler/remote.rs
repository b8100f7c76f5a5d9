//! HTTP client for an external crawler worker
//!
//! The worker owns the browser sessions. For each step the orchestrator posts
//! the platform, keywords and resolved settings to `<worker_url>/crawl` and the
//! worker answers with everything it captured:
//!
//! ```json
//! {
//!   "success": true,
//!   "posts": [{"note_id": "64f0...", "title": "..."}],
//!   "comments": {"64f0...": [{"content": "..."}]},
//!   "error": null
//! }
//! ```
//!
//! Requests are never retried here: a crawl is a long, side-effecting browser
//! session and the orchestrator treats any failure as fatal to the job.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CrawlerError, PlatformCrawler};
use crate::models::{extract_post_id, CrawledPost, Platform};
use crate::orchestrator::resolve::EffectiveConfig;

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for the remote crawler client
#[derive(Debug, Clone)]
pub struct RemoteCrawlerConfig {
    /// Crawler worker base URL
    pub worker_url: String,

    /// Per-request timeout; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl RemoteCrawlerConfig {
    /// Create a new client config
    pub fn new(worker_url: impl Into<String>) -> Self {
        Self {
            worker_url: worker_url.into(),
            timeout: None,
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn crawl_url(&self) -> String {
        format!("{}/crawl", self.worker_url.trim_end_matches('/'))
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct CrawlRequest<'a> {
    platform: Platform,
    keywords: &'a [String],
    config: &'a EffectiveConfig,
}

/// Capture produced by the worker for one step
#[derive(Debug, Default, Deserialize)]
pub struct WorkerResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub posts: Vec<Value>,
    #[serde(default)]
    pub comments: HashMap<String, Vec<Value>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WorkerResponse {
    /// Pair posts with their comments
    ///
    /// Posts without an identifiable id are dropped with a warning.
    pub fn into_posts(mut self, platform: Platform) -> Result<Vec<CrawledPost>, CrawlerError> {
        if self.success == Some(false) {
            return Err(CrawlerError::Failed(
                self.error
                    .unwrap_or_else(|| "worker returned success=false".to_string()),
            ));
        }

        let total = self.posts.len();
        let mut posts = Vec::with_capacity(total);

        for payload in self.posts {
            let Some(post_id) = extract_post_id(&payload) else {
                tracing::warn!(platform = %platform, "Dropping captured post without id");
                continue;
            };
            let comments = self.comments.remove(&post_id).unwrap_or_default();
            posts.push(CrawledPost {
                post_id,
                post_detail: payload,
                comments,
            });
        }

        tracing::debug!(
            platform = %platform,
            kept = posts.len(),
            total,
            "Decoded worker capture"
        );

        Ok(posts)
    }
}

// ============================================================================
// Remote Crawler
// ============================================================================

/// [`PlatformCrawler`] backed by a crawler worker service
pub struct RemoteCrawler {
    config: RemoteCrawlerConfig,
    http_client: Client,
}

impl RemoteCrawler {
    /// Create a new remote crawler
    pub fn new(config: RemoteCrawlerConfig) -> Result<Self, CrawlerError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| CrawlerError::Init(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Worker base URL
    pub fn worker_url(&self) -> &str {
        &self.config.worker_url
    }
}

#[async_trait]
impl PlatformCrawler for RemoteCrawler {
    async fn run(
        &self,
        platform: Platform,
        keywords: &[String],
        config: &EffectiveConfig,
    ) -> Result<Vec<CrawledPost>, CrawlerError> {
        let url = self.config.crawl_url();
        let body = CrawlRequest {
            platform,
            keywords,
            config,
        };

        tracing::info!(platform = %platform, keywords = ?keywords, url = %url, "Dispatching crawl to worker");

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CrawlerError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlerError::Http {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let capture: WorkerResponse = response
            .json()
            .await
            .map_err(|e| CrawlerError::Decode(e.to_string()))?;

        capture.into_posts(platform)
    }
}
