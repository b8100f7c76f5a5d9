//! Platform crawler contract
//!
//! The orchestrator never talks to a concrete crawler. It looks up a
//! [`PlatformCrawler`] for each platform in a [`CrawlerRegistry`] and calls
//! [`PlatformCrawler::run`] once per step. Browser automation, login and
//! extraction all live behind that call; [`remote::RemoteCrawler`] forwards it
//! to an external worker over HTTP.

pub mod remote;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CrawledPost, Platform};
use crate::orchestrator::resolve::EffectiveConfig;

pub use remote::{RemoteCrawler, RemoteCrawlerConfig};

/// Errors raised by platform crawlers
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// No crawler registered for the platform
    #[error("No crawler registered for platform '{0}'")]
    Unsupported(Platform),

    /// Client could not be constructed
    #[error("Crawler initialization failed: {0}")]
    Init(String),

    /// Transport failure talking to the crawler
    #[error("Network error: {0}")]
    Network(String),

    /// Crawler answered with a non-success status
    #[error("HTTP error ({status}): {message}")]
    Http { status: u16, message: String },

    /// Crawler output could not be decoded
    #[error("Invalid crawler response: {0}")]
    Decode(String),

    /// Crawler ran but reported a failure
    #[error("Crawler reported failure: {0}")]
    Failed(String),
}

impl CrawlerError {
    /// Whether a later attempt could succeed without operator action
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Uniform invocation contract over per-platform crawlers
#[async_trait]
pub trait PlatformCrawler: Send + Sync {
    /// Crawl `platform` for `keywords` and return everything collected
    ///
    /// May run for an unbounded amount of time; timeouts are the
    /// implementation's responsibility.
    async fn run(
        &self,
        platform: Platform,
        keywords: &[String],
        config: &EffectiveConfig,
    ) -> Result<Vec<CrawledPost>, CrawlerError>;
}

/// Platform → crawler lookup table
#[derive(Clone, Default)]
pub struct CrawlerRegistry {
    crawlers: HashMap<Platform, Arc<dyn PlatformCrawler>>,
}

impl CrawlerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry serving every known platform with the same crawler
    pub fn uniform(crawler: Arc<dyn PlatformCrawler>) -> Self {
        Platform::all()
            .into_iter()
            .fold(Self::new(), |registry, platform| {
                registry.register(platform, crawler.clone())
            })
    }

    /// Register (or replace) the crawler for a platform
    pub fn register(mut self, platform: Platform, crawler: Arc<dyn PlatformCrawler>) -> Self {
        self.crawlers.insert(platform, crawler);
        self
    }

    /// Whether a crawler exists for `platform`
    pub fn supports(&self, platform: Platform) -> bool {
        self.crawlers.contains_key(&platform)
    }

    /// Crawler for `platform`
    pub fn get(&self, platform: Platform) -> Result<Arc<dyn PlatformCrawler>, CrawlerError> {
        self.crawlers
            .get(&platform)
            .cloned()
            .ok_or(CrawlerError::Unsupported(platform))
    }

    /// Registered platforms in display order
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::all()
            .into_iter()
            .filter(|p| self.supports(*p))
            .collect()
    }
}

impl std::fmt::Debug for CrawlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlerRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}
