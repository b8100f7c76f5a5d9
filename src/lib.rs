//! crawl-orchestrator - single-slot scheduler for social media crawl jobs
//!
//! Accepts jobs made of platforms × rounds of keyword groups, runs them one
//! step at a time with randomized pauses, and stores every crawled post per
//! platform.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`orchestrator`] - admission, job status and the background loop
//! - [`crawler`] - platform crawler contract and the HTTP worker client
//! - [`storage`] - result stores (SQLite, in-memory)
//! - [`api`] - axum HTTP façade
//! - [`config`] - configuration management and settings
//! - [`models`] - core data structures and types
//! - [`metrics`] - Prometheus metrics
//! - [`error`] - unified error handling
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use crawl_orchestrator::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let crawler = RemoteCrawler::new(RemoteCrawlerConfig::new("http://127.0.0.1:9000"))?;
//!     let orchestrator = Orchestrator::new(
//!         CrawlerRegistry::uniform(Arc::new(crawler)),
//!         Arc::new(MemoryResultStore::new()),
//!     );
//!
//!     let receipt = orchestrator
//!         .submit(CrawlRequest::new(&["xhs", "dy"], &[&["coffee"], &["tea"]]))
//!         .await?;
//!     println!("started {}", receipt.task_id);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod crawler;
pub mod error;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{CrawlerRegistry, PlatformCrawler, RemoteCrawler, RemoteCrawlerConfig};
    pub use crate::error::{Error, ErrorCategory, OrchestratorErrorTrait, Result};
    pub use crate::models::{CrawlMetadata, CrawlResult, CrawledPost, Platform, PlatformStats};
    pub use crate::orchestrator::{
        CrawlRequest, CrawlerConfigOverlay, DelayPolicy, Job, JobEvent, JobStatus, Orchestrator,
        SubmitReceipt,
    };
    pub use crate::storage::{MemoryResultStore, ResultStore, SqliteResultStore};
}

// Direct re-exports for convenience
pub use models::{CrawledPost, Platform};
pub use orchestrator::{CrawlRequest, Orchestrator};
