//! Integration tests module
//!
//! End-to-end tests for the crawl orchestrator:
//! - Job execution order, progress and failure handling
//! - HTTP API behaviour over a live orchestrator

pub mod api_test;
pub mod orchestrator_test;
