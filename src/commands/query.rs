use anyhow::{Context, Result};
use std::path::Path;

use crawl_orchestrator::models::Platform;
use crawl_orchestrator::storage::{ResultStore, SqliteResultStore};

pub fn platforms() {
    println!("Supported Platforms");
    println!("===================");
    for platform in Platform::all() {
        println!("  {:<6} {}", platform.code(), platform.display_name());
    }
}

pub async fn stats(platform: &str, database: &Path) -> Result<()> {
    let platform: Platform = platform.parse().map_err(anyhow::Error::msg)?;

    if !database.exists() {
        println!("Database not found: {}", database.display());
        println!("Run a crawl first to create the database.");
        return Ok(());
    }

    let store = SqliteResultStore::new(database)
        .with_context(|| format!("Failed to open result store: {}", database.display()))?;
    let stats = store
        .count_stats(platform)
        .await
        .context("Failed to read platform statistics")?;

    println!("Crawl Statistics");
    println!("================");
    println!("Database: {}", database.display());
    println!("Platform: {} ({})", platform.display_name(), platform.code());
    println!("Table:    {}", platform.collection_name());
    println!();
    println!("Total posts:    {}", stats.total_posts);
    println!("Total comments: {}", stats.total_comments);
    if stats.total_posts > 0 {
        println!(
            "  Avg comments per post: {:.1}",
            stats.total_comments as f64 / stats.total_posts as f64
        );
    }

    Ok(())
}
