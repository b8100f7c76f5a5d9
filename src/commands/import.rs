use anyhow::{Context, Result};
use std::path::Path;

use crawl_orchestrator::storage::{
    find_platform_files, import_platform, PlatformFiles, ResultStore, SqliteResultStore,
};

async fn print_counts(store: &SqliteResultStore, found: &[PlatformFiles]) -> Result<()> {
    for files in found {
        let (contents, comments) = files.load();
        let stats = store
            .count_stats(files.platform)
            .await
            .context("Failed to read platform statistics")?;
        println!(
            "  {:<6} files: {} contents, {} comments | stored: {} posts",
            files.platform.code(),
            contents.len(),
            comments.len(),
            stats.total_posts
        );
    }
    Ok(())
}

pub async fn import(data_dir: &Path, database: &Path, delete_existing: bool) -> Result<()> {
    let found = find_platform_files(data_dir)
        .with_context(|| format!("Failed to scan data directory: {}", data_dir.display()))?;
    if found.is_empty() {
        println!("No JSON exports found under {}", data_dir.display());
        return Ok(());
    }

    let store = SqliteResultStore::new(database)
        .with_context(|| format!("Failed to open result store: {}", database.display()))?;

    println!("Import");
    println!("======");
    println!("Data:     {}", data_dir.display());
    println!("Database: {}", database.display());
    println!();
    println!("Before:");
    print_counts(&store, &found).await?;

    for files in &found {
        let report = import_platform(&store, files, delete_existing)
            .await
            .with_context(|| format!("Failed to import {}", files.dir.display()))?;
        if let Some(deleted) = report.deleted {
            println!("  {:<6} deleted {} existing rows", files.platform.code(), deleted);
        }
        println!(
            "  {:<6} combined {} posts, stored {}",
            files.platform.code(),
            report.combined,
            report.stored
        );
    }

    println!();
    println!("After:");
    print_counts(&store, &found).await?;

    Ok(())
}
