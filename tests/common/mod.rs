//! Common test utilities

use serde_json::json;

use crawl_orchestrator::models::{CrawlMetadata, CrawledPost};

/// Create a post with `comments` comments
pub fn create_test_post(post_id: &str, comments: usize) -> CrawledPost {
    CrawledPost {
        post_id: post_id.to_string(),
        post_detail: json!({
            "note_id": post_id,
            "title": format!("Post {post_id}"),
            "liked_count": 12,
        }),
        comments: (0..comments)
            .map(|i| json!({"comment_id": format!("{post_id}-c{i}"), "content": "太好看了"}))
            .collect(),
    }
}

/// Create metadata for round `round` of job `task_id`
pub fn create_metadata(task_id: &str, round: usize, keywords: &[&str]) -> CrawlMetadata {
    CrawlMetadata::now(
        task_id,
        round,
        keywords.iter().map(|k| k.to_string()).collect(),
    )
}
