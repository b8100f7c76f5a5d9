// Core data structures shared by the crawler, storage and API layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Payload keys that may carry a post identifier, checked in order
const POST_ID_KEYS: &[&str] = &["post_id", "note_id", "aweme_id", "id"];

/// Supported content platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Xiaohongshu
    Xhs,
    /// Douyin
    #[serde(rename = "dy")]
    Douyin,
    /// Kuaishou
    #[serde(rename = "ks")]
    Kuaishou,
    /// Bilibili
    #[serde(rename = "bili")]
    Bilibili,
    /// Weibo
    #[serde(rename = "wb")]
    Weibo,
    /// Baidu Tieba
    Tieba,
    /// Zhihu
    Zhihu,
}

impl Platform {
    /// Short code used in requests, table names and logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::Xhs => "xhs",
            Self::Douyin => "dy",
            Self::Kuaishou => "ks",
            Self::Bilibili => "bili",
            Self::Weibo => "wb",
            Self::Tieba => "tieba",
            Self::Zhihu => "zhihu",
        }
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Xhs => "小红书 (Xiaohongshu)",
            Self::Douyin => "抖音 (Douyin)",
            Self::Kuaishou => "快手 (Kuaishou)",
            Self::Bilibili => "哔哩哔哩 (Bilibili)",
            Self::Weibo => "微博 (Weibo)",
            Self::Tieba => "百度贴吧 (Tieba)",
            Self::Zhihu => "知乎 (Zhihu)",
        }
    }

    /// Parse a platform code
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "xhs" => Some(Self::Xhs),
            "dy" => Some(Self::Douyin),
            "ks" => Some(Self::Kuaishou),
            "bili" => Some(Self::Bilibili),
            "wb" => Some(Self::Weibo),
            "tieba" => Some(Self::Tieba),
            "zhihu" => Some(Self::Zhihu),
            _ => None,
        }
    }

    /// All supported platforms in display order
    pub fn all() -> Vec<Self> {
        vec![
            Self::Xhs,
            Self::Douyin,
            Self::Kuaishou,
            Self::Bilibili,
            Self::Weibo,
            Self::Tieba,
            Self::Zhihu,
        ]
    }

    /// Comma separated list of valid codes, for error messages
    pub fn valid_codes() -> String {
        Self::all()
            .iter()
            .map(|p| p.code())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Name of the document collection holding this platform's results
    pub fn collection_name(&self) -> String {
        format!("{}_media_crawler", self.code())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| {
            format!(
                "Invalid platform: {s}. Valid platforms: {}",
                Self::valid_codes()
            )
        })
    }
}

/// One item yielded by a platform crawler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawledPost {
    pub post_id: String,
    pub post_detail: Value,
    #[serde(default)]
    pub comments: Vec<Value>,
}

impl CrawledPost {
    /// Build a post from a raw platform payload, extracting its identifier
    ///
    /// Returns `None` when the payload carries no usable id.
    pub fn from_payload(post_detail: Value, comments: Vec<Value>) -> Option<Self> {
        let post_id = extract_post_id(&post_detail)?;
        Some(Self {
            post_id,
            post_detail,
            comments,
        })
    }
}

/// Extract the post identifier from a platform payload
///
/// Platforms disagree on the field name (`note_id` on xhs, `aweme_id` on
/// douyin, ...). String and integer ids are accepted; empty strings are not.
pub fn extract_post_id(payload: &Value) -> Option<String> {
    POST_ID_KEYS.iter().find_map(|key| match payload.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Provenance attached to every persisted write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlMetadata {
    pub task_id: String,
    pub round: usize,
    pub keywords: Vec<String>,
    pub crawl_time: DateTime<Utc>,
}

impl CrawlMetadata {
    /// Metadata stamped with the current time
    pub fn now(task_id: impl Into<String>, round: usize, keywords: Vec<String>) -> Self {
        Self {
            task_id: task_id.into(),
            round,
            keywords,
            crawl_time: Utc::now(),
        }
    }
}

/// One persisted content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub post_id: String,
    pub post_detail: Value,
    pub comments: Vec<Value>,
    pub comment_count: usize,
    pub crawl_metadata: CrawlMetadata,
    pub updated_at: DateTime<Utc>,
}

impl CrawlResult {
    /// Build the stored form of a crawled post
    pub fn from_post(post: CrawledPost, metadata: CrawlMetadata) -> Self {
        Self {
            comment_count: post.comments.len(),
            post_id: post.post_id,
            post_detail: post.post_detail,
            comments: post.comments,
            crawl_metadata: metadata,
            updated_at: Utc::now(),
        }
    }
}

/// Aggregate counts for one platform's collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
    pub total_posts: u64,
    pub total_comments: u64,
}
