//! Offline import of crawler JSON exports
//!
//! Crawler workers can also dump their captures to disk, one directory per
//! platform:
//!
//! ```text
//! data/
//!   xhs/json/search_contents_2024-05-01.json
//!   xhs/json/search_comments_2024-05-01.json
//!   douyin/json/...
//! ```
//!
//! Files whose name contains `comments` hold comments, every other `.json`
//! file holds contents. Comments are grouped under the post they belong to
//! and the combined posts are upserted into the platform's result table.

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::{ResultStore, StorageError};
use crate::models::{extract_post_id, CrawlMetadata, CrawledPost, Platform};

/// Task id stamped on imported results
pub const IMPORT_TASK_ID: &str = "import";

/// Comment fields naming the post a comment belongs to, checked in order
const COMMENT_PARENT_KEYS: &[&str] = &["note_id", "aweme_id", "oid"];

/// Export files found for one platform directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformFiles {
    pub platform: Platform,
    pub dir: PathBuf,
    pub contents: Vec<PathBuf>,
    pub comments: Vec<PathBuf>,
}

impl PlatformFiles {
    /// Load every record, skipping files that cannot be read or parsed
    pub fn load(&self) -> (Vec<Value>, Vec<Value>) {
        (load_all(&self.contents), load_all(&self.comments))
    }
}

/// Outcome of importing one platform directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub content_records: usize,
    pub comment_records: usize,
    /// Posts built after grouping comments under their content
    pub combined: usize,
    /// Rows removed before writing, when asked to
    pub deleted: Option<u64>,
    pub stored: usize,
}

/// Platform exported under a directory name
///
/// Accepts the short codes as well as the long names some workers use.
pub fn platform_for_dir(name: &str) -> Option<Platform> {
    Platform::from_code(name).or(match name {
        "douyin" => Some(Platform::Douyin),
        "kuaishou" => Some(Platform::Kuaishou),
        "bilibili" => Some(Platform::Bilibili),
        "weibo" => Some(Platform::Weibo),
        _ => None,
    })
}

/// Scan `data_dir` for `<platform>/json/*.json` exports
///
/// A missing data directory yields nothing. Unknown directories and
/// directories without a `json/` folder are skipped.
pub fn find_platform_files(data_dir: &Path) -> Result<Vec<PlatformFiles>, StorageError> {
    if !data_dir.is_dir() {
        tracing::warn!(path = %data_dir.display(), "Data directory not found");
        return Ok(Vec::new());
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(data_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut found = Vec::new();
    for dir in dirs {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let Some(platform) = platform_for_dir(&name) else {
            tracing::info!(dir = %name, "Skipping unknown platform directory");
            continue;
        };

        let json_dir = dir.join("json");
        if !json_dir.is_dir() {
            tracing::info!(dir = %name, "No json directory, skipping");
            continue;
        }

        let mut files: Vec<PathBuf> = fs::read_dir(&json_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        let (comments, contents): (Vec<PathBuf>, Vec<PathBuf>) =
            files.into_iter().partition(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains("comments"))
            });

        if contents.is_empty() && comments.is_empty() {
            continue;
        }
        found.push(PlatformFiles {
            platform,
            dir,
            contents,
            comments,
        });
    }

    Ok(found)
}

/// Records of one export file; a top-level object counts as one record
pub fn load_json_records(path: &Path) -> Result<Vec<Value>, StorageError> {
    let raw = fs::read_to_string(path)?;
    Ok(match serde_json::from_str(&raw)? {
        Value::Array(items) => items,
        other => vec![other],
    })
}

fn load_all(paths: &[PathBuf]) -> Vec<Value> {
    let mut records = Vec::new();
    for path in paths {
        match load_json_records(path) {
            Ok(mut loaded) => {
                tracing::debug!(path = %path.display(), records = loaded.len(), "Loaded export file");
                records.append(&mut loaded);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable export file");
            }
        }
    }
    records
}

fn comment_parent(comment: &Value) -> Option<String> {
    COMMENT_PARENT_KEYS
        .iter()
        .find_map(|key| match comment.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Group comments under their content records
///
/// Contents without an id are dropped; a later record with the same id
/// replaces an earlier one. Comments whose post was not exported become
/// posts with a null detail, after all contents, in first-seen order.
pub fn combine(contents: Vec<Value>, comments: Vec<Value>) -> Vec<CrawledPost> {
    let mut posts: Vec<CrawledPost> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for detail in contents {
        let Some(post_id) = extract_post_id(&detail) else {
            continue;
        };
        match index.get(&post_id) {
            Some(&i) => posts[i].post_detail = detail,
            None => {
                index.insert(post_id.clone(), posts.len());
                posts.push(CrawledPost {
                    post_id,
                    post_detail: detail,
                    comments: Vec::new(),
                });
            }
        }
    }

    for comment in comments {
        let Some(parent) = comment_parent(&comment) else {
            continue;
        };
        let i = *index.entry(parent.clone()).or_insert_with(|| {
            posts.push(CrawledPost {
                post_id: parent,
                post_detail: Value::Null,
                comments: Vec::new(),
            });
            posts.len() - 1
        });
        posts[i].comments.push(comment);
    }

    posts
}

/// Load, combine and store one platform's exports
///
/// With `delete_existing` the platform's table is emptied first. A platform
/// whose files hold no records is left untouched.
pub async fn import_platform(
    store: &dyn ResultStore,
    files: &PlatformFiles,
    delete_existing: bool,
) -> Result<ImportReport, StorageError> {
    let (contents, comments) = files.load();
    let mut report = ImportReport {
        content_records: contents.len(),
        comment_records: comments.len(),
        ..Default::default()
    };

    if contents.is_empty() && comments.is_empty() {
        tracing::warn!(platform = %files.platform, "No records to import");
        return Ok(report);
    }

    let posts = combine(contents, comments);
    report.combined = posts.len();

    if delete_existing {
        report.deleted = Some(store.clear(files.platform).await?);
    }

    let metadata = CrawlMetadata::now(IMPORT_TASK_ID, 0, Vec::new());
    report.stored = store.upsert_all(files.platform, posts, &metadata).await?;

    tracing::info!(
        platform = %files.platform,
        contents = report.content_records,
        comments = report.comment_records,
        stored = report.stored,
        "Imported platform exports"
    );

    Ok(report)
}
