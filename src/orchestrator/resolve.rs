//! Crawler configuration resolution
//!
//! Every platform has a baseline [`CrawlerSettings`]. A job carries one
//! caller-supplied [`CrawlerConfigOverlay`] shared by all its platforms. Before
//! each step the orchestrator merges the two:
//!
//! - a field present in the overlay wins,
//! - a field absent from the overlay falls back to the baseline,
//! - fields neither side recognizes are kept in `extra` and passed through to
//!   the crawler untouched (overlay values win on name clashes),
//! - [`RESERVED_KEYS`] never pass through: the step itself decides which
//!   platform and keywords the crawler gets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::Platform;

/// Extra keys that would collide with fields of the crawl request
pub const RESERVED_KEYS: &[&str] = &["platform", "keywords"];

// ============================================================================
// Enumerated settings
// ============================================================================

/// How the crawler logs into the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginType {
    #[default]
    Qrcode,
    Phone,
    Cookie,
}

/// What the crawler collects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlerType {
    /// Keyword search
    #[default]
    Search,
    /// Specific post ids
    Detail,
    /// Creator home pages
    Creator,
}

// ============================================================================
// Resolved settings
// ============================================================================

/// Fully resolved crawler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerSettings {
    pub login_type: LoginType,
    pub cookies: String,
    pub crawler_type: CrawlerType,
    pub sort_type: String,
    pub headless: bool,
    /// Drive a real browser over CDP to reduce bot detection
    pub enable_cdp_mode: bool,
    pub enable_proxy: bool,
    pub ip_proxy_pool_count: u32,
    pub max_scan_page: u32,
    pub max_notes_count: u32,
    pub max_comments_per_note: u32,
    pub enable_get_comments: bool,
    pub enable_get_sub_comments: bool,
    /// Upper bound of the crawler's own sleep between requests
    pub max_sleep_sec: u64,

    /// Fields this crate does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            login_type: LoginType::Qrcode,
            cookies: String::new(),
            crawler_type: CrawlerType::Search,
            sort_type: "general".to_string(),
            headless: false,
            enable_cdp_mode: true,
            enable_proxy: false,
            ip_proxy_pool_count: 2,
            max_scan_page: 10,
            max_notes_count: 20,
            max_comments_per_note: 10,
            enable_get_comments: true,
            enable_get_sub_comments: false,
            max_sleep_sec: 2,
            extra: Map::new(),
        }
    }
}

impl CrawlerSettings {
    /// Return a copy with `overlay` applied on top
    pub fn merged_with(&self, overlay: &CrawlerConfigOverlay) -> Self {
        let mut extra = Map::new();
        for (key, value) in self.extra.iter().chain(&overlay.extra) {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                extra.insert(key.clone(), value.clone());
            }
        }

        Self {
            login_type: overlay.login_type.unwrap_or(self.login_type),
            cookies: overlay
                .cookies
                .clone()
                .unwrap_or_else(|| self.cookies.clone()),
            crawler_type: overlay.crawler_type.unwrap_or(self.crawler_type),
            sort_type: overlay
                .sort_type
                .clone()
                .unwrap_or_else(|| self.sort_type.clone()),
            headless: overlay.headless.unwrap_or(self.headless),
            enable_cdp_mode: overlay.enable_cdp_mode.unwrap_or(self.enable_cdp_mode),
            enable_proxy: overlay.enable_proxy.unwrap_or(self.enable_proxy),
            ip_proxy_pool_count: overlay
                .ip_proxy_pool_count
                .unwrap_or(self.ip_proxy_pool_count),
            max_scan_page: overlay.max_scan_page.unwrap_or(self.max_scan_page),
            max_notes_count: overlay.max_notes_count.unwrap_or(self.max_notes_count),
            max_comments_per_note: overlay
                .max_comments_per_note
                .unwrap_or(self.max_comments_per_note),
            enable_get_comments: overlay
                .enable_get_comments
                .unwrap_or(self.enable_get_comments),
            enable_get_sub_comments: overlay
                .enable_get_sub_comments
                .unwrap_or(self.enable_get_sub_comments),
            max_sleep_sec: overlay.max_sleep_sec.unwrap_or(self.max_sleep_sec),
            extra,
        }
    }
}

// ============================================================================
// Overlay
// ============================================================================

/// Partial settings supplied with a job or a platform baseline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfigOverlay {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_type: Option<LoginType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawler_type: Option<CrawlerType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_cdp_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_proxy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_proxy_pool_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_scan_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_notes_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_comments_per_note: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_get_comments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_get_sub_comments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sleep_sec: Option<u64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Resolution
// ============================================================================

/// Settings handed to a crawler for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub platform: Platform,
    #[serde(flatten)]
    pub settings: CrawlerSettings,
}

/// Merge `overlay` onto `baseline` for `platform`
pub fn resolve(
    platform: Platform,
    baseline: &CrawlerSettings,
    overlay: &CrawlerConfigOverlay,
) -> EffectiveConfig {
    EffectiveConfig {
        platform,
        settings: baseline.merged_with(overlay),
    }
}

impl CrawlerConfigOverlay {
    /// Extra keys that [`CrawlerSettings::merged_with`] would drop
    pub fn reserved_keys(&self) -> Vec<&str> {
        self.extra
            .keys()
            .map(String::as_str)
            .filter(|key| RESERVED_KEYS.contains(key))
            .collect()
    }
}

/// Per-platform baseline table
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    defaults: CrawlerSettings,
    platform_overrides: HashMap<Platform, CrawlerConfigOverlay>,
}

impl ConfigResolver {
    /// Resolver whose baselines are all `defaults`
    pub fn new(defaults: CrawlerSettings) -> Self {
        Self {
            defaults,
            platform_overrides: HashMap::new(),
        }
    }

    /// Adjust the baseline of one platform
    pub fn with_platform_override(
        mut self,
        platform: Platform,
        overlay: CrawlerConfigOverlay,
    ) -> Self {
        self.platform_overrides.insert(platform, overlay);
        self
    }

    /// Baseline settings for `platform`
    pub fn baseline(&self, platform: Platform) -> CrawlerSettings {
        match self.platform_overrides.get(&platform) {
            Some(overlay) => self.defaults.merged_with(overlay),
            None => self.defaults.clone(),
        }
    }

    /// Effective settings for one step of a job
    pub fn resolve(&self, platform: Platform, overlay: &CrawlerConfigOverlay) -> EffectiveConfig {
        let effective = resolve(platform, &self.baseline(platform), overlay);
        tracing::debug!(
            platform = %platform,
            crawler_type = ?effective.settings.crawler_type,
            login_type = ?effective.settings.login_type,
            "Resolved crawler config"
        );
        effective
    }
}
