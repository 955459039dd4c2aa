//! Offline resource cache: a versioned, quota-bounded cache region fronted
//! by a background service that owns all cache state and talks to callers
//! over message channels.

pub mod fetch;
pub mod manager;
pub mod region;
pub mod service;

use serde::Serialize;

/// Hard ceiling on total cached bytes: 50 MiB.
pub const MAX_CACHE_SIZE_BYTES: u64 = 50 * 1024 * 1024;

/// Current cache region version. Bumping it invalidates every previous
/// region on the next activation.
pub const CACHE_VERSION: u32 = 1;

/// Region family prefix; full region names are `<prefix>-v<version>`.
pub const CACHE_REGION_PREFIX: &str = "tolmach-cache";

/// Cache layer configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub region_prefix: String,
    pub version: u32,
    pub max_bytes: u64,
    /// Origin the application is served from; only requests to this origin
    /// are intercepted.
    pub app_origin: String,
    /// Core shell resources pre-populated at install time, quota-exempt.
    pub shell_resources: Vec<String>,
    /// Document served as offline fallback for navigation requests.
    pub shell_document: String,
    /// Pattern identifying dictionary data resources (quota-checked).
    pub data_resource_pattern: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            region_prefix: CACHE_REGION_PREFIX.to_string(),
            version: CACHE_VERSION,
            max_bytes: MAX_CACHE_SIZE_BYTES,
            app_origin: "http://localhost".to_string(),
            shell_resources: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
                "/favicon.ico".to_string(),
                "/assets/index.css".to_string(),
                "/assets/index.js".to_string(),
                "/data/dolgan_language.json".to_string(),
            ],
            shell_document: "/index.html".to_string(),
            data_resource_pattern: r"/data/[^/]+\.json$".to_string(),
        }
    }
}

impl CacheConfig {
    /// Full region name for the configured version.
    pub fn region_name(&self) -> String {
        format!("{}-v{}", self.region_prefix, self.version)
    }

    /// Canonical app-relative path for a request URL, or None when the URL
    /// points at a foreign origin.
    pub fn canonical_path(&self, url: &str) -> Option<String> {
        if let Some(rest) = url.strip_prefix(self.app_origin.trim_end_matches('/')) {
            if rest.is_empty() {
                return Some("/".to_string());
            }
            if rest.starts_with('/') {
                return Some(rest.to_string());
            }
            return None;
        }
        if url.starts_with('/') {
            return Some(url.to_string());
        }
        None
    }
}

/// Cache state snapshot: `GET_CACHE_INFO` reply and `CACHE_SIZE_UPDATED`
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheInfo {
    pub size: u64,
    pub max_size: u64,
    pub percentage: f64,
}

impl CacheInfo {
    pub fn new(size: u64, max_size: u64) -> Self {
        let percentage = if max_size == 0 {
            0.0
        } else {
            size as f64 / max_size as f64 * 100.0
        };
        Self {
            size,
            max_size,
            percentage,
        }
    }
}

/// `CLEAR_CACHE` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearOutcome {
    pub success: bool,
    pub new_size: u64,
}

/// Unsolicited notifications broadcast to every subscribed observer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CacheEvent {
    SizeUpdated(CacheInfo),
    LimitExceeded {
        url: String,
        file_size: u64,
        current_size: u64,
        max_size: u64,
    },
    DictionariesUpdated {
        dictionaries: Vec<String>,
    },
}
