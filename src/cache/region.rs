//! Versioned cache region backed by SQLite.
//! One database file per region name; rows are url-keyed response bodies.
//! Activation deletes every sibling region file of the same family whose
//! name differs from the current one.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

/// File extension used for region databases.
const REGION_FILE_EXT: &str = "sqlite3";

/// A cached response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResource {
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// A named, on-disk cache region.
pub struct CacheRegion {
    conn: Mutex<Connection>,
    name: String,
    dir: PathBuf,
}

impl CacheRegion {
    /// Open (or create) the region database `<dir>/<name>.sqlite3`.
    pub fn open(dir: &Path, name: &str) -> Result<Self, String> {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("failed to create cache directory: {e}"))?;

        let path = region_file(dir, name);
        let conn = Connection::open(&path)
            .map_err(|e| format!("failed to open cache region: {e}"))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| format!("PRAGMA failed: {e}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS resources (
                url TEXT PRIMARY KEY,
                content_type TEXT,
                body BLOB NOT NULL,
                stored_at INTEGER NOT NULL
            );",
        )
        .map_err(|e| format!("create resources table failed: {e}"))?;

        info!(region = name, path = %path.display(), "cache region opened");

        Ok(Self {
            conn: Mutex::new(conn),
            name: name.to_string(),
            dir: dir.to_path_buf(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a cached resource by url.
    pub fn get(&self, url: &str) -> Option<CachedResource> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT content_type, body FROM resources WHERE url = ?1",
            params![url],
            |row| {
                Ok(CachedResource {
                    url: url.to_string(),
                    content_type: row.get(0)?,
                    body: row.get(1)?,
                })
            },
        )
        .optional()
        .unwrap_or_else(|e| {
            warn!(error = %e, url, "cache region read failed");
            None
        })
    }

    /// Store a resource. Concurrent writes to the same url are
    /// last-write-wins.
    pub fn put(&self, url: &str, content_type: Option<&str>, body: &[u8]) -> Result<(), String> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO resources (url, content_type, body, stored_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![url, content_type, body, now_unix()],
        )
        .map_err(|e| format!("cache region write failed: {e}"))?;
        debug!(url, bytes = body.len(), "resource cached");
        Ok(())
    }

    /// Total stored bytes, summed over every response body.
    pub fn total_size(&self) -> u64 {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(body)), 0) FROM resources",
            [],
            |row| row.get::<_, i64>(0),
        )
        .unwrap_or_else(|e| {
            warn!(error = %e, "cache size query failed");
            0
        }) as u64
    }

    /// Urls of every stored resource, in insertion-independent sorted order.
    pub fn urls(&self) -> Vec<String> {
        let conn = self.conn.lock();
        let mut stmt = match conn.prepare("SELECT url FROM resources ORDER BY url") {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "cache url listing failed");
                return Vec::new();
            }
        };
        let rows = stmt.query_map([], |row| row.get::<_, String>(0)).ok();
        match rows {
            Some(iter) => iter.filter_map(|r| r.ok()).collect(),
            None => Vec::new(),
        }
    }

    /// File-name tails of stored urls matching `pattern`.
    pub fn list_matching(&self, pattern: &Regex) -> Vec<String> {
        self.urls()
            .into_iter()
            .filter(|url| pattern.is_match(url))
            .map(|url| url.rsplit('/').next().unwrap_or(&url).to_string())
            .collect()
    }

    /// Drop every stored resource.
    pub fn clear(&self) -> Result<usize, String> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM resources", [])
            .map_err(|e| format!("cache region clear failed: {e}"))?;
        info!(removed, region = %self.name, "cache region cleared");
        Ok(removed)
    }

    /// Delete every sibling region file of `family_prefix` whose name is not
    /// this region's. Returns the deleted region names.
    pub fn activate(&self, family_prefix: &str) -> Vec<String> {
        let mut deleted = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "cache directory scan failed");
                return deleted;
            }
        };

        for entry in entries.flatten() {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(region_name) = file_name.strip_suffix(&format!(".{REGION_FILE_EXT}")) else {
                continue;
            };
            if !region_name.starts_with(family_prefix) || region_name == self.name {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    // WAL sidecars go with the database file.
                    for suffix in ["-wal", "-shm"] {
                        let _ = std::fs::remove_file(
                            self.dir.join(format!("{file_name}{suffix}")),
                        );
                    }
                    info!(region = region_name, "stale cache region deleted");
                    deleted.push(region_name.to_string());
                }
                Err(e) => warn!(error = %e, region = region_name, "stale region delete failed"),
            }
        }

        deleted
    }
}

fn region_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{REGION_FILE_EXT}"))
}

/// Current time as Unix timestamp (seconds).
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
