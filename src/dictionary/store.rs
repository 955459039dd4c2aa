//! Persistent dictionary store backed by SQLite.
//! The entire ordered dictionary list lives under a single namespaced record
//! and is read/written wholesale, never partially updated.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use super::{Dictionary, DictionaryId};

/// Namespaced record key holding the full dictionary list.
const DICTIONARIES_KEY: &str = "tolmach-dictionaries";

/// Dictionary data files expected under the application data folder.
pub const KNOWN_DICTIONARY_FILES: &[&str] = &["dolgan_language.json", "binary_language.json"];

/// SQLite-backed dictionary store.
pub struct DictionaryStore {
    conn: Mutex<Connection>,
}

impl DictionaryStore {
    /// Open (or create) the store database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, String> {
        let conn = Connection::open(db_path)
            .map_err(|e| format!("failed to open dictionary store: {e}"))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| format!("PRAGMA failed: {e}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .map_err(|e| format!("create store table failed: {e}"))?;

        info!(path = %db_path.display(), "dictionary store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Load the full dictionary list.
    ///
    /// Duplicate identities are dropped on load, earliest entry wins. A
    /// missing or unreadable record yields an empty list so the caller can
    /// re-initialize defaults.
    pub fn load(&self) -> Vec<Dictionary> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM store WHERE key = ?1",
                params![DICTIONARIES_KEY],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|e| {
                warn!(error = %e, "dictionary record read failed");
                None
            });

        let Some(raw) = raw else {
            return Vec::new();
        };

        let parsed: Vec<Dictionary> = match serde_json::from_str(&raw) {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "dictionary record corrupt, treating as empty");
                return Vec::new();
            }
        };

        dedup_by_identity(parsed)
    }

    /// Replace the stored list wholesale.
    pub fn save_all(&self, dictionaries: &[Dictionary]) -> Result<(), String> {
        let value = serde_json::to_string(dictionaries)
            .map_err(|e| format!("dictionary list serialize failed: {e}"))?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO store (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![DICTIONARIES_KEY, value, now_unix()],
        )
        .map_err(|e| format!("dictionary record write failed: {e}"))?;
        Ok(())
    }

    /// Insert or replace a dictionary by identity, preserving list order for
    /// replaced entries and appending new ones.
    pub fn upsert(&self, dictionary: Dictionary) -> Result<(), String> {
        let mut list = self.load();
        let id = dictionary.id();
        match list.iter().position(|d| d.id() == id) {
            Some(i) => list[i] = dictionary,
            None => list.push(dictionary),
        }
        self.save_all(&list)
    }

    /// Remove a dictionary by identity. Removing an absent identity is a
    /// no-op, not an error.
    pub fn delete(&self, id: &DictionaryId) -> Result<(), String> {
        let mut list = self.load();
        let before = list.len();
        list.retain(|d| &d.id() != id);
        if list.len() == before {
            return Ok(());
        }
        self.save_all(&list)
    }

    /// Look up a dictionary by identity.
    pub fn get(&self, id: &DictionaryId) -> Option<Dictionary> {
        self.load().into_iter().find(|d| &d.id() == id)
    }
}

/// Keep the earliest entry for each identity.
fn dedup_by_identity(list: Vec<Dictionary>) -> Vec<Dictionary> {
    let mut seen: std::collections::HashSet<DictionaryId> = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(list.len());
    for dict in list {
        if seen.insert(dict.id()) {
            out.push(dict);
        } else {
            warn!(id = %dict.id(), "duplicate dictionary dropped on load");
        }
    }
    out
}

/// Current time as Unix timestamp (seconds).
fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
