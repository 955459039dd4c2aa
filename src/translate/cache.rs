//! In-memory LRU translation cache with TTL.
//! Key: blake3 hash of (dictionary fingerprint | input text), so any edit to
//! the active dictionary invalidates its cached translations.
//! Capacity: 512, TTL: 10 minutes.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

use crate::dictionary::DictionaryWord;

struct CacheEntry {
    tokens: Vec<DictionaryWord>,
    inserted_at: Instant,
}

pub struct TranslationCache {
    inner: Mutex<LruCache<[u8; 32], CacheEntry>>,
    ttl: Duration,
}

impl TranslationCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("cache capacity must be > 0"),
            )),
            ttl,
        }
    }

    /// Compute the cache key from translation parameters.
    pub fn compute_key(dictionary_fingerprint: &[u8; 32], text: &str) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(dictionary_fingerprint);
        hasher.update(b"|");
        hasher.update(text.as_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Look up a cached token sequence. Returns None if absent or expired.
    pub fn get(&self, key: &[u8; 32]) -> Option<Vec<DictionaryWord>> {
        let mut cache = self.inner.lock();
        if let Some(entry) = cache.get(key) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.tokens.clone());
            }
            // Expired, remove it
            cache.pop(key);
        }
        None
    }

    /// Insert a token sequence into the cache.
    pub fn insert(&self, key: [u8; 32], tokens: Vec<DictionaryWord>) {
        let mut cache = self.inner.lock();
        cache.put(
            key,
            CacheEntry {
                tokens,
                inserted_at: Instant::now(),
            },
        );
    }
}
