//! Translation subsystem: tokenizing longest-match engine plus an L1 cache
//! fronting it. The engine itself is pure; the service adds caching and
//! timing around it.

pub mod cache;
pub mod engine;
pub mod numerals;
pub mod tokenize;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::dictionary::{Dictionary, DictionaryWord};
use crate::metrics::{metric_names, MetricsRegistry, RequestIds};

use cache::TranslationCache;

pub use engine::{
    translate, CATEGORY_FORMATTING, CATEGORY_NOT_FOUND, CATEGORY_NUMBER, CATEGORY_PHRASE,
};

/// Default L1 cache capacity (entries).
const CACHE_CAPACITY: usize = 512;
/// Default L1 cache TTL.
const CACHE_TTL: Duration = Duration::from_secs(600);

/// Result of one service-level translation.
#[derive(Debug, Clone, Serialize)]
pub struct TranslateOutcome {
    pub request_id: String,
    pub tokens: Vec<DictionaryWord>,
    pub cached: bool,
    pub elapsed_ms: f64,
}

impl TranslateOutcome {
    /// Concatenated `dolgan` fields: the full translated text.
    pub fn translated_text(&self) -> String {
        self.tokens.iter().map(|t| t.dolgan.as_str()).collect()
    }
}

/// Cache-fronted translation entry point.
pub struct TranslationService {
    cache: TranslationCache,
    metrics: Arc<MetricsRegistry>,
}

impl TranslationService {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            cache: TranslationCache::new(CACHE_CAPACITY, CACHE_TTL),
            metrics,
        }
    }

    /// Translate `text` against `dict`, consulting the L1 cache first.
    pub fn translate(&self, dict: &Dictionary, text: &str) -> TranslateOutcome {
        let ids = RequestIds::new();
        let start = std::time::Instant::now();
        let key = TranslationCache::compute_key(&dict.fingerprint(), text);

        if let Some(tokens) = self.cache.get(&key) {
            debug!(request_id = %ids.request_id, "translation cache hit");
            return TranslateOutcome {
                request_id: ids.request_id,
                tokens,
                cached: true,
                elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
            };
        }

        let tokens = translate(dict, text);
        self.cache.insert(key, tokens.clone());

        let elapsed_us = start.elapsed().as_micros() as f64;
        self.metrics.record(metric_names::TRANSLATE_DONE, elapsed_us);
        debug!(
            request_id = %ids.request_id,
            tokens = tokens.len(),
            elapsed_us = elapsed_us,
            "translation done"
        );

        TranslateOutcome {
            request_id: ids.request_id,
            tokens,
            cached: false,
            elapsed_ms: elapsed_us / 1000.0,
        }
    }
}
