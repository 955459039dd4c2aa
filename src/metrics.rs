//! Observability: per-request tracing ids and histogram metrics.
//! Histograms track p50/p95/p99 for the pipeline's timing points.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Samples retained per metric; older samples are overwritten.
const WINDOW_CAPACITY: usize = 1024;

/// Identifiers attached to a request flowing through the cache service.
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub trace_id: String,
    pub request_id: String,
}

impl RequestIds {
    pub fn new() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// A span measuring elapsed time from creation to explicit end.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    pub fn new(name: &'static str, registry: Arc<MetricsRegistry>) -> Self {
        Self {
            name,
            start: Instant::now(),
            registry,
        }
    }

    /// End the span, recording elapsed duration in microseconds.
    pub fn finish(self) -> f64 {
        let elapsed_us = self.start.elapsed().as_micros() as f64;
        self.registry.record(self.name, elapsed_us);
        elapsed_us
    }
}

/// Sliding window of the most recent samples for one metric.
struct SampleWindow {
    samples: Box<[f64]>,
    head: usize,
    len: usize,
}

impl SampleWindow {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, value: f64) {
        self.samples[self.head] = value;
        self.head += 1;
        if self.head == self.samples.len() {
            self.head = 0;
        }
        if self.len < self.samples.len() {
            self.len += 1;
        }
    }

    /// Nearest-rank percentile over the retained samples.
    fn percentile(&self, p: f64) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        let mut sorted = self.samples[..self.len].to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = ((p / 100.0) * self.len as f64).ceil() as usize;
        sorted[rank.clamp(1, self.len) - 1]
    }
}

/// Stores histograms for all named metrics.
pub struct MetricsRegistry {
    windows: Mutex<HashMap<&'static str, SampleWindow>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Record a sample (in microseconds) for the named metric.
    pub fn record(&self, name: &'static str, value_us: f64) {
        self.windows
            .lock()
            .entry(name)
            .or_insert_with(|| SampleWindow::new(WINDOW_CAPACITY))
            .push(value_us);
        tracing::debug!(metric = name, value_us = value_us, "metric_recorded");
    }

    /// Start a timing span that records on finish.
    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan::new(name, Arc::clone(self))
    }

    /// Get percentile for a metric (p value 0-100). Returns microseconds.
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        self.windows
            .lock()
            .get(name)
            .map_or(0.0, |window| window.percentile(p))
    }

    /// Generate a summary of all metrics at p50/p95/p99.
    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        self.windows
            .lock()
            .iter()
            .map(|(&name, window)| {
                (
                    name.to_string(),
                    MetricSummary {
                        p50_us: window.percentile(50.0),
                        p95_us: window.percentile(95.0),
                        p99_us: window.percentile(99.0),
                        count: window.len,
                    },
                )
            })
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub count: usize,
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    pub const TRANSLATE_DONE: &str = "t_translate_done";
    pub const FETCH_NETWORK: &str = "t_fetch_network";
    pub const CACHE_LOOKUP: &str = "t_cache_lookup";
    pub const CACHE_SIZE_RECOMPUTE: &str = "t_cache_size_recompute";
    pub const INSTALL_SEED: &str = "t_install_seed";
    pub const QUEUE_WAIT_CACHE: &str = "queue_wait_cache";
}
