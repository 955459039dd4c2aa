//! Cache service: the single-writer queue in front of the cache manager.
//! The manager runs on its own spawned task with no shared memory; callers
//! hold a cloneable handle and talk to it over a command channel with
//! oneshot replies, plus a broadcast receiver for unsolicited events.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

use crate::metrics::{metric_names, MetricsRegistry};

use super::fetch::{Fetch, FetchError, FetchRequest};
use super::manager::{CacheManager, InterceptedResponse};
use super::region::CacheRegion;
use super::{CacheConfig, CacheEvent, CacheInfo, ClearOutcome};

/// Command queue depth; excess callers await a slot.
const COMMAND_QUEUE_DEPTH: usize = 64;
/// Broadcast buffer for slow observers.
const EVENT_QUEUE_DEPTH: usize = 64;

/// Commands consumed by the service loop. The first three mirror the
/// external message protocol; `Intercept` is the fetch path, message-passed
/// like everything else so all cache access is serialized.
pub enum CacheCommand {
    GetCacheInfo {
        reply: oneshot::Sender<CacheInfo>,
        enqueued_at: Instant,
    },
    GetCachedDictionaries {
        reply: oneshot::Sender<Vec<String>>,
        enqueued_at: Instant,
    },
    ClearCache {
        reply: oneshot::Sender<ClearOutcome>,
        enqueued_at: Instant,
    },
    Intercept {
        request: FetchRequest,
        reply: oneshot::Sender<Result<InterceptedResponse, FetchError>>,
        enqueued_at: Instant,
    },
}

/// Cloneable caller facade over the service loop.
#[derive(Clone)]
pub struct CacheServiceHandle {
    commands: mpsc::Sender<CacheCommand>,
    events: broadcast::Sender<CacheEvent>,
}

impl CacheServiceHandle {
    /// Query size, quota, and usage percentage.
    pub async fn cache_info(&self) -> Result<CacheInfo, String> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::GetCacheInfo {
            reply,
            enqueued_at: Instant::now(),
        })
        .await?;
        rx.await.map_err(|_| "cache service closed".to_string())
    }

    /// Query file names of cached dictionary data resources.
    pub async fn cached_dictionaries(&self) -> Result<Vec<String>, String> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::GetCachedDictionaries {
            reply,
            enqueued_at: Instant::now(),
        })
        .await?;
        rx.await.map_err(|_| "cache service closed".to_string())
    }

    /// Wipe and re-seed the cache region.
    pub async fn clear_cache(&self) -> Result<ClearOutcome, String> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::ClearCache {
            reply,
            enqueued_at: Instant::now(),
        })
        .await?;
        rx.await.map_err(|_| "cache service closed".to_string())
    }

    /// Route a resource request through the interception layer.
    pub async fn fetch(
        &self,
        request: FetchRequest,
    ) -> Result<InterceptedResponse, FetchError> {
        let (reply, rx) = oneshot::channel();
        self.send(CacheCommand::Intercept {
            request,
            reply,
            enqueued_at: Instant::now(),
        })
        .await
        .map_err(|_| FetchError::ServiceClosed)?;
        rx.await.map_err(|_| FetchError::ServiceClosed)?
    }

    /// Subscribe to unsolicited cache events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: CacheCommand) -> Result<(), String> {
        self.commands
            .send(command)
            .await
            .map_err(|_| "cache service closed".to_string())
    }
}

/// Open the region, install the shell set, activate (delete stale regions),
/// and spawn the service loop. A failed install aborts the start and leaves
/// previous regions untouched.
pub async fn start<F: Fetch>(
    config: CacheConfig,
    fetcher: F,
    cache_dir: &Path,
    metrics: Arc<MetricsRegistry>,
) -> Result<CacheServiceHandle, String> {
    let (events, _) = broadcast::channel(EVENT_QUEUE_DEPTH);
    let region = CacheRegion::open(cache_dir, &config.region_name())?;
    let mut manager = CacheManager::new(
        region,
        fetcher,
        config,
        Arc::clone(&metrics),
        events.clone(),
    )?;

    manager.install().await?;
    manager.activate();

    let (commands, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    tokio::spawn(run_loop(manager, rx, metrics));

    Ok(CacheServiceHandle { commands, events })
}

/// The single-writer loop. Every cache read, write, and size recompute goes
/// through here, so the quota check-then-store is serialized by
/// construction.
async fn run_loop<F: Fetch>(
    mut manager: CacheManager<F>,
    mut rx: mpsc::Receiver<CacheCommand>,
    metrics: Arc<MetricsRegistry>,
) {
    info!("cache service loop started");

    while let Some(command) = rx.recv().await {
        match command {
            CacheCommand::GetCacheInfo { reply, enqueued_at } => {
                metrics.record(
                    metric_names::QUEUE_WAIT_CACHE,
                    enqueued_at.elapsed().as_micros() as f64,
                );
                let _ = reply.send(manager.cache_info());
            }
            CacheCommand::GetCachedDictionaries { reply, enqueued_at } => {
                metrics.record(
                    metric_names::QUEUE_WAIT_CACHE,
                    enqueued_at.elapsed().as_micros() as f64,
                );
                let _ = reply.send(manager.cached_dictionaries());
            }
            CacheCommand::ClearCache { reply, enqueued_at } => {
                metrics.record(
                    metric_names::QUEUE_WAIT_CACHE,
                    enqueued_at.elapsed().as_micros() as f64,
                );
                let _ = reply.send(manager.clear().await);
            }
            CacheCommand::Intercept {
                request,
                reply,
                enqueued_at,
            } => {
                metrics.record(
                    metric_names::QUEUE_WAIT_CACHE,
                    enqueued_at.elapsed().as_micros() as f64,
                );
                if reply.send(manager.intercept(&request).await).is_err() {
                    warn!("intercept reply dropped (caller gone)");
                }
            }
        }
    }

    info!("cache service loop exiting");
}
