//! Cache manager: interception, quota admission, shell seeding, clearing.
//! All state lives in one explicit instance owned by the service loop; there
//! are no module-level globals.

use std::sync::Arc;

use futures_util::future::try_join_all;
use regex::Regex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::metrics::{metric_names, MetricsRegistry, RequestIds};

use super::fetch::{Fetch, FetchError, FetchRequest, FetchedResponse};
use super::region::CacheRegion;
use super::{CacheConfig, CacheEvent, CacheInfo, ClearOutcome};

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Cache,
    Network,
    ShellFallback,
}

/// Reply to an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub response: FetchedResponse,
    pub served: ServedFrom,
}

/// The cache manager instance. Owns the region, the network seam, the size
/// mirror, and the event broadcaster.
pub struct CacheManager<F: Fetch> {
    region: CacheRegion,
    fetcher: F,
    config: CacheConfig,
    data_pattern: Regex,
    current_size: u64,
    metrics: Arc<MetricsRegistry>,
    events: broadcast::Sender<CacheEvent>,
}

impl<F: Fetch> CacheManager<F> {
    pub fn new(
        region: CacheRegion,
        fetcher: F,
        config: CacheConfig,
        metrics: Arc<MetricsRegistry>,
        events: broadcast::Sender<CacheEvent>,
    ) -> Result<Self, String> {
        let data_pattern = Regex::new(&config.data_resource_pattern)
            .map_err(|e| format!("bad data resource pattern: {e}"))?;
        let current_size = region.total_size();
        Ok(Self {
            region,
            fetcher,
            config,
            data_pattern,
            current_size,
            metrics,
            events,
        })
    }

    /// Pre-populate the region with the core shell set. All-or-nothing: any
    /// failed seed fetch aborts the install.
    pub async fn install(&mut self) -> Result<(), String> {
        let span = self.metrics.span(metric_names::INSTALL_SEED);
        self.seed_shell().await?;
        self.current_size = self.region.total_size();
        span.finish();
        info!(
            region = self.region.name(),
            resources = self.config.shell_resources.len(),
            size = self.current_size,
            "install complete"
        );
        Ok(())
    }

    /// Delete every other region of the family, leaving only the current
    /// version. Runs after a successful install.
    pub fn activate(&self) -> Vec<String> {
        let deleted = self.region.activate(&self.config.region_prefix);
        info!(
            region = self.region.name(),
            stale_deleted = deleted.len(),
            "activate complete"
        );
        deleted
    }

    /// Intercept one outbound request.
    ///
    /// Cache-first with no revalidation; cached payloads are immutable per
    /// region version. Non-GET and foreign-origin requests pass straight to
    /// the network. Network failures on navigation requests fall back to the
    /// cached shell document; other failures propagate.
    pub async fn intercept(
        &mut self,
        request: &FetchRequest,
    ) -> Result<InterceptedResponse, FetchError> {
        let ids = RequestIds::new();

        let path = match self.config.canonical_path(&request.url) {
            Some(path) if request.is_get() => path,
            _ => {
                debug!(request_id = %ids.request_id, url = %request.url, "pass-through request");
                let response = self.fetch_network(request).await?;
                return Ok(InterceptedResponse {
                    response,
                    served: ServedFrom::Network,
                });
            }
        };

        let lookup = self.metrics.span(metric_names::CACHE_LOOKUP);
        let hit = self.region.get(&path);
        lookup.finish();
        if let Some(hit) = hit {
            debug!(request_id = %ids.request_id, url = %path, "served from cache");
            return Ok(InterceptedResponse {
                response: FetchedResponse {
                    status: 200,
                    content_type: hit.content_type,
                    body: hit.body,
                    basic: true,
                },
                served: ServedFrom::Cache,
            });
        }

        match self.fetch_network(request).await {
            Ok(response) => {
                if response.ok_basic() {
                    self.admit(&ids, &path, &response);
                }
                Ok(InterceptedResponse {
                    response,
                    served: ServedFrom::Network,
                })
            }
            Err(err) => {
                if is_navigation(request, &path) {
                    if let Some(shell) = self.region.get(&self.config.shell_document) {
                        warn!(
                            request_id = %ids.request_id,
                            url = %path,
                            error = %err,
                            "network failed, serving cached shell"
                        );
                        return Ok(InterceptedResponse {
                            response: FetchedResponse {
                                status: 200,
                                content_type: shell.content_type,
                                body: shell.body,
                                basic: true,
                            },
                            served: ServedFrom::ShellFallback,
                        });
                    }
                }
                Err(err)
            }
        }
    }

    /// Admission decision for a fresh network response. Dictionary data is
    /// quota-checked; everything else (core shell resources) is stored
    /// unconditionally.
    fn admit(&mut self, ids: &RequestIds, path: &str, response: &FetchedResponse) {
        if self.data_pattern.is_match(path) {
            let file_size = response.body.len() as u64;
            if self.would_exceed_quota(file_size) {
                warn!(
                    request_id = %ids.request_id,
                    url = %path,
                    file_size,
                    current_size = self.current_size,
                    max_size = self.config.max_bytes,
                    "quota would be exceeded, not caching"
                );
                let _ = self.events.send(CacheEvent::LimitExceeded {
                    url: path.to_string(),
                    file_size,
                    current_size: self.current_size,
                    max_size: self.config.max_bytes,
                });
                return;
            }
            if let Err(e) = self
                .region
                .put(path, response.content_type.as_deref(), &response.body)
            {
                warn!(error = %e, url = %path, "dictionary cache write failed");
                return;
            }
            self.broadcast_size();
            let _ = self.events.send(CacheEvent::DictionariesUpdated {
                dictionaries: self.cached_dictionaries(),
            });
        } else if let Err(e) = self
            .region
            .put(path, response.content_type.as_deref(), &response.body)
        {
            warn!(error = %e, url = %path, "cache write failed");
        } else {
            self.current_size = self.region.total_size();
        }
    }

    /// `GET_CACHE_INFO`: O(n) size recompute, mirror update, broadcast.
    pub fn cache_info(&mut self) -> CacheInfo {
        self.broadcast_size()
    }

    /// `GET_CACHED_DICTIONARIES`: file-name tails of cached data resources.
    pub fn cached_dictionaries(&self) -> Vec<String> {
        self.region.list_matching(&self.data_pattern)
    }

    /// `CLEAR_CACHE`: wipe the region, re-seed the shell set, reply with the
    /// recomputed size. Idempotent.
    pub async fn clear(&mut self) -> ClearOutcome {
        if let Err(e) = self.region.clear() {
            warn!(error = %e, "cache clear failed");
            return ClearOutcome {
                success: false,
                new_size: self.current_size,
            };
        }

        let success = match self.seed_shell().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "shell re-seed after clear failed");
                false
            }
        };

        let info = self.broadcast_size();
        let _ = self.events.send(CacheEvent::DictionariesUpdated {
            dictionaries: self.cached_dictionaries(),
        });

        ClearOutcome {
            success,
            new_size: info.size,
        }
    }

    /// Would caching `candidate_size` more bytes push the region over quota?
    fn would_exceed_quota(&mut self, candidate_size: u64) -> bool {
        self.current_size = self.region.total_size();
        self.current_size + candidate_size > self.config.max_bytes
    }

    fn broadcast_size(&mut self) -> CacheInfo {
        let span = self.metrics.span(metric_names::CACHE_SIZE_RECOMPUTE);
        self.current_size = self.region.total_size();
        span.finish();
        let info = CacheInfo::new(self.current_size, self.config.max_bytes);
        let _ = self.events.send(CacheEvent::SizeUpdated(info));
        info
    }

    async fn fetch_network(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
        let span = self.metrics.span(metric_names::FETCH_NETWORK);
        let result = self.fetcher.fetch(request).await;
        span.finish();
        result
    }

    /// Fetch and store every shell resource; all-or-nothing.
    async fn seed_shell(&self) -> Result<(), String> {
        let fetches = self.config.shell_resources.iter().map(|path| {
            let request = FetchRequest::get(path.clone());
            async move {
                let response = self
                    .fetcher
                    .fetch(&request)
                    .await
                    .map_err(|e| format!("seed fetch {path} failed: {e}"))?;
                if response.status != 200 {
                    return Err(format!("seed fetch {path} returned {}", response.status));
                }
                Ok((path.clone(), response))
            }
        });

        let seeded = try_join_all(fetches).await?;
        for (path, response) in seeded {
            self.region
                .put(&path, response.content_type.as_deref(), &response.body)?;
        }
        Ok(())
    }
}

/// Navigation request: HTML path, root, or an Accept header asking for HTML.
fn is_navigation(request: &FetchRequest, path: &str) -> bool {
    path.ends_with(".html")
        || path == "/"
        || request
            .accept
            .as_deref()
            .is_some_and(|accept| accept.contains("text/html"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Scripted fetcher: path -> body, with an offline switch.
    struct StubFetcher {
        routes: HashMap<String, Vec<u8>>,
        offline: AtomicBool,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new(routes: &[(&str, &[u8])]) -> Self {
            Self {
                routes: routes
                    .iter()
                    .map(|(path, body)| (path.to_string(), body.to_vec()))
                    .collect(),
                offline: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetch for StubFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(FetchError::Network("offline".to_string()));
            }
            match self.routes.get(&request.url) {
                Some(body) => Ok(FetchedResponse {
                    status: 200,
                    content_type: None,
                    body: body.clone(),
                    basic: !request.url.starts_with("http"),
                }),
                None => Ok(FetchedResponse {
                    status: 404,
                    content_type: None,
                    body: Vec::new(),
                    basic: true,
                }),
            }
        }
    }

    fn test_config(max_bytes: u64) -> CacheConfig {
        CacheConfig {
            max_bytes,
            shell_resources: vec!["/index.html".to_string(), "/assets/index.js".to_string()],
            ..CacheConfig::default()
        }
    }

    fn manager_with(
        dir: &TempDir,
        fetcher: StubFetcher,
        config: CacheConfig,
    ) -> CacheManager<StubFetcher> {
        let region = CacheRegion::open(dir.path(), &config.region_name()).expect("region");
        let (events, _) = broadcast::channel(16);
        CacheManager::new(
            region,
            fetcher,
            config,
            Arc::new(MetricsRegistry::new()),
            events,
        )
        .expect("manager")
    }

    const SHELL_ROUTES: &[(&str, &[u8])] = &[
        ("/index.html", b"<html>shell</html>"),
        ("/assets/index.js", b"console.log(1)"),
    ];

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let dir = TempDir::new().expect("dir");
        let fetcher = StubFetcher::new(&[("/page.css", b"body{}")]);
        let mut manager = manager_with(&dir, fetcher, test_config(1024));

        let first = manager
            .intercept(&FetchRequest::get("/page.css"))
            .await
            .expect("fetch");
        assert_eq!(first.served, ServedFrom::Network);

        let second = manager
            .intercept(&FetchRequest::get("/page.css"))
            .await
            .expect("fetch");
        assert_eq!(second.served, ServedFrom::Cache);
        assert_eq!(second.response.body, b"body{}");
        assert_eq!(manager.fetcher.call_count(), 1, "no revalidation");
    }

    #[tokio::test]
    async fn non_get_requests_pass_through_uncached() {
        let dir = TempDir::new().expect("dir");
        let fetcher = StubFetcher::new(&[("/api", b"ok")]);
        let mut manager = manager_with(&dir, fetcher, test_config(1024));

        let mut request = FetchRequest::get("/api");
        request.method = "POST".to_string();

        let reply = manager.intercept(&request).await.expect("fetch");
        assert_eq!(reply.served, ServedFrom::Network);
        let again = manager.intercept(&request).await.expect("fetch");
        assert_eq!(again.served, ServedFrom::Network);
        assert_eq!(manager.fetcher.call_count(), 2);
    }

    #[tokio::test]
    async fn foreign_origin_requests_pass_through() {
        let dir = TempDir::new().expect("dir");
        let fetcher = StubFetcher::new(&[("https://cdn.example/lib.js", b"lib")]);
        let mut manager = manager_with(&dir, fetcher, test_config(1024));

        let reply = manager
            .intercept(&FetchRequest::get("https://cdn.example/lib.js"))
            .await
            .expect("fetch");
        assert_eq!(reply.served, ServedFrom::Network);
        assert!(manager.region.get("https://cdn.example/lib.js").is_none());
    }

    #[tokio::test]
    async fn non_200_responses_are_not_cached() {
        let dir = TempDir::new().expect("dir");
        let fetcher = StubFetcher::new(&[]);
        let mut manager = manager_with(&dir, fetcher, test_config(1024));

        let reply = manager
            .intercept(&FetchRequest::get("/missing.css"))
            .await
            .expect("fetch");
        assert_eq!(reply.response.status, 404);
        assert!(manager.region.get("/missing.css").is_none());
    }

    #[tokio::test]
    async fn navigation_failure_falls_back_to_cached_shell() {
        let dir = TempDir::new().expect("dir");
        let fetcher = StubFetcher::new(SHELL_ROUTES);
        let mut manager = manager_with(&dir, fetcher, test_config(1024));
        manager.install().await.expect("install");

        manager.fetcher.go_offline();

        let reply = manager
            .intercept(&FetchRequest::get("/deep/page.html"))
            .await
            .expect("shell fallback");
        assert_eq!(reply.served, ServedFrom::ShellFallback);
        assert_eq!(reply.response.body, b"<html>shell</html>");

        // Root path and Accept-header detection both count as navigation.
        let reply = manager
            .intercept(&FetchRequest::get("/"))
            .await
            .expect("shell fallback");
        assert_eq!(reply.served, ServedFrom::ShellFallback);

        let reply = manager
            .intercept(&FetchRequest::get("/some/route").with_accept("text/html,*/*"))
            .await
            .expect("shell fallback");
        assert_eq!(reply.served, ServedFrom::ShellFallback);
    }

    #[tokio::test]
    async fn non_navigation_failure_propagates() {
        let dir = TempDir::new().expect("dir");
        let fetcher = StubFetcher::new(SHELL_ROUTES);
        let mut manager = manager_with(&dir, fetcher, test_config(1024));
        manager.install().await.expect("install");

        manager.fetcher.go_offline();

        let err = manager
            .intercept(&FetchRequest::get("/data/big_language.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[tokio::test]
    async fn shell_resources_are_quota_exempt() {
        let dir = TempDir::new().expect("dir");
        let fetcher = StubFetcher::new(&[("/assets/huge.js", &[0u8; 512][..])]);
        // Quota far below the asset size.
        let mut manager = manager_with(&dir, fetcher, test_config(16));

        manager
            .intercept(&FetchRequest::get("/assets/huge.js"))
            .await
            .expect("fetch");
        assert!(manager.region.get("/assets/huge.js").is_some());
    }

    #[tokio::test]
    async fn install_is_all_or_nothing() {
        let dir = TempDir::new().expect("dir");
        // Missing /assets/index.js route: that seed fetch returns 404.
        let fetcher = StubFetcher::new(&[("/index.html", b"<html></html>")]);
        let mut manager = manager_with(&dir, fetcher, test_config(1024));

        assert!(manager.install().await.is_err());
    }
}
