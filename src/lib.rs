//! Tolmach: offline dictionary translator core.
//! A persistent dictionary store, a tokenizing longest-match translation
//! engine, and a quota-bounded offline resource cache driven over a
//! message-passing protocol. The presentation layer is an external embedder
//! that calls `bootstrap` and holds the returned context.

pub mod cache;
pub mod dictionary;
pub mod metrics;
pub mod translate;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use cache::fetch::{Fetch, FetchRequest, HttpFetcher};
use cache::service::{self, CacheServiceHandle};
use cache::CacheConfig;
use dictionary::import::parse_dictionary;
use dictionary::sample_dictionary;
use dictionary::store::{DictionaryStore, KNOWN_DICTIONARY_FILES};
use metrics::MetricsRegistry;
use translate::TranslationService;

/// Fallback data directory when `TOLMACH_DATA_DIR` is unset.
const DEFAULT_DATA_DIR: &str = "tolmach-data";

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Resolve configuration from the environment.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("TOLMACH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));
        Self {
            data_dir,
            cache: CacheConfig::default(),
        }
    }
}

/// Shared application state handed to the embedder.
pub struct AppContext {
    pub store: Arc<DictionaryStore>,
    pub cache: CacheServiceHandle,
    pub translation: Arc<TranslationService>,
    pub metrics: Arc<MetricsRegistry>,
}

/// Initialize the tracing subscriber. Call once from the embedder.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tolmach=debug".parse().unwrap()),
        )
        .with_target(true)
        .init();
}

/// Build and wire the application: open the store, start the cache service
/// (install, activate, spawn loop), seed default dictionaries through it,
/// and construct the translation service.
pub async fn bootstrap<F: Fetch>(config: AppConfig, fetcher: F) -> Result<AppContext, String> {
    info!(data_dir = %config.data_dir.display(), "tolmach starting");

    let metrics = Arc::new(MetricsRegistry::new());

    std::fs::create_dir_all(&config.data_dir)
        .map_err(|e| format!("failed to create data directory: {e}"))?;
    let store = Arc::new(DictionaryStore::open(
        &config.data_dir.join("dictionaries.sqlite3"),
    )?);

    let cache = service::start(
        config.cache,
        fetcher,
        &config.data_dir.join("cache"),
        Arc::clone(&metrics),
    )
    .await?;

    initialize_default_dictionaries(&store, &cache).await?;

    let translation = Arc::new(TranslationService::new(Arc::clone(&metrics)));

    info!("tolmach setup complete");

    Ok(AppContext {
        store,
        cache,
        translation,
        metrics,
    })
}

/// `bootstrap` with the real network fetcher.
pub async fn bootstrap_http(config: AppConfig) -> Result<AppContext, String> {
    let fetcher = HttpFetcher::new(config.cache.app_origin.clone())
        .map_err(|e| format!("http client init failed: {e}"))?;
    bootstrap(config, fetcher).await
}

/// Seed the store when it is empty: the bundled sample dictionary plus every
/// known data file, each fetched through the cache service so dictionary
/// downloads hit the offline cache. Per-file failures are logged and
/// skipped.
async fn initialize_default_dictionaries(
    store: &DictionaryStore,
    cache: &CacheServiceHandle,
) -> Result<(), String> {
    if !store.load().is_empty() {
        return Ok(());
    }

    let mut dictionaries = vec![sample_dictionary()];

    for file_name in KNOWN_DICTIONARY_FILES {
        let url = format!("/data/{file_name}");
        let body = match cache.fetch(FetchRequest::get(url.clone())).await {
            Ok(reply) if reply.response.status == 200 => reply.response.body,
            Ok(reply) => {
                warn!(url = %url, status = reply.response.status, "dictionary file unavailable");
                continue;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "dictionary file fetch failed");
                continue;
            }
        };

        let content = String::from_utf8_lossy(&body);
        let dict = match parse_dictionary(&content, file_name) {
            Ok(dict) => dict,
            Err(e) => {
                warn!(url = %url, error = %e, "dictionary file rejected");
                continue;
            }
        };

        if dictionaries.iter().any(|d| d.id() == dict.id()) {
            continue;
        }
        info!(
            to_language = %dict.info.to_language,
            words = dict.words.len(),
            "default dictionary loaded"
        );
        dictionaries.push(dict);
    }

    store.save_all(&dictionaries)
}
