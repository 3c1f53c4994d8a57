pub mod browser;
pub mod cache;
pub mod challenge;
pub mod config;
pub mod error;
pub mod identity;
pub mod merge;
pub mod orchestrator;
pub mod platforms;
pub mod records;
pub mod session;
pub mod suggest;

pub use browser::chromium::ChromiumEngine;
pub use browser::{BrowserEngine, BrowserSession};
pub use cache::{CacheStore, MemoryStore, SearchCache, SqliteStore};
pub use challenge::{ChallengeHandler, ChallengePolicy, ChallengeSolver, ChallengeState};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use error::{CrawlError, CrawlResult};
pub use identity::{Identity, IdentityManager};
pub use merge::merge_results;
pub use orchestrator::Orchestrator;
pub use platforms::{default_drivers, DriverSet, PlatformDriver};
pub use records::{
    ExtractionConfidence, MergedResult, Platform, PlatformFailure, ProductRecord, QueryKey,
    RawExtraction, RawReview, SearchFilters, SearchRequest,
};
pub use session::CrawlSession;
pub use suggest::{SuggestionClient, Suggestions};

use std::sync::Arc;

/// Assemble an orchestrator with the production stack: chromium browser
/// engine, built-in drivers, and a sqlite- or memory-backed cache per the
/// config.
pub async fn build_orchestrator(config: EngineConfig) -> CrawlResult<Orchestrator> {
    let store: Arc<dyn CacheStore> = match config.cache_db_path() {
        Some(path) => Arc::new(
            SqliteStore::connect(path)
                .await
                .map_err(|e| CrawlError::CacheUnavailable(e.to_string()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };
    let cache = Arc::new(SearchCache::new(store));
    let engine = Arc::new(ChromiumEngine::new(&config));

    let suggestion_client = config
        .suggestion_endpoint()
        .map(|endpoint| SuggestionClient::new(endpoint.to_string()));

    let mut orchestrator = Orchestrator::new(config, engine, default_drivers(), cache);
    if let Some(client) = suggestion_client {
        orchestrator = orchestrator.with_suggestions(client);
    }
    Ok(orchestrator)
}
