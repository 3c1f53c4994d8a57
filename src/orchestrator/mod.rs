//! The crawl orchestrator.
//!
//! Explicitly constructed with injected dependencies (browser engine,
//! drivers, cache, config) so its lifecycle belongs to the caller and
//! several instances can coexist in tests. One search request flows:
//! normalize → cache consult → admission slot → concurrent per-platform
//! dispatch under deadlines → merge → cache write-back.
//!
//! The admission slot is the process's single shared crawl permit: a
//! one-permit semaphore acquired with `try_acquire_owned`, so a concurrent
//! crawl fails fast with `CrawlBusy` and the owned permit releases on
//! every exit path, panics and cancellation included.

use crate::browser::BrowserEngine;
use crate::cache::{FlightOutcome, SearchCache};
use crate::challenge::{ChallengePolicy, ChallengeSolver};
use crate::config::EngineConfig;
use crate::error::{CrawlError, CrawlResult};
use crate::identity::IdentityManager;
use crate::merge;
use crate::platforms::{DriverSet, PlatformDriver};
use crate::records::{
    MergedResult, Platform, PlatformFailure, QueryKey, RawExtraction, RawReview, SearchFilters,
    SearchRequest,
};
use crate::session::CrawlSession;
use crate::suggest::SuggestionClient;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub struct Orchestrator {
    config: EngineConfig,
    engine: Arc<dyn BrowserEngine>,
    drivers: DriverSet,
    cache: Arc<SearchCache>,
    identities: Arc<IdentityManager>,
    suggestions: Option<SuggestionClient>,
    solver: Option<Arc<dyn ChallengeSolver>>,
    admission: Arc<Semaphore>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        engine: Arc<dyn BrowserEngine>,
        drivers: DriverSet,
        cache: Arc<SearchCache>,
    ) -> Self {
        let identities = Arc::new(IdentityManager::new(&config));
        Self {
            config,
            engine,
            drivers,
            cache,
            identities,
            suggestions: None,
            solver: None,
            admission: Arc::new(Semaphore::new(1)),
        }
    }

    /// Attach the optional AI suggestion collaborator.
    #[must_use]
    pub fn with_suggestions(mut self, client: SuggestionClient) -> Self {
        self.suggestions = Some(client);
        self
    }

    /// Attach an automated challenge solver capability.
    #[must_use]
    pub fn with_solver(mut self, solver: Arc<dyn ChallengeSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    /// The façade search operation.
    pub async fn search(&self, request: SearchRequest) -> CrawlResult<MergedResult> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(CrawlError::InvalidRequest("query must not be empty".into()));
        }
        if request.platforms.is_empty() {
            return Err(CrawlError::InvalidRequest(
                "at least one platform must be requested".into(),
            ));
        }

        let key = QueryKey::new(&query, &request.platforms, &request.filters);
        info!(query = %key.query(), platforms = %key.platform_set(), "search request");

        let outcome = self
            .cache
            .single_flight(&key, request.bypass_cache, || {
                self.crawl_all(&key, &query, &request)
            })
            .await?;

        let mut merged = match outcome {
            FlightOutcome::Cached(entry) => MergedResult {
                success: true,
                results: entry.results,
                errors: Vec::new(),
                stale: false,
                suggestions: Vec::new(),
            },
            FlightOutcome::Produced(result) => result,
        };

        // Enrichment is strictly best-effort: the collaborator being down
        // must never affect crawl results.
        if let Some(client) = &self.suggestions {
            merged.suggestions = client.suggest(&query).await;
        }

        Ok(merged)
    }

    /// Single product lookup through the same session/identity/retry
    /// discipline as search. Used by the price-history collaborator.
    pub async fn product_details(
        &self,
        platform: Platform,
        source_id: &str,
    ) -> CrawlResult<Option<RawExtraction>> {
        let driver = self.driver_for(platform)?;
        let _permit = self.acquire_slot()?;

        self.with_retry(platform, || {
            let driver = driver.clone();
            let source_id = source_id.to_string();
            move |mut session: CrawlSession| async move {
                let result = driver.product_details(&mut session, &source_id).await;
                (session, result)
            }
        })
        .await
    }

    /// One page of reviews for a product.
    pub async fn product_reviews(
        &self,
        platform: Platform,
        source_id: &str,
        page: u32,
    ) -> CrawlResult<Vec<RawReview>> {
        let driver = self.driver_for(platform)?;
        let _permit = self.acquire_slot()?;

        self.with_retry(platform, || {
            let driver = driver.clone();
            let source_id = source_id.to_string();
            move |mut session: CrawlSession| async move {
                let result = driver.product_reviews(&mut session, &source_id, page).await;
                (session, result)
            }
        })
        .await
    }

    fn driver_for(&self, platform: Platform) -> CrawlResult<Arc<dyn PlatformDriver>> {
        if !self.config.enabled_platforms().contains(&platform) {
            return Err(CrawlError::InvalidRequest(format!(
                "platform {platform} is disabled"
            )));
        }
        self.drivers.get(&platform).cloned().ok_or_else(|| {
            CrawlError::InvalidRequest(format!("no driver registered for {platform}"))
        })
    }

    fn acquire_slot(&self) -> CrawlResult<tokio::sync::OwnedSemaphorePermit> {
        self.admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| CrawlError::CrawlBusy)
    }

    /// The crawl path behind the cache's single-flight: admission, fan-out,
    /// merge, write-back, stale fallback.
    async fn crawl_all(
        &self,
        key: &QueryKey,
        query: &str,
        request: &SearchRequest,
    ) -> CrawlResult<MergedResult> {
        // Held until the merged result is produced; released on every exit
        // path by the owned permit's drop.
        let _permit = self.acquire_slot()?;

        let mut requested: Vec<Platform> = request.platforms.clone();
        requested.sort();
        requested.dedup();

        let crawls = requested.iter().map(|&platform| async move {
            let outcome = match self.driver_for(platform) {
                Ok(driver) => {
                    self.crawl_platform(platform, driver, query, &request.filters)
                        .await
                }
                Err(e) => Err(e),
            };
            (platform, outcome)
        });

        let outcomes = join_all(crawls).await;

        let mut raw: Vec<RawExtraction> = Vec::new();
        let mut failures: Vec<PlatformFailure> = Vec::new();
        let mut session_starts_failed = 0usize;

        for (platform, outcome) in outcomes {
            match outcome {
                Ok(items) => {
                    debug!(platform = %platform, count = items.len(), "platform crawl complete");
                    raw.extend(items);
                }
                Err(e) => {
                    if matches!(e, CrawlError::NoSession(_)) {
                        session_starts_failed += 1;
                    }
                    warn!(platform = %platform, "platform crawl failed: {e}");
                    failures.push(PlatformFailure {
                        platform,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Only total infrastructure failure escalates to a request error.
        if session_starts_failed == requested.len() && !requested.is_empty() {
            return Err(CrawlError::NoSession(
                "no platform driver could start a crawl session".into(),
            ));
        }

        let results = merge::merge_results(&raw, &request.filters);
        let all_failed = failures.len() == requested.len();

        if all_failed {
            // Stale-while-revalidate: an expired entry annotated as stale
            // beats an empty answer.
            match self.cache.get_stale(key).await {
                Ok(Some(stale)) => {
                    info!("all platforms failed, serving stale cache entry");
                    return Ok(MergedResult {
                        success: true,
                        results: stale.results,
                        errors: failures,
                        stale: true,
                        suggestions: Vec::new(),
                    });
                }
                Ok(None) => {}
                Err(e) => warn!("stale cache read failed: {e}"),
            }
            return Ok(MergedResult {
                success: true,
                results,
                errors: failures,
                stale: false,
                suggestions: Vec::new(),
            });
        }

        if let Err(e) = self
            .cache
            .put(key, results.clone(), self.config.cache_ttl())
            .await
        {
            warn!("cache write failed, serving uncached result: {e}");
        }

        Ok(MergedResult {
            success: true,
            results,
            errors: failures,
            stale: false,
            suggestions: Vec::new(),
        })
    }

    /// One platform's crawl: fresh session and identity, bounded by the
    /// per-driver deadline. A `NavigationTimeout` is retried exactly once
    /// with a new identity; `ChallengeUnresolved` is surfaced untouched.
    async fn crawl_platform(
        &self,
        platform: Platform,
        driver: Arc<dyn PlatformDriver>,
        query: &str,
        filters: &SearchFilters,
    ) -> CrawlResult<Vec<RawExtraction>> {
        let first = self
            .run_search_attempt(platform, driver.clone(), query, filters)
            .await;

        match first {
            Err(e) if e.is_retryable() => {
                warn!(platform = %platform, "retrying once with a fresh identity after: {e}");
                self.run_search_attempt(platform, driver, query, filters)
                    .await
            }
            other => other,
        }
    }

    async fn run_search_attempt(
        &self,
        platform: Platform,
        driver: Arc<dyn PlatformDriver>,
        query: &str,
        filters: &SearchFilters,
    ) -> CrawlResult<Vec<RawExtraction>> {
        let identity = self.identities.allocate(platform);
        if !identity.routed && !self.config.proxy_pool().is_empty() {
            warn!(platform = %platform, "proceeding without egress route");
        }

        let mut session = CrawlSession::open(
            self.engine.as_ref(),
            platform,
            identity,
            ChallengePolicy::from_config(&self.config),
            self.solver.clone(),
            self.config.session_page_budget(),
        )
        .await?;

        let deadline = self.config.driver_timeout();
        let outcome = tokio::time::timeout(
            deadline,
            driver.search_products(&mut session, query, filters, self.config.max_pages()),
        )
        .await;

        // Teardown on every path: deadline expiry must not leak a browser.
        session.teardown().await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(CrawlError::NavigationTimeout(deadline)),
        }
    }

    /// Session-per-attempt retry wrapper for the non-search operations.
    async fn with_retry<T, MkOp, Op, Fut>(&self, platform: Platform, make_op: MkOp) -> CrawlResult<T>
    where
        MkOp: Fn() -> Op,
        Op: FnOnce(CrawlSession) -> Fut,
        Fut: std::future::Future<Output = (CrawlSession, CrawlResult<T>)>,
    {
        let first = self.run_attempt(platform, make_op()).await;
        match first {
            Err(e) if e.is_retryable() => {
                warn!(platform = %platform, "retrying once with a fresh identity after: {e}");
                self.run_attempt(platform, make_op()).await
            }
            other => other,
        }
    }

    async fn run_attempt<T, Op, Fut>(&self, platform: Platform, op: Op) -> CrawlResult<T>
    where
        Op: FnOnce(CrawlSession) -> Fut,
        Fut: std::future::Future<Output = (CrawlSession, CrawlResult<T>)>,
    {
        let identity = self.identities.allocate(platform);
        let session = CrawlSession::open(
            self.engine.as_ref(),
            platform,
            identity,
            ChallengePolicy::from_config(&self.config),
            self.solver.clone(),
            self.config.session_page_budget(),
        )
        .await?;

        let deadline = self.config.driver_timeout();
        match tokio::time::timeout(deadline, op(session)).await {
            Ok((mut session, result)) => {
                session.teardown().await;
                result
            }
            // The session is owned by the cancelled future and dropped with
            // it; the browser-side drop guard aborts its handler.
            Err(_) => Err(CrawlError::NavigationTimeout(deadline)),
        }
    }
}
