//! Engine configuration.
//!
//! One `EngineConfig` is threaded through every component at construction
//! time. Defaults are tuned for polite crawling; the binary layers
//! environment overrides on top (see [`EngineConfig::from_env`]).

use crate::records::Platform;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time-to-live for cached search results. Hours, not days —
/// prices move.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 4 * 60 * 60;

/// Default combined navigation + extraction deadline per platform driver.
pub const DEFAULT_DRIVER_TIMEOUT_SECS: u64 = 90;

/// Default deadline for a single page navigation.
pub const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 30;

/// Default ceiling for one challenge wait.
pub const DEFAULT_CHALLENGE_WAIT_SECS: u64 = 25;

/// Challenge re-inspection interval while waiting.
pub const DEFAULT_CHALLENGE_POLL_MILLIS: u64 = 1_500;

/// Bounded challenge retries per crawl session.
pub const DEFAULT_CHALLENGE_MAX_RETRIES: u32 = 2;

/// Default search result pages fetched per platform.
pub const DEFAULT_MAX_PAGES: u32 = 3;

/// Default page/step budget for one crawl session.
pub const DEFAULT_SESSION_PAGE_BUDGET: u32 = 12;

/// Identities excluded from re-selection per platform.
pub const DEFAULT_IDENTITY_RECENCY_WINDOW: usize = 2;

/// Full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub(crate) cache_ttl: Duration,
    pub(crate) driver_timeout: Duration,
    pub(crate) navigation_timeout: Duration,
    pub(crate) challenge_wait_ceiling: Duration,
    pub(crate) challenge_poll_interval: Duration,
    pub(crate) challenge_max_retries: u32,
    pub(crate) max_pages: u32,
    pub(crate) session_page_budget: u32,
    pub(crate) identity_recency_window: usize,

    /// Upstream proxy endpoints (`scheme://host:port`). Empty pool means
    /// every identity uses the direct route (`routed = false`).
    pub(crate) proxy_pool: Vec<String>,

    /// Platforms enabled for this deployment. Requests naming a disabled
    /// platform get a recorded failure for it, not a hard error.
    pub(crate) enabled_platforms: Vec<Platform>,

    /// Optional endpoint for the AI suggestion collaborator.
    pub(crate) suggestion_endpoint: Option<String>,

    /// Explicit Chrome/Chromium executable. None lets the browser layer
    /// auto-detect.
    pub(crate) chrome_executable: Option<String>,

    pub(crate) headless: bool,

    /// Sqlite database path for the persistent cache store. None keeps the
    /// cache in memory.
    pub(crate) cache_db_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            driver_timeout: Duration::from_secs(DEFAULT_DRIVER_TIMEOUT_SECS),
            navigation_timeout: Duration::from_secs(DEFAULT_NAVIGATION_TIMEOUT_SECS),
            challenge_wait_ceiling: Duration::from_secs(DEFAULT_CHALLENGE_WAIT_SECS),
            challenge_poll_interval: Duration::from_millis(DEFAULT_CHALLENGE_POLL_MILLIS),
            challenge_max_retries: DEFAULT_CHALLENGE_MAX_RETRIES,
            max_pages: DEFAULT_MAX_PAGES,
            session_page_budget: DEFAULT_SESSION_PAGE_BUDGET,
            identity_recency_window: DEFAULT_IDENTITY_RECENCY_WINDOW,
            proxy_pool: Vec::new(),
            enabled_platforms: Platform::ALL.to_vec(),
            suggestion_endpoint: None,
            chrome_executable: None,
            headless: true,
            cache_db_path: None,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Defaults layered with environment overrides.
    ///
    /// Recognized variables: `SHOPSCOUT_CACHE_TTL_SECS`,
    /// `SHOPSCOUT_DRIVER_TIMEOUT_SECS`, `SHOPSCOUT_PROXY_POOL`
    /// (comma-separated), `SHOPSCOUT_PLATFORMS` (comma-separated),
    /// `SHOPSCOUT_SUGGEST_URL`, `SHOPSCOUT_CHROME`, `SHOPSCOUT_CACHE_DB`,
    /// `SHOPSCOUT_HEADFUL`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut builder = Self::builder();

        if let Some(secs) = env_u64("SHOPSCOUT_CACHE_TTL_SECS") {
            builder = builder.cache_ttl(Duration::from_secs(secs));
        }
        if let Some(secs) = env_u64("SHOPSCOUT_DRIVER_TIMEOUT_SECS") {
            builder = builder.driver_timeout(Duration::from_secs(secs));
        }
        if let Ok(pool) = std::env::var("SHOPSCOUT_PROXY_POOL") {
            let proxies: Vec<String> = pool
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            builder = builder.proxy_pool(proxies);
        }
        if let Ok(platforms) = std::env::var("SHOPSCOUT_PLATFORMS") {
            let enabled: Vec<Platform> = platforms
                .split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect();
            if !enabled.is_empty() {
                builder = builder.enabled_platforms(enabled);
            }
        }
        if let Ok(url) = std::env::var("SHOPSCOUT_SUGGEST_URL") {
            builder = builder.suggestion_endpoint(url);
        }
        if let Ok(path) = std::env::var("SHOPSCOUT_CHROME") {
            builder = builder.chrome_executable(path);
        }
        if let Ok(path) = std::env::var("SHOPSCOUT_CACHE_DB") {
            builder = builder.cache_db_path(path);
        }
        if std::env::var("SHOPSCOUT_HEADFUL").is_ok() {
            builder = builder.headless(false);
        }

        builder.build()
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    #[must_use]
    pub fn driver_timeout(&self) -> Duration {
        self.driver_timeout
    }

    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        self.navigation_timeout
    }

    #[must_use]
    pub fn challenge_wait_ceiling(&self) -> Duration {
        self.challenge_wait_ceiling
    }

    #[must_use]
    pub fn challenge_poll_interval(&self) -> Duration {
        self.challenge_poll_interval
    }

    #[must_use]
    pub fn challenge_max_retries(&self) -> u32 {
        self.challenge_max_retries
    }

    #[must_use]
    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    #[must_use]
    pub fn session_page_budget(&self) -> u32 {
        self.session_page_budget
    }

    #[must_use]
    pub fn identity_recency_window(&self) -> usize {
        self.identity_recency_window
    }

    #[must_use]
    pub fn proxy_pool(&self) -> &[String] {
        &self.proxy_pool
    }

    #[must_use]
    pub fn enabled_platforms(&self) -> &[Platform] {
        &self.enabled_platforms
    }

    #[must_use]
    pub fn suggestion_endpoint(&self) -> Option<&str> {
        self.suggestion_endpoint.as_deref()
    }

    #[must_use]
    pub fn chrome_executable(&self) -> Option<&str> {
        self.chrome_executable.as_deref()
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn cache_db_path(&self) -> Option<&str> {
        self.cache_db_path.as_deref()
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Fluent builder over [`EngineConfig`] defaults.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfigDefaults,
}

#[derive(Debug, Clone)]
struct EngineConfigDefaults(EngineConfig);

impl Default for EngineConfigDefaults {
    fn default() -> Self {
        Self(EngineConfig::default())
    }
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.0.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn driver_timeout(mut self, timeout: Duration) -> Self {
        self.config.0.driver_timeout = timeout;
        self
    }

    #[must_use]
    pub fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.config.0.navigation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn challenge_wait_ceiling(mut self, ceiling: Duration) -> Self {
        self.config.0.challenge_wait_ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn challenge_poll_interval(mut self, interval: Duration) -> Self {
        self.config.0.challenge_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn challenge_max_retries(mut self, retries: u32) -> Self {
        self.config.0.challenge_max_retries = retries;
        self
    }

    #[must_use]
    pub fn max_pages(mut self, pages: u32) -> Self {
        self.config.0.max_pages = pages.max(1);
        self
    }

    #[must_use]
    pub fn session_page_budget(mut self, budget: u32) -> Self {
        self.config.0.session_page_budget = budget.max(1);
        self
    }

    #[must_use]
    pub fn identity_recency_window(mut self, window: usize) -> Self {
        self.config.0.identity_recency_window = window;
        self
    }

    #[must_use]
    pub fn proxy_pool(mut self, proxies: Vec<String>) -> Self {
        self.config.0.proxy_pool = proxies;
        self
    }

    #[must_use]
    pub fn enabled_platforms(mut self, platforms: Vec<Platform>) -> Self {
        self.config.0.enabled_platforms = platforms;
        self
    }

    #[must_use]
    pub fn suggestion_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.0.suggestion_endpoint = Some(url.into());
        self
    }

    #[must_use]
    pub fn chrome_executable(mut self, path: impl Into<String>) -> Self {
        self.config.0.chrome_executable = Some(path.into());
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.0.headless = headless;
        self
    }

    #[must_use]
    pub fn cache_db_path(mut self, path: impl Into<String>) -> Self {
        self.config.0.cache_db_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn build(self) -> EngineConfig {
        self.config.0
    }
}
