//! Shared test doubles: a scripted browser engine and a mock platform
//! driver. The fakes exercise the real session, challenge, cache, and
//! orchestrator code without a browser.

use async_trait::async_trait;
use parking_lot::Mutex;
use shopscout::{
    BrowserEngine, BrowserSession, CrawlError, CrawlResult, CrawlSession, EngineConfig, Identity,
    Platform, PlatformDriver, RawExtraction, RawReview, SearchFilters,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Engine whose sessions serve canned HTML chosen by URL substring.
#[derive(Default)]
pub struct FakeEngine {
    pages: Vec<(String, String)>,
    pub opens: AtomicU32,
    pub identities_seen: Mutex<Vec<Identity>>,
    pub fail_open: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url_fragment: &str, html: &str) -> Self {
        self.pages.push((url_fragment.to_string(), html.to_string()));
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BrowserEngine for FakeEngine {
    async fn open(&self, identity: &Identity) -> CrawlResult<Box<dyn BrowserSession>> {
        if self.fail_open {
            return Err(CrawlError::NoSession("fake engine configured to fail".into()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.identities_seen.lock().push(identity.clone());
        Ok(Box::new(FakeSession {
            pages: self.pages.clone(),
            current: String::new(),
        }))
    }
}

pub struct FakeSession {
    pages: Vec<(String, String)>,
    current: String,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn goto(&mut self, url: &str) -> CrawlResult<()> {
        self.current = self
            .pages
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, html)| html.clone())
            .unwrap_or_else(|| "<html><body></body></html>".to_string());
        Ok(())
    }

    async fn content(&mut self) -> CrawlResult<String> {
        Ok(self.current.clone())
    }

    async fn current_url(&mut self) -> Option<String> {
        None
    }

    async fn close(&mut self) {}
}

/// Scriptable platform driver with an invocation counter.
pub enum MockBehavior {
    /// Return these items after an optional delay.
    Items(Vec<RawExtraction>, Duration),
    /// Fail with an unresolved challenge.
    Challenge,
    /// Fail with a navigation timeout (retryable).
    Timeout,
}

pub struct MockDriver {
    platform: Platform,
    behavior: MockBehavior,
    pub search_calls: Arc<AtomicU32>,
}

impl MockDriver {
    pub fn new(platform: Platform, behavior: MockBehavior) -> Self {
        Self {
            platform,
            behavior,
            search_calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl PlatformDriver for MockDriver {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn search_products(
        &self,
        _session: &mut CrawlSession,
        _query: &str,
        _filters: &SearchFilters,
        _max_pages: u32,
    ) -> CrawlResult<Vec<RawExtraction>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Items(items, delay) => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(items.clone())
            }
            MockBehavior::Challenge => Err(CrawlError::ChallengeUnresolved { attempts: 3 }),
            MockBehavior::Timeout => Err(CrawlError::NavigationTimeout(Duration::from_secs(30))),
        }
    }

    async fn product_details(
        &self,
        _session: &mut CrawlSession,
        _source_id: &str,
    ) -> CrawlResult<Option<RawExtraction>> {
        Ok(None)
    }

    async fn product_reviews(
        &self,
        _session: &mut CrawlSession,
        _source_id: &str,
        _page: u32,
    ) -> CrawlResult<Vec<RawReview>> {
        Ok(Vec::new())
    }
}

/// Raw extraction fixture.
pub fn extraction(platform: Platform, id: &str, price_text: &str) -> RawExtraction {
    RawExtraction {
        platform,
        source_id: id.to_string(),
        title: format!("item {id}"),
        price_text: price_text.to_string(),
        original_price_text: None,
        product_url: format!("https://example.test/{id}"),
        image_url: String::new(),
        rating_text: None,
        rating_count_text: None,
        confidence: shopscout::ExtractionConfidence::Direct,
    }
}

/// Config with short deadlines so failure paths run in milliseconds.
pub fn test_config() -> EngineConfig {
    EngineConfig::builder()
        .driver_timeout(Duration::from_secs(5))
        .navigation_timeout(Duration::from_secs(1))
        .challenge_wait_ceiling(Duration::from_millis(40))
        .challenge_poll_interval(Duration::from_millis(5))
        .max_pages(2)
        .cache_ttl(Duration::from_secs(300))
        .build()
}
