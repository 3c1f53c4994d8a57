//! Per-platform drivers behind one capability contract.
//!
//! A driver knows one site: how to build its search/detail/review URLs and
//! how to map its markup into [`RawExtraction`] values. Everything else —
//! sessions, identities, challenge handling, timeouts, retries — is the
//! orchestrator's business. Drivers never throw for "zero results found";
//! that is a valid empty success.

pub mod lazada;
pub mod shopee;
pub mod zalora;

use crate::error::CrawlResult;
use crate::records::{Platform, RawExtraction, RawReview, SearchFilters};
use crate::session::CrawlSession;
use async_trait::async_trait;
use scraper::ElementRef;
use std::collections::HashMap;
use std::sync::Arc;

pub use lazada::LazadaDriver;
pub use shopee::ShopeeDriver;
pub use zalora::ZaloraDriver;

/// The single contract every supported platform implements.
///
/// All operations run inside a fresh [`CrawlSession`] handed in by the
/// orchestrator; every navigation inside them is challenge-guarded by the
/// session itself.
#[async_trait]
pub trait PlatformDriver: Send + Sync {
    fn platform(&self) -> Platform;

    /// Paginated product search, up to `max_pages`. A page yielding zero
    /// extractable items terminates pagination early (end-of-results).
    async fn search_products(
        &self,
        session: &mut CrawlSession,
        query: &str,
        filters: &SearchFilters,
        max_pages: u32,
    ) -> CrawlResult<Vec<RawExtraction>>;

    /// Single product lookup by platform-native identifier. `Ok(None)`
    /// means the product page exists but no product could be extracted
    /// (delisted, region-blocked, ...).
    async fn product_details(
        &self,
        session: &mut CrawlSession,
        source_id: &str,
    ) -> CrawlResult<Option<RawExtraction>>;

    /// One page of reviews for a product.
    async fn product_reviews(
        &self,
        session: &mut CrawlSession,
        source_id: &str,
        page: u32,
    ) -> CrawlResult<Vec<RawReview>>;
}

/// Driver registry keyed by platform tag.
pub type DriverSet = HashMap<Platform, Arc<dyn PlatformDriver>>;

/// The built-in drivers, one per supported platform.
#[must_use]
pub fn default_drivers() -> DriverSet {
    let mut drivers: DriverSet = HashMap::new();
    drivers.insert(Platform::Lazada, Arc::new(LazadaDriver::new()));
    drivers.insert(Platform::Zalora, Arc::new(ZaloraDriver::new()));
    drivers.insert(Platform::Shopee, Arc::new(ShopeeDriver::new()));
    drivers
}

/// First matching descendant's trimmed inner text.
pub(crate) fn select_text(element: ElementRef<'_>, selector: &scraper::Selector) -> Option<String> {
    element.select(selector).next().map(|el| {
        el.text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    })
}

/// First matching descendant's attribute value.
pub(crate) fn select_attr(
    element: ElementRef<'_>,
    selector: &scraper::Selector,
    attr: &str,
) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// Resolve a possibly scheme-relative or path-relative href against a
/// site's base URL.
pub(crate) fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }
    format!("{}{}", base.trim_end_matches('/'), href)
}
