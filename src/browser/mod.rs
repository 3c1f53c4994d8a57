//! The injected browser-automation capability.
//!
//! The engine never talks to a browser library directly: platform drivers
//! and the challenge handler operate on the [`BrowserSession`] trait, and
//! the orchestrator opens sessions through a [`BrowserEngine`]. Production
//! uses the chromiumoxide adapter in [`chromium`]; tests substitute
//! scripted fakes.

pub mod chromium;
pub mod stealth;

use crate::error::CrawlResult;
use crate::identity::Identity;
use async_trait::async_trait;

/// A live, navigable browser page bound to one crawl session.
///
/// Every method is a suspension point; cancellation takes effect only at
/// these boundaries.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to `url` and wait for the load to settle.
    async fn goto(&mut self, url: &str) -> CrawlResult<()>;

    /// Current serialized page HTML.
    async fn content(&mut self) -> CrawlResult<String>;

    /// URL the page currently sits on, if known.
    async fn current_url(&mut self) -> Option<String>;

    /// Tear the session down, releasing browser resources. Idempotent.
    async fn close(&mut self);
}

/// Opens fresh browser sessions configured for one [`Identity`].
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn open(&self, identity: &Identity) -> CrawlResult<Box<dyn BrowserSession>>;
}
