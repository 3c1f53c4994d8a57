//! Ephemeral crawl sessions.
//!
//! One [`CrawlSession`] exists per platform-driver invocation. It owns a
//! browser session opened for a single [`Identity`], the session's page
//! budget, and the per-session challenge handler. Sessions are never
//! shared across platforms or reused across queries — identity reuse
//! increases detection risk.

use crate::browser::{BrowserEngine, BrowserSession};
use crate::challenge::{ChallengeHandler, ChallengePolicy, ChallengeSolver};
use crate::error::{CrawlError, CrawlResult};
use crate::identity::Identity;
use crate::records::Platform;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct CrawlSession {
    id: Uuid,
    platform: Platform,
    identity: Identity,
    browser: Box<dyn BrowserSession>,
    challenges: ChallengeHandler,
    pages_remaining: u32,
}

impl CrawlSession {
    /// Open a fresh session against `engine` for one driver invocation.
    pub async fn open(
        engine: &dyn BrowserEngine,
        platform: Platform,
        identity: Identity,
        policy: ChallengePolicy,
        solver: Option<Arc<dyn ChallengeSolver>>,
        page_budget: u32,
    ) -> CrawlResult<Self> {
        let browser = engine.open(&identity).await?;
        let id = Uuid::new_v4();
        debug!(session = %id, platform = %platform, identity = %identity.id, "crawl session opened");
        Ok(Self {
            id,
            platform,
            identity,
            browser,
            challenges: ChallengeHandler::new(policy, solver),
            pages_remaining: page_budget,
        })
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Navigate to `url` and return the page HTML.
    ///
    /// This is the only navigation door available to drivers: the page
    /// budget is charged and the challenge protocol runs on every call.
    pub async fn navigate(&mut self, url: &str, content_hint: Option<&str>) -> CrawlResult<String> {
        if self.pages_remaining == 0 {
            return Err(CrawlError::SessionBudgetExhausted);
        }
        self.pages_remaining -= 1;

        self.challenges
            .checked_navigation(self.browser.as_mut(), url, content_hint)
            .await
    }

    /// Release browser resources. Idempotent; always called by the
    /// orchestrator on every exit path including deadline expiry.
    pub async fn teardown(&mut self) {
        debug!(session = %self.id, "tearing down crawl session");
        self.browser.close().await;
    }
}
