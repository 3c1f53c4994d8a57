//! Anti-bot challenge detection and the bounded wait/solve/retry protocol.
//!
//! Every navigation a platform driver performs goes through
//! [`ChallengeHandler::checked_navigation`] — drivers never hold the raw
//! browser session, so the state machine cannot be bypassed. An unresolved
//! challenge would otherwise yield empty or garbage extractions silently.
//!
//! States: `Browsing → ChallengeDetected → Waiting → Resolved | Blocked`.

use crate::browser::BrowserSession;
use crate::config::EngineConfig;
use crate::error::{CrawlError, CrawlResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Challenge state machine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    /// Normal navigation.
    Browsing,
    /// A challenge marker was found in the loaded page.
    ChallengeDetected,
    /// Bounded wait for self-clearing or for the solver capability.
    Waiting,
    /// Marker gone, target content present; back to browsing.
    Resolved,
    /// Wait ceiling and retry budget exhausted; session abandoned.
    Blocked,
}

/// Pluggable automated-solver capability.
///
/// The handler offers the live session to the solver once per wait. A
/// `true` return means the solver believes it acted; the handler still
/// re-inspects the page before trusting it.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    async fn attempt(&self, session: &mut dyn BrowserSession) -> bool;
}

/// Known interstitial markers across the supported platforms: Lazada's
/// baxia punish page and slider, PerimeterX (Zalora), and the generic
/// human-verification phrasings.
static CHALLENGE_MARKERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)verify\s+you\s+are\s+(?:a\s+)?human",
        r"(?i)unusual\s+traffic",
        r"(?i)are\s+you\s+a\s+robot",
        r"(?i)press\s*(?:&|and)\s*hold",
        r"(?i)slide\s+to\s+verify",
        r"(?i)please\s+enable\s+javascript\s+and\s+cookies",
        r#"(?i)id="baxia-punish""#,
        r#"(?i)id="px-captcha""#,
        r#"(?i)class="geetest_"#,
        r"(?i)cf-challenge",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("challenge marker pattern must compile"))
    .collect()
});

/// Whether the page HTML looks like an anti-bot interstitial.
#[must_use]
pub fn is_challenge_page(html: &str) -> bool {
    CHALLENGE_MARKERS.iter().any(|m| m.is_match(html))
}

/// Bounded wait/solve/retry policy.
#[derive(Debug, Clone)]
pub struct ChallengePolicy {
    pub wait_ceiling: Duration,
    pub poll_interval: Duration,
    /// Retries per crawl session, after the initial wait.
    pub max_retries: u32,
}

impl ChallengePolicy {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            wait_ceiling: config.challenge_wait_ceiling(),
            poll_interval: config.challenge_poll_interval(),
            max_retries: config.challenge_max_retries(),
        }
    }
}

/// Per-session challenge handler.
///
/// Owns the session's retry counter; a new handler is created for every
/// crawl session and never shared.
pub struct ChallengeHandler {
    policy: ChallengePolicy,
    solver: Option<Arc<dyn ChallengeSolver>>,
    state: ChallengeState,
    retries_used: u32,
}

impl ChallengeHandler {
    #[must_use]
    pub fn new(policy: ChallengePolicy, solver: Option<Arc<dyn ChallengeSolver>>) -> Self {
        Self {
            policy,
            solver,
            state: ChallengeState::Browsing,
            retries_used: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ChallengeState {
        self.state
    }

    /// Navigate and return the page HTML, transparently running the
    /// challenge protocol when an interstitial appears.
    ///
    /// `content_hint` is a substring the driver expects on a real content
    /// page; resolution requires the challenge marker gone *and* the hint
    /// present (when given), so a blank post-challenge page is not
    /// mistaken for success.
    pub async fn checked_navigation(
        &mut self,
        session: &mut dyn BrowserSession,
        url: &str,
        content_hint: Option<&str>,
    ) -> CrawlResult<String> {
        self.state = ChallengeState::Browsing;
        session.goto(url).await?;
        let html = session.content().await?;

        if !is_challenge_page(&html) {
            return Ok(html);
        }

        self.state = ChallengeState::ChallengeDetected;
        info!(url, "anti-bot challenge detected");

        loop {
            self.state = ChallengeState::Waiting;

            if let Some(solver) = self.solver.clone() {
                if solver.attempt(session).await {
                    debug!("challenge solver reports action taken");
                }
            }

            if let Some(html) = self.wait_for_resolution(session, content_hint).await? {
                self.state = ChallengeState::Resolved;
                info!(url, "challenge resolved, resuming browsing");
                return Ok(html);
            }

            if self.retries_used >= self.policy.max_retries {
                self.state = ChallengeState::Blocked;
                let attempts = self.retries_used + 1;
                warn!(url, attempts, "challenge persists, abandoning session");
                return Err(CrawlError::ChallengeUnresolved { attempts });
            }
            self.retries_used += 1;
            debug!(
                url,
                retry = self.retries_used,
                "challenge wait expired, re-navigating"
            );

            session.goto(url).await?;
            let html = session.content().await?;
            if !resolution_pending(&html, content_hint) {
                self.state = ChallengeState::Resolved;
                return Ok(html);
            }
            self.state = ChallengeState::ChallengeDetected;
        }
    }

    /// Poll the live page under the wait ceiling. Returns the page HTML on
    /// resolution, None when the ceiling expires with the marker still up.
    async fn wait_for_resolution(
        &self,
        session: &mut dyn BrowserSession,
        content_hint: Option<&str>,
    ) -> CrawlResult<Option<String>> {
        let started = Instant::now();
        while started.elapsed() < self.policy.wait_ceiling {
            tokio::time::sleep(self.policy.poll_interval).await;

            let html = session.content().await?;
            if !resolution_pending(&html, content_hint) {
                debug!(
                    "challenge cleared after {:.1}s",
                    started.elapsed().as_secs_f64()
                );
                return Ok(Some(html));
            }
        }
        Ok(None)
    }
}

/// True while the page still looks like a challenge (marker present, or
/// the expected content hint is missing).
fn resolution_pending(html: &str, content_hint: Option<&str>) -> bool {
    if is_challenge_page(html) {
        return true;
    }
    match content_hint {
        Some(hint) => !html.contains(hint),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const CHALLENGE_HTML: &str =
        r#"<html><body><div id="px-captcha">Please verify you are human</div></body></html>"#;
    const CONTENT_HTML: &str =
        r#"<html><body><div class="product-grid">listings</div></body></html>"#;

    /// Session that serves a scripted sequence of page snapshots.
    struct ScriptedSession {
        snapshots: VecDeque<String>,
        current: String,
        navigations: u32,
    }

    impl ScriptedSession {
        fn new(snapshots: Vec<&str>) -> Self {
            Self {
                snapshots: snapshots.into_iter().map(str::to_string).collect(),
                current: String::new(),
                navigations: 0,
            }
        }

        fn advance(&mut self) {
            if let Some(next) = self.snapshots.pop_front() {
                self.current = next;
            }
        }
    }

    #[async_trait]
    impl BrowserSession for ScriptedSession {
        async fn goto(&mut self, _url: &str) -> CrawlResult<()> {
            self.navigations += 1;
            self.advance();
            Ok(())
        }

        async fn content(&mut self) -> CrawlResult<String> {
            let html = self.current.clone();
            // Each inspection reveals the next scripted snapshot, so a
            // wait-poll can observe the challenge clearing.
            self.advance();
            Ok(html)
        }

        async fn current_url(&mut self) -> Option<String> {
            None
        }

        async fn close(&mut self) {}
    }

    fn fast_policy() -> ChallengePolicy {
        ChallengePolicy {
            wait_ceiling: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            max_retries: 2,
        }
    }

    #[test]
    fn markers_match_known_interstitials() {
        assert!(is_challenge_page(CHALLENGE_HTML));
        assert!(is_challenge_page("<p>Slide to verify</p>"));
        assert!(is_challenge_page(r#"<div id="baxia-punish"></div>"#));
        assert!(is_challenge_page("We detected unusual traffic from you"));
        assert!(!is_challenge_page(CONTENT_HTML));
    }

    #[tokio::test]
    async fn clean_page_passes_straight_through() {
        let mut session = ScriptedSession::new(vec![CONTENT_HTML]);
        let mut handler = ChallengeHandler::new(fast_policy(), None);

        let html = handler
            .checked_navigation(&mut session, "https://example.test", None)
            .await
            .unwrap();
        assert!(html.contains("product-grid"));
        assert_eq!(handler.state(), ChallengeState::Browsing);
    }

    #[tokio::test]
    async fn self_clearing_challenge_resolves() {
        // goto loads the challenge; the first content() inspection still
        // sees it; a later poll sees real content.
        let mut session = ScriptedSession::new(vec![
            CHALLENGE_HTML,
            CHALLENGE_HTML,
            CHALLENGE_HTML,
            CONTENT_HTML,
        ]);
        let mut handler = ChallengeHandler::new(fast_policy(), None);

        let html = handler
            .checked_navigation(&mut session, "https://example.test", Some("product-grid"))
            .await
            .unwrap();
        assert!(html.contains("product-grid"));
        assert_eq!(handler.state(), ChallengeState::Resolved);
    }

    #[tokio::test]
    async fn persistent_challenge_blocks_after_bounded_retries() {
        let mut session = ScriptedSession::new(vec![CHALLENGE_HTML; 64]);
        let mut handler = ChallengeHandler::new(fast_policy(), None);

        let err = handler
            .checked_navigation(&mut session, "https://example.test", None)
            .await
            .unwrap_err();
        match err {
            CrawlError::ChallengeUnresolved { attempts } => assert_eq!(attempts, 3),
            other => panic!("expected ChallengeUnresolved, got {other:?}"),
        }
        assert_eq!(handler.state(), ChallengeState::Blocked);
        // initial navigation + exactly max_retries re-navigations
        assert_eq!(session.navigations, 3);
    }

    #[tokio::test]
    async fn resolution_requires_content_hint_when_given() {
        // Marker clears but the expected content never shows up: still a
        // challenge failure, not a silent empty extraction.
        let mut session = ScriptedSession::new(vec![CHALLENGE_HTML; 2]);
        session.snapshots.extend(
            std::iter::repeat("<html><body>empty shell</body></html>".to_string()).take(64),
        );
        let mut handler = ChallengeHandler::new(fast_policy(), None);

        let err = handler
            .checked_navigation(&mut session, "https://example.test", Some("product-grid"))
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::ChallengeUnresolved { .. }));
    }

    #[tokio::test]
    async fn solver_is_offered_the_session() {
        struct CountingSolver(std::sync::atomic::AtomicU32);

        #[async_trait]
        impl ChallengeSolver for CountingSolver {
            async fn attempt(&self, _session: &mut dyn BrowserSession) -> bool {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                true
            }
        }

        let solver = Arc::new(CountingSolver(std::sync::atomic::AtomicU32::new(0)));
        let mut session = ScriptedSession::new(vec![CHALLENGE_HTML; 64]);
        let mut handler = ChallengeHandler::new(fast_policy(), Some(solver.clone()));

        let _ = handler
            .checked_navigation(&mut session, "https://example.test", None)
            .await;
        // Offered once per wait: initial + two retries.
        assert_eq!(solver.0.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
