//! Error taxonomy for crawl operations.
//!
//! Per-platform failures are isolated and recorded, never escalated to
//! abort sibling platforms; only total infrastructure failure (no session
//! could even start) escalates to the request level.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the engine.
pub type CrawlResult<T> = Result<T, CrawlError>;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// Site unreachable or too slow. Retried once per driver invocation
    /// with a fresh identity before being recorded as a platform failure.
    #[error("navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    /// The anti-bot challenge state machine gave up. Never retried within
    /// the same call — the session is burned.
    #[error("anti-bot challenge unresolved after {attempts} attempt(s)")]
    ChallengeUnresolved { attempts: u32 },

    /// Price text that could not be parsed into a number. The offending
    /// item is dropped from results, never coerced to zero.
    #[error("malformed price text: {0:?}")]
    MalformedPrice(String),

    /// The global admission slot is held by another crawl. Callers should
    /// retry later; this is not a server fault.
    #[error("another multi-platform crawl is already in flight")]
    CrawlBusy,

    /// The cache store failed. Caching is an optimization — the
    /// orchestrator degrades to a direct crawl.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Browser automation failure (launch, CDP, page crash).
    #[error("browser error: {0}")]
    Browser(String),

    /// The crawl session's page/step budget ran out.
    #[error("session page budget exhausted")]
    SessionBudgetExhausted,

    /// No platform driver could even start a session.
    #[error("no crawl session could be started: {0}")]
    NoSession(String),

    /// Invalid caller input (empty query, unknown platform, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CrawlError {
    /// Whether the orchestrator may retry this failure with a fresh
    /// identity within the same driver invocation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlError::NavigationTimeout(_))
    }
}

impl From<anyhow::Error> for CrawlError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} preserves the full context chain
        CrawlError::Browser(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_navigation_timeout_is_retryable() {
        assert!(CrawlError::NavigationTimeout(Duration::from_secs(30)).is_retryable());
        assert!(!CrawlError::ChallengeUnresolved { attempts: 3 }.is_retryable());
        assert!(!CrawlError::CrawlBusy.is_retryable());
        assert!(!CrawlError::Browser("boom".into()).is_retryable());
    }
}
