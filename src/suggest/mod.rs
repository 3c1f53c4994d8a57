//! AI suggestion collaborator client.
//!
//! Optional enrichment: `{ query }` in, suggested related terms and filter
//! hints out. The engine never depends on this service's availability —
//! any transport, status, or decode failure logs a warning and yields
//! nothing, leaving crawl results untouched.

use crate::records::SearchFilters;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Hard ceiling so a slow collaborator cannot drag a search response.
const SUGGEST_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Serialize)]
struct SuggestionRequest<'a> {
    query: &'a str,
}

/// Collaborator response payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Suggestions {
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub filters: Option<SearchFilters>,
}

pub struct SuggestionClient {
    endpoint: String,
    client: reqwest::Client,
}

impl SuggestionClient {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SUGGEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    /// Full enrichment call. None on any failure.
    pub async fn fetch(&self, query: &str) -> Option<Suggestions> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SuggestionRequest { query })
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("suggestion collaborator unreachable: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                status = %response.status(),
                "suggestion collaborator returned an error status"
            );
            return None;
        }

        match response.json::<Suggestions>().await {
            Ok(suggestions) => {
                debug!(count = suggestions.suggestions.len(), "suggestions received");
                Some(suggestions)
            }
            Err(e) => {
                warn!("suggestion payload did not decode: {e}");
                None
            }
        }
    }

    /// Suggested terms only; empty on any failure.
    pub async fn suggest(&self, query: &str) -> Vec<String> {
        self.fetch(query)
            .await
            .map(|s| s.suggestions)
            .unwrap_or_default()
    }
}
