//! Canonical data model for cross-platform product aggregation.
//!
//! Every platform driver produces `RawExtraction` values in its site's own
//! vocabulary; the merger maps them into the platform-agnostic
//! `ProductRecord` that callers consume. Cache keys, cache entries, and the
//! merged response envelope also live here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use xxhash_rust::xxh3::xxh3_64;

/// A supported e-commerce platform.
///
/// Adding a platform means adding one variant here plus one driver
/// implementation — call sites dispatch through the `PlatformDriver`
/// contract, never through string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Lazada,
    Zalora,
    Shopee,
}

impl Platform {
    /// All platforms, in canonical order.
    pub const ALL: [Platform; 3] = [Platform::Lazada, Platform::Zalora, Platform::Shopee];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Lazada => "lazada",
            Platform::Zalora => "zalora",
            Platform::Shopee => "shopee",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lazada" => Ok(Platform::Lazada),
            "zalora" => Ok(Platform::Zalora),
            "shopee" => Ok(Platform::Shopee),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// How a field set was obtained from the page.
///
/// Downstream consumers rely on this to flag estimated or fallback data
/// distinctly from directly-scraped data; the merger passes it through
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionConfidence {
    /// Every field came straight out of a dedicated page element.
    Direct,
    /// One or more fields were derived (e.g. rating parsed from a style
    /// attribute width).
    Estimated,
    /// Extraction fell back to loose selectors; treat with suspicion.
    Fallback,
}

/// Canonical, platform-agnostic product listing.
///
/// Invariant: `price >= 0.0` (enforced during normalization — malformed
/// price text drops the item rather than defaulting it).
/// `source_id` is unique only within `source_platform`; global identity is
/// inferred, never guaranteed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub source_platform: Platform,
    pub source_id: String,
    pub title: String,
    /// Price in the reference currency.
    pub price: f64,
    pub original_price: Option<f64>,
    pub image_url: String,
    pub product_url: String,
    pub rating: Option<f32>,
    pub rating_count: Option<u32>,
    pub confidence: ExtractionConfidence,
}

/// Unprocessed, site-specific data pulled from one product card or page.
///
/// Text fields carry the page's literal strings (currency symbols,
/// thousands separators, "4.8 out of 5", ...); normalization happens in
/// the merger, not in drivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawExtraction {
    pub platform: Platform,
    pub source_id: String,
    pub title: String,
    pub price_text: String,
    pub original_price_text: Option<String>,
    pub product_url: String,
    pub image_url: String,
    pub rating_text: Option<String>,
    pub rating_count_text: Option<String>,
    pub confidence: ExtractionConfidence,
}

/// A single product review as extracted from a review page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReview {
    pub author: String,
    pub rating_text: Option<String>,
    pub body: String,
    pub date_text: Option<String>,
}

/// User-supplied result filters.
///
/// Canonicalization (for cache-key equality) rounds price bounds to cents,
/// the minimum rating to one decimal, and folds the brand to lowercase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub brand: Option<String>,
    pub min_rating: Option<f32>,
}

impl SearchFilters {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_price.is_none()
            && self.max_price.is_none()
            && self.brand.is_none()
            && self.min_rating.is_none()
    }

    /// Canonical form used in `QueryKey` equality.
    #[must_use]
    pub fn canonicalize(&self) -> CanonicalFilters {
        CanonicalFilters {
            min_price_cents: self.min_price.map(round_cents),
            max_price_cents: self.max_price.map(round_cents),
            brand: self
                .brand
                .as_ref()
                .map(|b| b.trim().to_lowercase())
                .filter(|b| !b.is_empty()),
            min_rating_tenths: self.min_rating.map(|r| (f64::from(r) * 10.0).round() as i64),
        }
    }
}

fn round_cents(price: f64) -> i64 {
    (price * 100.0).round() as i64
}

/// Filters after value rounding, suitable for hashing and equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalFilters {
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub brand: Option<String>,
    pub min_rating_tenths: Option<i64>,
}

/// Composite cache/admission key for one logical search.
///
/// Two keys are equal iff the normalized query text, the sorted platform
/// set, and the canonicalized filters are all equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    query: String,
    platforms: Vec<Platform>,
    filters: CanonicalFilters,
}

impl QueryKey {
    #[must_use]
    pub fn new(query: &str, platforms: &[Platform], filters: &SearchFilters) -> Self {
        let mut sorted: Vec<Platform> = platforms.to_vec();
        sorted.sort();
        sorted.dedup();
        Self {
            query: normalize_query(query),
            platforms: sorted,
            filters: filters.canonicalize(),
        }
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    #[must_use]
    pub fn filters(&self) -> &CanonicalFilters {
        &self.filters
    }

    /// Comma-joined platform set, as persisted in the cache row.
    #[must_use]
    pub fn platform_set(&self) -> String {
        self.platforms
            .iter()
            .map(Platform::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Stable hash of the canonical filter set for the cache row's
    /// `filters_hash` column.
    #[must_use]
    pub fn filters_hash(&self) -> u64 {
        let encoded = serde_json::to_vec(&self.filters).unwrap_or_default();
        xxh3_64(&encoded)
    }
}

/// Case-fold and collapse internal whitespace.
fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// One cached search result set.
///
/// Entries are immutable once written; a re-crawl after expiry supersedes
/// the row rather than mutating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub results: Vec<ProductRecord>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// A per-platform failure recorded during a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformFailure {
    pub platform: Platform,
    pub reason: String,
}

/// The merged, ordered answer for one search request.
///
/// `success` stays true even when every platform failed — an empty result
/// set with a populated `errors` list is distinguishable from "query had
/// no matches" and far more useful to callers than an error page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedResult {
    pub success: bool,
    pub results: Vec<ProductRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PlatformFailure>,
    /// True when the results came from an expired cache entry because all
    /// live crawls failed (stale-while-revalidate fallback).
    #[serde(default)]
    pub stale: bool,
    /// Optional AI-suggested related search terms. Always empty when the
    /// suggestion collaborator is unavailable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl MergedResult {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            success: true,
            results: Vec::new(),
            errors: Vec::new(),
            stale: false,
            suggestions: Vec::new(),
        }
    }
}

/// An incoming search request at the engine boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub filters: SearchFilters,
    /// Skip the cache read (the entry is still written back). Replaces the
    /// old trick of salting the query string, which polluted the cache.
    #[serde(default)]
    pub bypass_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_keys_equal_after_normalization() {
        let a = QueryKey::new(
            "  Floral   DRESS ",
            &[Platform::Zalora, Platform::Lazada],
            &SearchFilters::default(),
        );
        let b = QueryKey::new(
            "floral dress",
            &[Platform::Lazada, Platform::Zalora],
            &SearchFilters::default(),
        );
        assert_eq!(a, b);
        assert_eq!(a.filters_hash(), b.filters_hash());
    }

    #[test]
    fn filter_rounding_participates_in_equality() {
        let a = QueryKey::new(
            "dress",
            &[Platform::Lazada],
            &SearchFilters {
                min_price: Some(10.001),
                brand: Some("  Nike ".into()),
                ..SearchFilters::default()
            },
        );
        let b = QueryKey::new(
            "dress",
            &[Platform::Lazada],
            &SearchFilters {
                min_price: Some(10.0),
                brand: Some("nike".into()),
                ..SearchFilters::default()
            },
        );
        assert_eq!(a, b);
    }

    #[test]
    fn differing_platform_sets_are_different_keys() {
        let a = QueryKey::new("dress", &[Platform::Lazada], &SearchFilters::default());
        let b = QueryKey::new(
            "dress",
            &[Platform::Lazada, Platform::Shopee],
            &SearchFilters::default(),
        );
        assert_ne!(a, b);
    }

    #[test]
    fn platform_round_trips_through_str() {
        for p in Platform::ALL {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
        assert!("amazon".parse::<Platform>().is_err());
    }

    #[test]
    fn cache_entry_freshness_window() {
        let now = Utc::now();
        let entry = CacheEntry {
            key: QueryKey::new("x", &[Platform::Lazada], &SearchFilters::default()),
            results: vec![],
            created_at: now,
            expires_at: now + chrono::Duration::seconds(60),
        };
        assert!(entry.is_fresh(now));
        assert!(!entry.is_fresh(now + chrono::Duration::seconds(61)));
    }
}
