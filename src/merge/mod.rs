//! Result normalization, filtering, deduplication, and ordering.
//!
//! Drivers hand over raw page text; everything numeric is parsed here so
//! the rules live in one place: malformed prices drop the item (never
//! default to zero — that would corrupt the price sort), ratings clamp to
//! the 0–5 scale, and `extraction confidence` passes through untouched.

use crate::error::{CrawlError, CrawlResult};
use crate::records::{ProductRecord, RawExtraction, SearchFilters};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("number pattern"));

/// Parse a price out of site text like `"S$ 1,299.90"` or `"$29.90"`.
///
/// Strips currency symbols and thousands separators. Ranged prices
/// (`"$15.80 - $22.50"`) resolve to the lower bound. Text with no usable
/// number is a [`CrawlError::MalformedPrice`].
pub fn parse_price_text(text: &str) -> CrawlResult<f64> {
    // Ranges: the lower bound is the comparable price.
    let candidate = text.split(" - ").next().unwrap_or(text);

    let cleaned: String = candidate
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return Err(CrawlError::MalformedPrice(text.to_string()));
    }

    let price: f64 = cleaned
        .parse()
        .map_err(|_| CrawlError::MalformedPrice(text.to_string()))?;

    if !price.is_finite() || price < 0.0 {
        return Err(CrawlError::MalformedPrice(text.to_string()));
    }
    Ok(price)
}

/// First number in rating text (`"4.8"`, `"4.8 out of 5"`), clamped to 0–5.
#[must_use]
pub fn parse_rating_text(text: &str) -> Option<f32> {
    let raw: f32 = NUMBER_RE.find(text)?.as_str().parse().ok()?;
    Some(raw.clamp(0.0, 5.0))
}

/// Digits-only count text (`"(412)"`, `"412 ratings"`, `"1,204"`).
#[must_use]
pub fn parse_count_text(text: &str) -> Option<u32> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Map one raw extraction to a canonical record.
///
/// Errors only on malformed price — the caller drops the item and moves
/// on; all other fields degrade to `None`/empty.
pub fn normalize(raw: &RawExtraction) -> CrawlResult<ProductRecord> {
    let price = parse_price_text(&raw.price_text)?;
    let original_price = raw
        .original_price_text
        .as_deref()
        .and_then(|t| parse_price_text(t).ok())
        // A "was" price at or below the current price is display noise.
        .filter(|&op| op > price);

    Ok(ProductRecord {
        source_platform: raw.platform,
        source_id: raw.source_id.clone(),
        title: raw.title.clone(),
        price,
        original_price,
        image_url: raw.image_url.clone(),
        product_url: raw.product_url.clone(),
        rating: raw.rating_text.as_deref().and_then(parse_rating_text),
        rating_count: raw.rating_count_text.as_deref().and_then(parse_count_text),
        confidence: raw.confidence,
    })
}

/// Post-extraction filter predicates, applied whether or not a driver
/// pushed them down natively.
fn passes_filters(record: &ProductRecord, filters: &SearchFilters) -> bool {
    if let Some(min) = filters.min_price {
        if record.price < min {
            return false;
        }
    }
    if let Some(max) = filters.max_price {
        if record.price > max {
            return false;
        }
    }
    if let Some(brand) = &filters.brand {
        let needle = brand.trim().to_lowercase();
        if !needle.is_empty() && !record.title.to_lowercase().contains(&needle) {
            return false;
        }
    }
    if let Some(min_rating) = filters.min_rating {
        // A record with no rating cannot demonstrate it meets the bar.
        match record.rating {
            Some(rating) if rating >= min_rating => {}
            _ => return false,
        }
    }
    true
}

/// Normalize, filter, deduplicate, and order raw extractions from all
/// platforms into the final result list.
///
/// Deduplication is strictly within a platform, keyed by `source_id`,
/// keeping the first-seen occurrence — cross-platform identity cannot be
/// reliably inferred and two platforms' records are never merged into one.
/// Ordering is ascending by price; ties break by descending rating with
/// missing ratings last.
#[must_use]
pub fn merge_results(raw: &[RawExtraction], filters: &SearchFilters) -> Vec<ProductRecord> {
    let mut seen = std::collections::HashSet::new();
    let mut dropped_malformed = 0usize;

    let mut records: Vec<ProductRecord> = raw
        .iter()
        .filter_map(|extraction| match normalize(extraction) {
            Ok(record) => Some(record),
            Err(e) => {
                dropped_malformed += 1;
                debug!(
                    platform = %extraction.platform,
                    source_id = %extraction.source_id,
                    "dropping item: {e}"
                );
                None
            }
        })
        .filter(|record| seen.insert((record.source_platform, record.source_id.clone())))
        .filter(|record| passes_filters(record, filters))
        .collect();

    if dropped_malformed > 0 {
        debug!(count = dropped_malformed, "items dropped for malformed prices");
    }

    records.sort_by(|a, b| {
        a.price.total_cmp(&b.price).then_with(|| {
            let ra = a.rating.unwrap_or(f32::NEG_INFINITY);
            let rb = b.rating.unwrap_or(f32::NEG_INFINITY);
            rb.total_cmp(&ra)
        })
    });

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ExtractionConfidence, Platform};
    use proptest::prelude::*;

    fn raw(
        platform: Platform,
        id: &str,
        price_text: &str,
        rating_text: Option<&str>,
    ) -> RawExtraction {
        RawExtraction {
            platform,
            source_id: id.to_string(),
            title: format!("item {id}"),
            price_text: price_text.to_string(),
            original_price_text: None,
            product_url: format!("https://example.test/{id}"),
            image_url: String::new(),
            rating_text: rating_text.map(str::to_string),
            rating_count_text: None,
            confidence: ExtractionConfidence::Direct,
        }
    }

    #[test]
    fn price_parsing_strips_symbols_and_separators() {
        assert_eq!(parse_price_text("$29.90").unwrap(), 29.90);
        assert_eq!(parse_price_text("S$ 1,299.90").unwrap(), 1299.90);
        assert_eq!(parse_price_text("15.80 - 22.50").unwrap(), 15.80);
        assert_eq!(parse_price_text("129").unwrap(), 129.0);
    }

    #[test]
    fn malformed_price_is_rejected_not_zeroed() {
        for text in ["Contact for price", "", "N/A", "free!!"] {
            match parse_price_text(text) {
                Err(CrawlError::MalformedPrice(original)) => assert_eq!(original, text),
                other => panic!("expected MalformedPrice for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn sorted_ascending_with_rating_tiebreak() {
        // The spec's worked example: two 99s, the 4.8 sorts first.
        let extractions = vec![
            raw(Platform::Lazada, "a", "$150.00", Some("4.0")),
            raw(Platform::Lazada, "b", "$99.00", Some("4.5")),
            raw(Platform::Zalora, "c", "$99.00", Some("4.8")),
            raw(Platform::Shopee, "d.1", "$300.00", None),
        ];
        let merged = merge_results(&extractions, &SearchFilters::default());

        let prices: Vec<f64> = merged.iter().map(|r| r.price).collect();
        assert_eq!(prices, vec![99.0, 99.0, 150.0, 300.0]);
        assert_eq!(merged[0].source_id, "c", "4.8 rating wins the 99 tie");
        assert_eq!(merged[1].source_id, "b");
    }

    #[test]
    fn missing_rating_sorts_last_within_price_tie() {
        let extractions = vec![
            raw(Platform::Lazada, "unrated", "$50.00", None),
            raw(Platform::Lazada, "rated", "$50.00", Some("3.0")),
        ];
        let merged = merge_results(&extractions, &SearchFilters::default());
        assert_eq!(merged[0].source_id, "rated");
        assert_eq!(merged[1].source_id, "unrated");
    }

    #[test]
    fn dedup_within_platform_keeps_first_seen() {
        let extractions = vec![
            raw(Platform::Lazada, "X", "$10.00", Some("4.0")),
            raw(Platform::Lazada, "X", "$12.00", Some("5.0")),
            raw(Platform::Zalora, "X", "$11.00", None),
        ];
        let merged = merge_results(&extractions, &SearchFilters::default());

        let lazada: Vec<_> = merged
            .iter()
            .filter(|r| r.source_platform == Platform::Lazada)
            .collect();
        assert_eq!(lazada.len(), 1);
        assert_eq!(lazada[0].price, 10.0, "first-seen occurrence wins");

        // Same source_id on another platform is a different product.
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn malformed_items_are_excluded_from_merged_output() {
        let extractions = vec![
            raw(Platform::Lazada, "good", "$10.00", None),
            raw(Platform::Lazada, "bad", "Contact for price", None),
        ];
        let merged = merge_results(&extractions, &SearchFilters::default());
        assert_eq!(merged.len(), 1);
        assert!(merged.iter().all(|r| r.price > 0.0));
    }

    #[test]
    fn filters_apply_post_extraction() {
        let extractions = vec![
            raw(Platform::Lazada, "cheap", "$5.00", Some("4.9")),
            raw(Platform::Lazada, "mid", "$50.00", Some("4.5")),
            raw(Platform::Lazada, "unrated", "$60.00", None),
            raw(Platform::Lazada, "pricey", "$500.00", Some("5.0")),
        ];
        let filters = SearchFilters {
            min_price: Some(10.0),
            max_price: Some(100.0),
            min_rating: Some(4.0),
            ..SearchFilters::default()
        };
        let merged = merge_results(&extractions, &filters);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source_id, "mid");
    }

    #[test]
    fn brand_filter_matches_title_substring() {
        let mut a = raw(Platform::Zalora, "a", "$20.00", None);
        a.title = "Mango Floral Midi Dress".into();
        let mut b = raw(Platform::Zalora, "b", "$25.00", None);
        b.title = "Cotton On Basic Dress".into();

        let filters = SearchFilters {
            brand: Some("MANGO".into()),
            ..SearchFilters::default()
        };
        let merged = merge_results(&[a, b], &filters);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source_id, "a");
    }

    #[test]
    fn confidence_is_preserved() {
        let mut extraction = raw(Platform::Shopee, "1.2", "$9.90", None);
        extraction.confidence = ExtractionConfidence::Estimated;
        let merged = merge_results(&[extraction], &SearchFilters::default());
        assert_eq!(merged[0].confidence, ExtractionConfidence::Estimated);
    }

    #[test]
    fn inflated_original_price_is_kept_only_when_higher() {
        let mut extraction = raw(Platform::Lazada, "a", "$30.00", None);
        extraction.original_price_text = Some("$45.00".into());
        let merged = merge_results(&[extraction.clone()], &SearchFilters::default());
        assert_eq!(merged[0].original_price, Some(45.0));

        extraction.original_price_text = Some("$30.00".into());
        let merged = merge_results(&[extraction], &SearchFilters::default());
        assert_eq!(merged[0].original_price, None);
    }

    proptest! {
        #[test]
        fn price_parser_never_panics(text in ".{0,64}") {
            let _ = parse_price_text(&text);
        }

        #[test]
        fn parsed_prices_are_non_negative(price in 0.0f64..1_000_000.0) {
            let text = format!("S$ {price:.2}");
            let parsed = parse_price_text(&text).unwrap();
            prop_assert!(parsed >= 0.0);
            prop_assert!((parsed - (price * 100.0).round() / 100.0).abs() < 0.005);
        }
    }
}
