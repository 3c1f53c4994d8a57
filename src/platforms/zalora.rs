//! Zalora driver.
//!
//! Zalora's catalog is a React app with stable `data-testid` hooks, which
//! makes extraction less brittle than class-name scraping. Ratings are not
//! shown on search cards; when the detail page only exposes the star bar,
//! the rating is derived from its width style and marked `Estimated`.

use super::{absolutize, select_attr, select_text, PlatformDriver};
use crate::error::CrawlResult;
use crate::records::{ExtractionConfidence, Platform, RawExtraction, RawReview, SearchFilters};
use crate::session::CrawlSession;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

const BASE_URL: &str = "https://www.zalora.sg";

const SEARCH_CONTENT_HINT: &str = "data-testid=\"productCard\"";
const DETAIL_CONTENT_HINT: &str = "data-testid=\"pdp";

static CARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[data-testid="productCard"]"#).expect("card selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("link selector"));
static BRAND: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-testid="productBrandName"]"#).expect("brand selector")
});
static NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-testid="productTitle"]"#).expect("name selector"));
static PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-testid="productPrice"]"#).expect("price selector"));
static ORIGINAL_PRICE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-testid="originalPrice"]"#).expect("original price selector")
});
static IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("image selector"));

static DETAIL_NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"h1[data-testid="pdpProductTitle"]"#).expect("detail name"));
static DETAIL_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-testid="pdpPrice"]"#).expect("detail price"));
static DETAIL_ORIGINAL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-testid="pdpOriginalPrice"]"#).expect("detail original")
});
static DETAIL_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"img[data-testid="pdpImage"]"#).expect("detail image"));
static DETAIL_RATING_BAR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"[data-testid="ratingStarsFilled"]"#).expect("detail rating bar")
});
static DETAIL_RATING_COUNT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-testid="ratingCount"]"#).expect("detail rating count"));

static REVIEW_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-testid="reviewItem"]"#).expect("review selector"));
static REVIEW_AUTHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-testid="reviewAuthor"]"#).expect("review author"));
static REVIEW_RATING: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-testid="reviewRating"]"#).expect("review rating"));
static REVIEW_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-testid="reviewText"]"#).expect("review body"));
static REVIEW_DATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[data-testid="reviewDate"]"#).expect("review date"));

/// Star-bar width percentage, e.g. `width: 96%` → 4.8 stars.
static WIDTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"width:\s*([\d.]+)%").expect("width pattern"));

/// SKU slug at the end of a product URL, e.g. `.../floral-dress-ZA012AA3.html`.
static SKU_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z0-9]{6,})\.html").expect("sku pattern"));

pub struct ZaloraDriver;

impl ZaloraDriver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn search_url(query: &str, filters: &SearchFilters, page: u32) -> String {
        let mut url = Url::parse(BASE_URL).expect("base url");
        url.set_path("/search");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            pairs.append_pair("page", &page.to_string());
            if let Some(min) = filters.min_price {
                pairs.append_pair("price_min", &format!("{}", min.round() as i64));
            }
            if let Some(max) = filters.max_price {
                pairs.append_pair("price_max", &format!("{}", max.round() as i64));
            }
            if let Some(brand) = &filters.brand {
                pairs.append_pair("brand", brand);
            }
        }
        url.to_string()
    }

    fn detail_url(source_id: &str) -> String {
        format!("{BASE_URL}/p/{source_id}.html")
    }

    fn reviews_url(source_id: &str, page: u32) -> String {
        format!("{BASE_URL}/p/{source_id}/reviews?page={page}")
    }

    fn parse_search_page(html: &str) -> Vec<RawExtraction> {
        let document = Html::parse_document(html);
        let mut items = Vec::new();

        for card in document.select(&CARD) {
            let Some(href) = select_attr(card, &LINK, "href") else {
                continue;
            };
            let Some(source_id) = SKU_RE.captures(&href).map(|caps| caps[1].to_string()) else {
                continue;
            };

            // Brand + product name together form the display title.
            let brand = select_text(card, &BRAND).unwrap_or_default();
            let name = select_text(card, &NAME).unwrap_or_default();
            let title = match (brand.is_empty(), name.is_empty()) {
                (false, false) => format!("{brand} {name}"),
                (false, true) => brand,
                (true, false) => name,
                (true, true) => continue,
            };

            let price_text = select_text(card, &PRICE).unwrap_or_default();
            let confidence = if price_text.is_empty() {
                ExtractionConfidence::Fallback
            } else {
                ExtractionConfidence::Direct
            };

            items.push(RawExtraction {
                platform: Platform::Zalora,
                source_id,
                title,
                price_text,
                original_price_text: select_text(card, &ORIGINAL_PRICE),
                product_url: absolutize(BASE_URL, &href),
                image_url: select_attr(card, &IMAGE, "src").unwrap_or_default(),
                rating_text: None,
                rating_count_text: None,
                confidence,
            });
        }

        items
    }

    fn parse_detail_page(html: &str, source_id: &str) -> Option<RawExtraction> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let title = select_text(root, &DETAIL_NAME)?;
        let price_text = select_text(root, &DETAIL_PRICE).unwrap_or_default();

        // No numeric rating on the page — derive it from the star-bar fill
        // width and mark the record estimated.
        let (rating_text, confidence) =
            match select_attr(root, &DETAIL_RATING_BAR, "style").and_then(|style| {
                WIDTH_RE
                    .captures(&style)
                    .and_then(|caps| caps[1].parse::<f64>().ok())
            }) {
                Some(percent) => (
                    Some(format!("{:.1}", percent / 100.0 * 5.0)),
                    ExtractionConfidence::Estimated,
                ),
                None => (None, ExtractionConfidence::Direct),
            };

        Some(RawExtraction {
            platform: Platform::Zalora,
            source_id: source_id.to_string(),
            title,
            price_text,
            original_price_text: select_text(root, &DETAIL_ORIGINAL),
            product_url: Self::detail_url(source_id),
            image_url: select_attr(root, &DETAIL_IMAGE, "src").unwrap_or_default(),
            rating_text,
            rating_count_text: select_text(root, &DETAIL_RATING_COUNT),
            confidence,
        })
    }

    fn parse_reviews_page(html: &str) -> Vec<RawReview> {
        let document = Html::parse_document(html);
        document
            .select(&REVIEW_ITEM)
            .map(|item| RawReview {
                author: select_text(item, &REVIEW_AUTHOR).unwrap_or_default(),
                rating_text: select_text(item, &REVIEW_RATING),
                body: select_text(item, &REVIEW_BODY).unwrap_or_default(),
                date_text: select_text(item, &REVIEW_DATE),
            })
            .collect()
    }
}

impl Default for ZaloraDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformDriver for ZaloraDriver {
    fn platform(&self) -> Platform {
        Platform::Zalora
    }

    async fn search_products(
        &self,
        session: &mut CrawlSession,
        query: &str,
        filters: &SearchFilters,
        max_pages: u32,
    ) -> CrawlResult<Vec<RawExtraction>> {
        let mut results = Vec::new();
        for page in 1..=max_pages {
            let url = Self::search_url(query, filters, page);
            let html = session.navigate(&url, Some(SEARCH_CONTENT_HINT)).await?;
            let items = Self::parse_search_page(&html);
            if items.is_empty() {
                debug!(page, "zalora returned no extractable items, ending pagination");
                break;
            }
            results.extend(items);
        }
        Ok(results)
    }

    async fn product_details(
        &self,
        session: &mut CrawlSession,
        source_id: &str,
    ) -> CrawlResult<Option<RawExtraction>> {
        let html = session
            .navigate(&Self::detail_url(source_id), Some(DETAIL_CONTENT_HINT))
            .await?;
        Ok(Self::parse_detail_page(&html, source_id))
    }

    async fn product_reviews(
        &self,
        session: &mut CrawlSession,
        source_id: &str,
        page: u32,
    ) -> CrawlResult<Vec<RawReview>> {
        let html = session
            .navigate(&Self::reviews_url(source_id, page), Some("reviewItem"))
            .await?;
        Ok(Self::parse_reviews_page(&html))
    }
}
