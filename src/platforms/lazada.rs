//! Lazada driver.
//!
//! Lazada renders search results server-side into product cards tagged
//! with `data-qa-locator`; product ids ride in the card's `data-item-id`
//! attribute and in the `-i<id>.html` URL suffix. Price bounds and minimum
//! rating push down into the catalog URL; the merger re-checks them
//! anyway.

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

const BASE_URL: &str = "https://www.lazada.sg";

/// Substring expected on any real catalog/product page; used as the
/// challenge handler's resolution hint.
const SEARCH_CONTENT_HINT: &str = "data-qa-locator";
const DETAIL_CONTENT_HINT: &str = "pdp-mod";

static CARD: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"div[data-qa-locator="product-item"]"#).expect("card selector")
});
static TITLE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".RfADt a").expect("title selector"));
static PRICE: Lazy<Selector> = Lazy::new(|| Selector::parse(".ooOxS").expect("price selector"));
static ORIGINAL_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("del").expect("original price selector"));
static IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"img[type="product"]"#).expect("image selector"));
static RATING_COUNT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".qzqFw").expect("rating count selector"));

static DETAIL_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".pdp-mod-product-badge-title").expect("detail title selector"));
static DETAIL_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".pdp-price_type_normal").expect("detail price selector"));
static DETAIL_ORIGINAL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".pdp-price_type_deleted").expect("detail original selector"));
static DETAIL_RATING: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".score-average").expect("detail rating selector"));
static DETAIL_RATING_COUNT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".pdp-review-summary__link").expect("detail count selector"));
static DETAIL_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".gallery-preview-panel img").expect("detail image selector"));

static REVIEW_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".mod-reviews .item").expect("review selector"));
static REVIEW_AUTHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".middle span").expect("review author selector"));
static REVIEW_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".item-content .content").expect("review body selector"));
static REVIEW_DATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".title.right").expect("review date selector"));
static REVIEW_STAR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".container-star img.star").expect("review star selector"));

/// Product id out of `...-i2468013579.html` style hrefs.
static ITEM_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-i(\d+)(?:-s\d+)?\.html").expect("item id pattern"));

pub struct LazadaDriver;

impl LazadaDriver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn search_url(query: &str, filters: &SearchFilters, page: u32) -> String {
        let mut url = Url::parse(BASE_URL).expect("base url");
        url.set_path("/catalog/");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", query);
            pairs.append_pair("page", &page.to_string());
            if filters.min_price.is_some() || filters.max_price.is_some() {
                let min = filters.min_price.map_or(String::new(), |p| p.to_string());
                let max = filters.max_price.map_or(String::new(), |p| p.to_string());
                pairs.append_pair("price", &format!("{min}-{max}"));
            }
            if let Some(rating) = filters.min_rating {
                pairs.append_pair("rating", &format!("{}", rating.floor() as u32));
            }
        }
        url.to_string()
    }

    fn detail_url(source_id: &str) -> String {
        format!("{BASE_URL}/products/-i{source_id}.html")
    }

    fn reviews_url(source_id: &str, page: u32) -> String {
        format!("{BASE_URL}/products/-i{source_id}.html?reviewPage={page}")
    }

    fn parse_search_page(html: &str) -> Vec<RawExtraction> {
        let document = Html::parse_document(html);
        let mut items = Vec::new();

        for card in document.select(&CARD) {
            let Some(href) = select_attr(card, &TITLE_LINK, "href") else {
                continue;
            };
            let Some(title) = select_text(card, &TITLE_LINK)
                .filter(|t| !t.is_empty())
                .or_else(|| select_attr(card, &TITLE_LINK, "title"))
            else {
                continue;
            };

            // The card attribute is authoritative; the href suffix is the
            // fallback when the attribute is missing.
            let source_id = card
                .value()
                .attr("data-item-id")
                .map(str::to_string)
                .or_else(|| {
                    ITEM_ID_RE
                        .captures(&href)
                        .map(|caps| caps[1].to_string())
                });
            let Some(source_id) = source_id else { continue };

            let price_text = select_text(card, &PRICE).unwrap_or_default();
            let confidence = if price_text.is_empty() {
                ExtractionConfidence::Fallback
            } else {
                ExtractionConfidence::Direct
            };

            items.push(RawExtraction {
                platform: Platform::Lazada,
                source_id,
                title,
                price_text,
                original_price_text: select_text(card, &ORIGINAL_PRICE),
                product_url: absolutize(BASE_URL, &href),
                image_url: select_attr(card, &IMAGE, "src").unwrap_or_default(),
                rating_text: None,
                rating_count_text: select_text(card, &RATING_COUNT),
                confidence,
            });
        }

        items
    }

    fn parse_detail_page(html: &str, source_id: &str) -> Option<RawExtraction> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let title = select_text(root, &DETAIL_TITLE)?;
        let price_text = select_text(root, &DETAIL_PRICE).unwrap_or_default();

        Some(RawExtraction {
            platform: Platform::Lazada,
            source_id: source_id.to_string(),
            title,
            price_text,
            original_price_text: select_text(root, &DETAIL_ORIGINAL),
            product_url: Self::detail_url(source_id),
            image_url: select_attr(root, &DETAIL_IMAGE, "src").unwrap_or_default(),
            rating_text: select_text(root, &DETAIL_RATING),
            rating_count_text: select_text(root, &DETAIL_RATING_COUNT),
            confidence: ExtractionConfidence::Direct,
        })
    }

    fn parse_reviews_page(html: &str) -> Vec<RawReview> {
        let document = Html::parse_document(html);
        document
            .select(&REVIEW_ITEM)
            .map(|item| {
                let stars = item.select(&REVIEW_STAR).count();
                RawReview {
                    author: select_text(item, &REVIEW_AUTHOR).unwrap_or_default(),
                    rating_text: (stars > 0).then(|| stars.to_string()),
                    body: select_text(item, &REVIEW_BODY).unwrap_or_default(),
                    date_text: select_text(item, &REVIEW_DATE),
                }
            })
            .collect()
    }
}

impl Default for LazadaDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformDriver for LazadaDriver {
    fn platform(&self) -> Platform {
        Platform::Lazada
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
                debug!(page, "lazada returned no extractable items, ending pagination");
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
            .navigate(&Self::reviews_url(source_id, page), Some(DETAIL_CONTENT_HINT))
            .await?;
        Ok(Self::parse_reviews_page(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_FIXTURE: &str = r#"
    <html><body>
      <div data-qa-locator="general-products">
        <div data-qa-locator="product-item" data-item-id="2468013579">
          <div class="RfADt"><a href="//www.lazada.sg/products/floral-dress-i2468013579.html" title="Floral Summer Dress">Floral Summer Dress</a></div>
          <span class="ooOxS">$29.90</span>
          <del>$45.00</del>
          <img type="product" src="https://img.lazcdn.com/g/p/dress.jpg"/>
          <span class="qzqFw">(412)</span>
        </div>
        <div data-qa-locator="product-item">
          <div class="RfADt"><a href="/products/plain-tee-i1111111111.html">Plain Tee</a></div>
          <span class="ooOxS">$9.90</span>
        </div>
        <div data-qa-locator="product-item" data-item-id="99">
          <span class="ooOxS">$5.00</span>
        </div>
      </div>
    </body></html>
    "#;

    #[test]
    fn extracts_product_cards() {
        let items = LazadaDriver::parse_search_page(SEARCH_FIXTURE);
        assert_eq!(items.len(), 2, "card without title link must be skipped");

        let first = &items[0];
        assert_eq!(first.source_id, "2468013579");
        assert_eq!(first.title, "Floral Summer Dress");
        assert_eq!(first.price_text, "$29.90");
        assert_eq!(first.original_price_text.as_deref(), Some("$45.00"));
        assert!(first.product_url.starts_with("https://www.lazada.sg/"));
        assert_eq!(first.confidence, ExtractionConfidence::Direct);
        assert_eq!(first.rating_count_text.as_deref(), Some("(412)"));

        // Second card: id recovered from the href suffix.
        assert_eq!(items[1].source_id, "1111111111");
        assert_eq!(
            items[1].product_url,
            "https://www.lazada.sg/products/plain-tee-i1111111111.html"
        );
    }

    #[test]
    fn empty_page_yields_no_items() {
        assert!(LazadaDriver::parse_search_page("<html><body></body></html>").is_empty());
    }

    #[test]
    fn search_url_pushes_filters_down() {
        let filters = SearchFilters {
            min_price: Some(10.0),
            max_price: Some(50.0),
            min_rating: Some(4.0),
            ..SearchFilters::default()
        };
        let url = LazadaDriver::search_url("floral dress", &filters, 2);
        assert!(url.contains("q=floral+dress"));
        assert!(url.contains("page=2"));
        assert!(url.contains("price=10-50"));
        assert!(url.contains("rating=4"));
    }

    #[test]
    fn parses_detail_page() {
        let html = r#"
        <html><body>
          <h1 class="pdp-mod-product-badge-title">Floral Summer Dress</h1>
          <span class="pdp-price_type_normal">$29.90</span>
          <span class="pdp-price_type_deleted">$45.00</span>
          <div class="score-average">4.8</div>
          <a class="pdp-review-summary__link">412 ratings</a>
          <div class="gallery-preview-panel"><img src="https://img.lazcdn.com/g/p/dress.jpg"/></div>
        </body></html>
        "#;
        let item = LazadaDriver::parse_detail_page(html, "2468013579").unwrap();
        assert_eq!(item.rating_text.as_deref(), Some("4.8"));
        assert_eq!(item.price_text, "$29.90");
    }

    #[test]
    fn parses_review_items() {
        let html = r#"
        <html><body><div class="mod-reviews">
          <div class="item">
            <div class="top"><div class="container-star">
              <img class="star" src="s.png"/><img class="star" src="s.png"/>
              <img class="star" src="s.png"/><img class="star" src="s.png"/>
            </div></div>
            <div class="middle"><span>Jane T.</span></div>
            <div class="title right">2 weeks ago</div>
            <div class="item-content"><div class="content">Lovely fabric, fits well.</div></div>
          </div>
        </div></body></html>
        "#;
        let reviews = LazadaDriver::parse_reviews_page(html);
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].author, "Jane T.");
        assert_eq!(reviews[0].rating_text.as_deref(), Some("4"));
        assert!(reviews[0].body.contains("Lovely fabric"));
    }
}
