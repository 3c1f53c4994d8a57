//! Shopee driver.
//!
//! Shopee tags its search grid with `data-sqe` attributes. A product's
//! native identifier is the `shopid.itemid` pair embedded at the end of
//! every product URL; both halves are needed to rebuild the detail URL, so
//! the pair is kept joined as the `source_id`.

use super::{absolutize, select_attr, select_text, PlatformDriver};
use crate::error::{CrawlError, CrawlResult};
use crate::records::{ExtractionConfidence, Platform, RawExtraction, RawReview, SearchFilters};
use crate::session::CrawlSession;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

const BASE_URL: &str = "https://shopee.sg";

const SEARCH_CONTENT_HINT: &str = "data-sqe=\"item\"";
const DETAIL_CONTENT_HINT: &str = "page-product";

static CARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[data-sqe="item"]"#).expect("card selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("link selector"));
static NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[data-sqe="name"]"#).expect("name selector"));
static PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[data-sqe="price"]"#).expect("price selector"));
static IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("image selector"));
static CARD_RATING: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[data-sqe="rating"]"#).expect("rating selector"));

static DETAIL_NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.page-product h1").expect("detail name"));
static DETAIL_PRICE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.page-product .product-price").expect("detail price"));
static DETAIL_ORIGINAL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.page-product .product-price-before-discount").expect("detail original")
});
static DETAIL_RATING: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".product-rating-overview__rating-score").expect("detail rating"));
static DETAIL_RATING_COUNT: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".product-rating-overview__rating-total").expect("detail rating count")
});
static DETAIL_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.page-product picture img").expect("detail image"));

static REVIEW_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".shopee-product-rating").expect("review selector"));
static REVIEW_AUTHOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".shopee-product-rating__author-name").expect("review author")
});
static REVIEW_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".shopee-product-rating__content").expect("review body"));
static REVIEW_DATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".shopee-product-rating__time").expect("review date"));
static REVIEW_STAR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".shopee-product-rating__rating .icon-rating-solid").expect("review star")
});

/// `shopid.itemid` out of `...-i.276810203.8529174630` style hrefs.
static ITEM_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"i\.(\d+)\.(\d+)").expect("item id pattern"));

pub struct ShopeeDriver;

impl ShopeeDriver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn search_url(query: &str, filters: &SearchFilters, page: u32) -> String {
        let mut url = Url::parse(BASE_URL).expect("base url");
        url.set_path("/search");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("keyword", query);
            // Shopee pages are zero-based.
            pairs.append_pair("page", &(page - 1).to_string());
            if let Some(min) = filters.min_price {
                pairs.append_pair("minPrice", &format!("{}", min.round() as i64));
            }
            if let Some(max) = filters.max_price {
                pairs.append_pair("maxPrice", &format!("{}", max.round() as i64));
            }
            if let Some(rating) = filters.min_rating {
                pairs.append_pair("ratingFilter", &format!("{}", rating.floor() as u32));
            }
        }
        url.to_string()
    }

    fn split_source_id(source_id: &str) -> CrawlResult<(&str, &str)> {
        source_id.split_once('.').ok_or_else(|| {
            CrawlError::InvalidRequest(format!(
                "shopee source id must be shopid.itemid, got {source_id:?}"
            ))
        })
    }

    fn detail_url(source_id: &str) -> CrawlResult<String> {
        let (shop_id, item_id) = Self::split_source_id(source_id)?;
        Ok(format!("{BASE_URL}/product/{shop_id}/{item_id}"))
    }

    fn reviews_url(source_id: &str, page: u32) -> CrawlResult<String> {
        let (shop_id, item_id) = Self::split_source_id(source_id)?;
        Ok(format!(
            "{BASE_URL}/product/{shop_id}/{item_id}/ratings?page={page}"
        ))
    }

    fn parse_search_page(html: &str) -> Vec<RawExtraction> {
        let document = Html::parse_document(html);
        let mut items = Vec::new();

        for card in document.select(&CARD) {
            let Some(href) = select_attr(card, &LINK, "href") else {
                continue;
            };
            let Some(source_id) = ITEM_ID_RE
                .captures(&href)
                .map(|caps| format!("{}.{}", &caps[1], &caps[2]))
            else {
                continue;
            };
            let Some(title) = select_text(card, &NAME).filter(|t| !t.is_empty()) else {
                continue;
            };

            let price_text = select_text(card, &PRICE).unwrap_or_default();
            let confidence = if price_text.is_empty() {
                ExtractionConfidence::Fallback
            } else {
                ExtractionConfidence::Direct
            };

            items.push(RawExtraction {
                platform: Platform::Shopee,
                source_id,
                title,
                price_text,
                original_price_text: None,
                product_url: absolutize(BASE_URL, &href),
                image_url: select_attr(card, &IMAGE, "src").unwrap_or_default(),
                rating_text: select_text(card, &CARD_RATING),
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

        Some(RawExtraction {
            platform: Platform::Shopee,
            source_id: source_id.to_string(),
            title,
            price_text,
            original_price_text: select_text(root, &DETAIL_ORIGINAL),
            product_url: Self::detail_url(source_id).unwrap_or_default(),
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

impl Default for ShopeeDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformDriver for ShopeeDriver {
    fn platform(&self) -> Platform {
        Platform::Shopee
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
                debug!(page, "shopee returned no extractable items, ending pagination");
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
        let url = Self::detail_url(source_id)?;
        let html = session.navigate(&url, Some(DETAIL_CONTENT_HINT)).await?;
        Ok(Self::parse_detail_page(&html, source_id))
    }

    async fn product_reviews(
        &self,
        session: &mut CrawlSession,
        source_id: &str,
        page: u32,
    ) -> CrawlResult<Vec<RawReview>> {
        let url = Self::reviews_url(source_id, page)?;
        let html = session
            .navigate(&url, Some("shopee-product-rating"))
            .await?;
        Ok(Self::parse_reviews_page(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_FIXTURE: &str = r#"
    <html><body>
      <div data-sqe="item">
        <a href="/Floral-Maxi-Dress-i.276810203.8529174630">
          <img src="https://cf.shopee.sg/file/dress.jpg"/>
          <div data-sqe="name">Floral Maxi Dress</div>
          <div data-sqe="price">$15.80</div>
          <div data-sqe="rating">4.7</div>
        </a>
      </div>
      <div data-sqe="item">
        <a href="/no-id-here"><div data-sqe="name">Orphan</div></a>
      </div>
    </body></html>
    "#;

    #[test]
    fn extracts_cards_and_joined_source_id() {
        let items = ShopeeDriver::parse_search_page(SEARCH_FIXTURE);
        assert_eq!(items.len(), 1, "card without shopid.itemid must be skipped");
        let item = &items[0];
        assert_eq!(item.source_id, "276810203.8529174630");
        assert_eq!(item.title, "Floral Maxi Dress");
        assert_eq!(item.price_text, "$15.80");
        assert_eq!(item.rating_text.as_deref(), Some("4.7"));
        assert_eq!(
            item.product_url,
            "https://shopee.sg/Floral-Maxi-Dress-i.276810203.8529174630"
        );
    }

    #[test]
    fn detail_url_requires_joined_id() {
        assert_eq!(
            ShopeeDriver::detail_url("276810203.8529174630").unwrap(),
            "https://shopee.sg/product/276810203/8529174630"
        );
        assert!(ShopeeDriver::detail_url("8529174630").is_err());
    }

    #[test]
    fn search_pages_are_zero_based() {
        let url = ShopeeDriver::search_url("dress", &SearchFilters::default(), 1);
        assert!(url.contains("page=0"));
        assert!(url.contains("keyword=dress"));
    }

    #[test]
    fn parses_review_stars() {
        let html = r#"
        <html><body>
          <div class="shopee-product-rating">
            <div class="shopee-product-rating__author-name">minh_t</div>
            <div class="shopee-product-rating__rating">
              <i class="icon-rating-solid"></i><i class="icon-rating-solid"></i>
              <i class="icon-rating-solid"></i><i class="icon-rating-solid"></i>
              <i class="icon-rating-solid"></i>
            </div>
            <div class="shopee-product-rating__time">2025-06-14</div>
            <div class="shopee-product-rating__content">Great quality for the price.</div>
          </div>
        </body></html>
        "#;
        let reviews = ShopeeDriver::parse_reviews_page(html);
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].rating_text.as_deref(), Some("5"));
        assert_eq!(reviews[0].author, "minh_t");
    }
}
