use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::DEFAULT_SEARCH_DELAY;
use crate::error::{ScraperError, TransportError};
use crate::html::{
    absolute_url, count_matches, element_text, first_matching, has_enabled_link,
    pager_has_later_page, product_root, select_attr_or_text, select_text, selector,
};
use crate::model::{RawRecordFields, SourceId};
use crate::rating::RatingScale;
use crate::text::{company_name_variations, company_slug, is_company_match, COMPANY_STOP_WORDS};
use crate::traits::{CompanyHandle, PageBody, PageFetch, RawPage, ReviewSource};
use crate::transport::{fetch_listing, product_page_exists, FetchRequest, Transport};

const DEFAULT_BASE_URL: &str = "https://www.g2.com";

const PRODUCT_LINK: &str = r#"a[href*="/products/"]"#;
const REVIEW_CONTAINERS: &[&str] = &[
    "[data-review-id]",
    r#"div[itemprop="review"]"#,
    ".review-item",
    ".review-card",
];
const TITLE: &str = r#"h3, .review-title, [itemprop="name"]"#;
const BODY: &str = r#".review-text, [itemprop="reviewBody"]"#;
const RATING: &str = r#"[data-rating], [itemprop="ratingValue"], .rating"#;
const FILLED_STAR: &str = ".star.filled";
const REVIEWER: &str = r#".reviewer-name, [itemprop="author"]"#;
const DATE: &str = r#"time, [itemprop="datePublished"]"#;
const NEXT_LINK: &str = r#"a[rel="next"], a[aria-label*="next"], a[aria-label*="Next"]"#;
const PAGER_LINKS: &str = ".pagination a";
const PAGER_CURRENT: &str = r#".pagination .current, .pagination [aria-current="page"]"#;

/// G2 ドライバー
pub struct G2Source {
    transport: Arc<dyn Transport>,
    base_url: String,
    search_delay: Duration,
}

impl G2Source {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            search_delay: DEFAULT_SEARCH_DELAY,
        }
    }

    /// 接続先を差し替える（テスト・ミラー用）
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = delay;
        self
    }

    async fn pause_between_searches(&self) {
        if !self.search_delay.is_zero() {
            sleep(self.search_delay).await;
        }
    }

    fn search_url(&self, term: &str) -> Result<String, TransportError> {
        let url = url::Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[("query", term)],
        )?;
        Ok(url.to_string())
    }

    fn reviews_url(handle: &CompanyHandle, page: u32) -> String {
        format!("{}/reviews?page={}", handle.url.trim_end_matches('/'), page)
    }

    fn handle_from_url(url: &str, company_name: &str) -> CompanyHandle {
        match product_root(url, "products", 1) {
            Some((root, slug)) => CompanyHandle {
                name: company_name.to_string(),
                url: root,
                id: slug,
            },
            None => {
                let root = url.trim_end_matches('/').trim_end_matches("/reviews");
                CompanyHandle {
                    name: company_name.to_string(),
                    url: root.to_string(),
                    id: root.rsplit('/').next().unwrap_or_default().to_string(),
                }
            }
        }
    }

    /// 検索結果から名前が一致する最初の商品
    fn match_product(&self, body: &str, term: &str) -> Option<CompanyHandle> {
        let doc = Html::parse_document(body);
        let links = selector(PRODUCT_LINK)?;
        doc.select(&links).find_map(|link| {
            let name = element_text(link);
            if !is_company_match(term, &name, COMPANY_STOP_WORDS) {
                return None;
            }
            let href = absolute_url(&self.base_url, link.value().attr("href")?)?;
            let (url, id) = product_root(&href, "products", 1)?;
            Some(CompanyHandle { name, url, id })
        })
    }

    fn has_next_page(body: &str) -> bool {
        let doc = Html::parse_document(body);
        let root = doc.root_element();
        has_enabled_link(root, NEXT_LINK)
            || pager_has_later_page(root, PAGER_LINKS, PAGER_CURRENT).unwrap_or(false)
    }

    fn extract_review(card: ElementRef<'_>) -> RawRecordFields {
        let rating = select_attr_or_text(card, RATING, &["data-rating", "content"]).or_else(|| {
            let stars = count_matches(card, FILLED_STAR);
            (stars > 0).then(|| stars.to_string())
        });

        let mut fields = RawRecordFields::new();
        fields.insert(RawRecordFields::TITLE, select_text(card, TITLE));
        fields.insert(RawRecordFields::BODY, select_text(card, BODY));
        fields.insert(
            RawRecordFields::DATE,
            select_attr_or_text(card, DATE, &["datetime", "content"]),
        );
        fields.insert(RawRecordFields::REVIEWER, select_text(card, REVIEWER));
        fields.insert(RawRecordFields::RATING, rating);
        fields.insert(
            "review_id",
            card.value().attr("data-review-id").map(str::to_string),
        );
        fields
    }
}

#[async_trait]
impl ReviewSource for G2Source {
    fn id(&self) -> SourceId {
        SourceId::G2
    }

    fn rating_scale(&self) -> RatingScale {
        RatingScale::ZERO_TO_FIVE
    }

    fn newest_first(&self) -> bool {
        true
    }

    async fn resolve_company(
        &self,
        company_name: &str,
        direct_url: Option<&str>,
    ) -> Result<CompanyHandle, ScraperError> {
        if let Some(url) = direct_url {
            return Ok(Self::handle_from_url(url, company_name));
        }

        for (i, term) in company_name_variations(company_name).into_iter().enumerate() {
            if i > 0 {
                self.pause_between_searches().await;
            }
            let request = FetchRequest::get(self.search_url(&term)?);
            let response = match self.transport.fetch(&request).await?.error_for_status() {
                Ok(response) => response,
                Err(TransportError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            if let Some(handle) = self.match_product(&response.body, &term) {
                info!("Found G2 product '{}' at {}", handle.name, handle.url);
                return Ok(handle);
            }
            debug!("No G2 product matched '{}'", term);
        }

        // 検索で見つからなければ企業名から組み立てた商品ページを試す
        let slug = company_slug(company_name);
        if !slug.is_empty() {
            self.pause_between_searches().await;
            let url = format!("{}/products/{}", self.base_url, slug);
            if product_page_exists(self.transport.as_ref(), &url).await? {
                info!("Found G2 product page at {}", url);
                return Ok(CompanyHandle {
                    name: company_name.to_string(),
                    url,
                    id: slug,
                });
            }
            debug!("No G2 product page at {}", url);
        }

        Err(ScraperError::CompanyNotFound {
            platform: SourceId::G2,
            company: company_name.to_string(),
        })
    }

    async fn fetch_page(
        &self,
        handle: &CompanyHandle,
        page: u32,
        _cursor: Option<&str>,
    ) -> Result<PageFetch, ScraperError> {
        let request = FetchRequest::get(Self::reviews_url(handle, page));
        let Some(response) = fetch_listing(self.transport.as_ref(), &request, page).await? else {
            return Ok(PageFetch::EndOfPages);
        };

        let has_more = Self::has_next_page(&response.body);
        Ok(PageFetch::Page(RawPage {
            number: page,
            body: PageBody::Html(response.body),
            has_more,
            next_cursor: None,
        }))
    }

    fn extract_records(&self, page: &RawPage) -> Vec<RawRecordFields> {
        let PageBody::Html(body) = &page.body else {
            return Vec::new();
        };
        let doc = Html::parse_document(body);
        first_matching(doc.root_element(), REVIEW_CONTAINERS)
            .into_iter()
            .map(Self::extract_review)
            .collect()
    }
}
