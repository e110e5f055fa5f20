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

const DEFAULT_BASE_URL: &str = "https://www.capterra.com";

const PRODUCT_LINK: &str = r#"a[href*="/p/"]"#;
const REVIEW_CONTAINERS: &[&str] = &[
    ".review-card",
    ".review-item",
    r#"[data-testid="review-card"]"#,
    ".user-review",
];
const TITLE: &str = r#"h3, .review-title, [data-testid="review-title"]"#;
const BODY: &str = r#".review-text, .review-content, [data-testid="review-content"]"#;
const PROS: &str = r#".review-pros, [data-testid="review-pros"]"#;
const CONS: &str = r#".review-cons, [data-testid="review-cons"]"#;
const RATING: &str = r#"[data-rating], .overall-rating, .rating-value"#;
const FULL_STAR: &str = ".star.filled, .star-full";
const HALF_STAR: &str = ".star.half, .star-half";
const REVIEWER: &str = r#".reviewer-name, .review-author, [data-testid="reviewer-name"]"#;
const DATE: &str = r#"time, .review-date, [data-testid="review-date"]"#;
const NEXT_LINK: &str = r#"a[rel="next"], a[aria-label*="Next"], .pagination .next a"#;
const PAGER_LINKS: &str = ".pagination a";
const PAGER_CURRENT: &str = ".pagination .active, .pagination .current";

/// Capterra ドライバー
pub struct CapterraSource {
    transport: Arc<dyn Transport>,
    base_url: String,
    search_delay: Duration,
}

impl CapterraSource {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            search_delay: DEFAULT_SEARCH_DELAY,
        }
    }

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
        let (url, id) = product_root(url, "p", 2).unwrap_or_else(|| {
            let root = url.trim_end_matches('/').trim_end_matches("/reviews");
            let id = root.rsplit('/').next().unwrap_or_default().to_string();
            (root.to_string(), id)
        });
        CompanyHandle {
            name: company_name.to_string(),
            url,
            id,
        }
    }

    fn match_product(&self, body: &str, term: &str) -> Option<CompanyHandle> {
        let doc = Html::parse_document(body);
        let links = selector(PRODUCT_LINK)?;
        doc.select(&links).find_map(|link| {
            let name = element_text(link);
            if !is_company_match(term, &name, COMPANY_STOP_WORDS) {
                return None;
            }
            let href = absolute_url(&self.base_url, link.value().attr("href")?)?;
            let (url, id) = product_root(&href, "p", 2)?;
            Some(CompanyHandle { name, url, id })
        })
    }

    fn has_next_page(body: &str) -> bool {
        let doc = Html::parse_document(body);
        let root = doc.root_element();
        has_enabled_link(root, NEXT_LINK)
            || pager_has_later_page(root, PAGER_LINKS, PAGER_CURRENT).unwrap_or(false)
    }

    /// 星アイコンの数（半星は0.5）
    fn star_count(card: ElementRef<'_>) -> Option<String> {
        let full = count_matches(card, FULL_STAR) as f64;
        let half = count_matches(card, HALF_STAR) as f64;
        let total = full + half * 0.5;
        (total > 0.0).then(|| total.to_string())
    }

    /// 本文が無いレビューは長所・短所をつなげて本文にする
    fn body_text(card: ElementRef<'_>) -> Option<String> {
        if let Some(body) = select_text(card, BODY) {
            return Some(body);
        }
        let parts: Vec<String> = [("Pros", PROS), ("Cons", CONS)]
            .iter()
            .filter_map(|(label, css)| select_text(card, css).map(|t| format!("{}: {}", label, t)))
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    fn extract_review(card: ElementRef<'_>) -> RawRecordFields {
        let rating = select_attr_or_text(card, RATING, &["data-rating", "aria-label"])
            .or_else(|| Self::star_count(card));

        let mut fields = RawRecordFields::new();
        fields.insert(RawRecordFields::TITLE, select_text(card, TITLE));
        fields.insert(RawRecordFields::BODY, Self::body_text(card));
        fields.insert(
            RawRecordFields::DATE,
            select_attr_or_text(card, DATE, &["datetime"]),
        );
        fields.insert(RawRecordFields::REVIEWER, select_text(card, REVIEWER));
        fields.insert(RawRecordFields::RATING, rating);
        fields.insert("pros", select_text(card, PROS));
        fields.insert("cons", select_text(card, CONS));
        fields
    }
}

#[async_trait]
impl ReviewSource for CapterraSource {
    fn id(&self) -> SourceId {
        SourceId::Capterra
    }

    fn rating_scale(&self) -> RatingScale {
        RatingScale::ONE_TO_FIVE_STARS
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
                info!("Found Capterra product '{}' at {}", handle.name, handle.url);
                return Ok(handle);
            }
            debug!("No Capterra product matched '{}'", term);
        }

        // 検索で見つからなければ企業名から組み立てた商品ページを試す
        let slug = company_slug(company_name);
        if !slug.is_empty() {
            self.pause_between_searches().await;
            let url = format!("{}/software/{}", self.base_url, slug);
            if product_page_exists(self.transport.as_ref(), &url).await? {
                info!("Found Capterra product page at {}", url);
                return Ok(CompanyHandle {
                    name: company_name.to_string(),
                    url,
                    id: slug,
                });
            }
            debug!("No Capterra product page at {}", url);
        }

        Err(ScraperError::CompanyNotFound {
            platform: SourceId::Capterra,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::traits::{NormalizeContext, Normalized};
    use chrono::{TimeDelta, TimeZone, Utc};

    const BASE: &str = "https://capterra.test";

    const LISTING: &str = r#"
        <html><body>
        <div class="review-card">
            <h3>Easy onboarding</h3>
            <div class="review-content">Our team was productive in a day.</div>
            <span class="reviewer-name">Priya S.</span>
            <span class="review-date">3 days ago</span>
            <span class="star filled"></span><span class="star filled"></span>
            <span class="star filled"></span><span class="star filled"></span>
            <span class="star half"></span>
        </div>
        <div class="review-card">
            <div class="review-pros">Cheap</div>
            <div class="review-cons">Slow support</div>
            <span class="review-date">January 20, 2024</span>
            <div class="overall-rating" data-rating="3">3</div>
        </div>
        <div class="review-card"><h3>Title only</h3></div>
        <ul class="pagination">
            <li class="active"><a href="?page=1">1</a></li>
            <li><a href="?page=2">2</a></li>
        </ul>
        </body></html>
    "#;

    fn source(mock: &Arc<MockTransport>) -> CapterraSource {
        CapterraSource::new(mock.clone())
            .with_base_url(BASE)
            .with_search_delay(Duration::ZERO)
    }

    fn raw_page(body: &str) -> RawPage {
        RawPage {
            number: 1,
            body: PageBody::Html(body.to_string()),
            has_more: true,
            next_cursor: None,
        }
    }

    #[tokio::test]
    async fn test_resolve_company_by_search() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(
            &format!("{BASE}/search?query=Slack"),
            r#"<a href="/p/135003/Slack/">Slack</a>"#,
        );

        let handle = source(&mock).resolve_company("Slack", None).await.unwrap();
        assert_eq!(handle.url, format!("{BASE}/p/135003/Slack"));
        assert_eq!(handle.id, "Slack");
    }

    #[tokio::test]
    async fn test_search_transport_error_propagates() {
        let mock = Arc::new(MockTransport::new());
        mock.fail(
            &format!("{BASE}/search?query=Slack"),
            TransportError::Timeout("slow".into()),
        );

        let result = source(&mock).resolve_company("Slack", None).await;
        assert!(matches!(
            result,
            Err(ScraperError::Transport(TransportError::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn test_product_page_lookup_after_search_misses() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(
            &format!("{BASE}/search?query=Notion"),
            r#"<a href="/p/1/Evernote/">Evernote</a>"#,
        );

        let missing = source(&mock).resolve_company("Notion", None).await;
        assert!(matches!(
            missing,
            Err(ScraperError::CompanyNotFound {
                platform: SourceId::Capterra,
                ..
            })
        ));
        assert_eq!(mock.request_count(&format!("{BASE}/software/notion")), 1);

        mock.ok(&format!("{BASE}/software/notion"), "<h1>Notion</h1>");
        let handle = source(&mock).resolve_company("Notion", None).await.unwrap();
        assert_eq!(handle.url, format!("{BASE}/software/notion"));
        assert_eq!(handle.id, "notion");
    }

    #[tokio::test]
    async fn test_direct_url_skips_search() {
        let mock = Arc::new(MockTransport::new());
        let handle = source(&mock)
            .resolve_company("Slack", Some("https://www.capterra.com/p/135003/Slack/reviews/"))
            .await
            .unwrap();

        assert_eq!(handle.url, "https://www.capterra.com/p/135003/Slack");
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_page_detects_pager() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(&format!("{BASE}/p/1/Slack/reviews?page=1"), LISTING);
        let handle = CompanyHandle {
            name: "Slack".into(),
            url: format!("{BASE}/p/1/Slack"),
            id: "Slack".into(),
        };

        let PageFetch::Page(page) = source(&mock).fetch_page(&handle, 1, None).await.unwrap() else {
            panic!("expected page");
        };
        assert!(page.has_more);
        assert_eq!(
            source(&mock).fetch_page(&handle, 2, None).await.unwrap(),
            PageFetch::EndOfPages
        );
    }

    #[test]
    fn test_extract_and_normalize() {
        let capterra = CapterraSource::new(Arc::new(MockTransport::new()));
        let records = capterra.extract_records(&raw_page(LISTING));
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].get(RawRecordFields::RATING), Some("4.5"));
        assert_eq!(records[1].get(RawRecordFields::BODY), Some("Pros: Cheap Cons: Slow support"));
        assert_eq!(records[1].get("pros"), Some("Cheap"));

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let ctx = NormalizeContext::new(now);
        let normalized: Vec<_> = records
            .into_iter()
            .map(|fields| capterra.normalize(fields, &ctx))
            .collect();

        let Normalized::Record(first) = &normalized[0] else {
            panic!("expected record");
        };
        assert_eq!(first.posted_at, Some(now - TimeDelta::days(3)));
        assert_eq!(first.reviewer_name.as_deref(), Some("Priya S."));
        assert_eq!(first.source, SourceId::Capterra);

        let Normalized::Record(second) = &normalized[1] else {
            panic!("expected record");
        };
        assert_eq!(second.rating, Some(2.5));
        assert_eq!(
            second.posted_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 20, 0, 0, 0).unwrap())
        );

        assert!(matches!(normalized[2], Normalized::Discard(_)));
    }

    #[test]
    fn test_five_stars_is_top_of_scale() {
        let capterra = CapterraSource::new(Arc::new(MockTransport::new()));
        let html = r#"<div class="review-card"><p class="review-text">Love it</p>
            <i class="star-full"></i><i class="star-full"></i><i class="star-full"></i>
            <i class="star-full"></i><i class="star-full"></i></div>"#;
        let records = capterra.extract_records(&raw_page(html));
        let ctx = NormalizeContext::new(Utc::now());

        let Normalized::Record(record) = capterra.normalize(records[0].clone(), &ctx) else {
            panic!("expected record");
        };
        assert_eq!(record.rating, Some(5.0));
    }
}
