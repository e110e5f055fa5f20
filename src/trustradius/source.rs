use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::{ScraperError, TransportError};
use crate::html::{absolute_url, product_root};
use crate::model::{RawRecordFields, SourceId};
use crate::rating::RatingScale;
use crate::text::{company_name_variations, is_company_match, non_empty, COMPANY_STOP_WORDS};
use crate::config::DEFAULT_SEARCH_DELAY;
use crate::traits::{CompanyHandle, PageBody, PageFetch, RawPage, ReviewSource};
use crate::transport::{fetch_listing, FetchRequest, Transport};

use super::types::{Pagination, ReviewItem, Scalar, SearchResponse};

const DEFAULT_BASE_URL: &str = "https://www.trustradius.com";
const PAGE_SIZE: &str = "25";

/// TrustRadius ドライバー
pub struct TrustRadiusSource {
    transport: Arc<dyn Transport>,
    base_url: String,
    search_delay: Duration,
}

impl TrustRadiusSource {
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

    /// 検索語を切り替える間の待ち時間
    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = delay;
        self
    }

    fn search_url(&self, term: &str) -> Result<String, TransportError> {
        let url = url::Url::parse_with_params(
            &format!("{}/api/v2/search", self.base_url),
            &[("q", term)],
        )?;
        Ok(url.to_string())
    }

    fn reviews_url(&self, handle: &CompanyHandle, cursor: Option<&str>) -> Result<String, TransportError> {
        let mut params = vec![("limit", PAGE_SIZE)];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        let url = url::Url::parse_with_params(
            &format!("{}/api/v2/products/{}/reviews", self.base_url, handle.id),
            &params,
        )?;
        Ok(url.to_string())
    }

    fn match_product(&self, search: SearchResponse, term: &str) -> Option<CompanyHandle> {
        search.products.into_iter().find_map(|product| {
            if !is_company_match(term, &product.name, COMPANY_STOP_WORDS) {
                return None;
            }
            let path = product
                .url
                .unwrap_or_else(|| format!("/products/{}", product.slug));
            Some(CompanyHandle {
                url: absolute_url(&self.base_url, &path)?,
                name: product.name,
                id: product.slug,
            })
        })
    }

    fn review_fields(item: ReviewItem) -> RawRecordFields {
        let body = item.text.as_deref().and_then(non_empty).or_else(|| {
            let parts: Vec<String> = [("Pros", &item.pros), ("Cons", &item.cons)]
                .into_iter()
                .filter_map(|(label, text)| {
                    text.as_deref()
                        .and_then(non_empty)
                        .map(|t| format!("{}: {}", label, t))
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        });
        let author = item.author.unwrap_or_default();

        let mut fields = RawRecordFields::new();
        fields.insert(RawRecordFields::TITLE, item.heading);
        fields.insert(RawRecordFields::BODY, body);
        fields.insert(RawRecordFields::DATE, item.published_at);
        fields.insert(RawRecordFields::REVIEWER, author.name);
        fields.insert(RawRecordFields::RATING, item.rating.map(Scalar::into_string));
        fields.insert("review_id", item.id.map(Scalar::into_string));
        fields.insert("reviewer_title", author.job_title);
        fields.insert("reviewer_company", author.company);
        fields.insert("pros", item.pros);
        fields.insert("cons", item.cons);
        fields
    }
}

#[async_trait]
impl ReviewSource for TrustRadiusSource {
    fn id(&self) -> SourceId {
        SourceId::TrustRadius
    }

    fn rating_scale(&self) -> RatingScale {
        RatingScale::ZERO_TO_TEN
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
            let (url, id) = product_root(url, "products", 1).ok_or_else(|| {
                ScraperError::Configuration(format!("TrustRadiusの商品URLではありません: {}", url))
            })?;
            return Ok(CompanyHandle {
                name: company_name.to_string(),
                url,
                id,
            });
        }

        for (i, term) in company_name_variations(company_name).into_iter().enumerate() {
            if i > 0 && !self.search_delay.is_zero() {
                sleep(self.search_delay).await;
            }
            let request = FetchRequest::get(self.search_url(&term)?)
                .with_header("Accept", "application/json");
            let response = match self.transport.fetch(&request).await?.error_for_status() {
                Ok(response) => response,
                Err(TransportError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            let search: SearchResponse = serde_json::from_str(&response.body)?;
            if let Some(handle) = self.match_product(search, &term) {
                info!("Found TrustRadius product '{}' ({})", handle.name, handle.id);
                return Ok(handle);
            }
            debug!("No TrustRadius product matched '{}'", term);
        }

        Err(ScraperError::CompanyNotFound {
            platform: SourceId::TrustRadius,
            company: company_name.to_string(),
        })
    }

    async fn fetch_page(
        &self,
        handle: &CompanyHandle,
        page: u32,
        cursor: Option<&str>,
    ) -> Result<PageFetch, ScraperError> {
        // 2ページ目以降はカーソルが無ければ終端
        if page > 1 && cursor.is_none() {
            return Ok(PageFetch::EndOfPages);
        }

        let request = FetchRequest::get(self.reviews_url(handle, cursor)?)
            .with_header("Accept", "application/json");
        let Some(response) = fetch_listing(self.transport.as_ref(), &request, page).await? else {
            return Ok(PageFetch::EndOfPages);
        };

        let document: Value = serde_json::from_str(&response.body)?;
        if !document.is_object() {
            return Err(ScraperError::ParseDegraded(format!(
                "TrustRadius page {} is not a JSON object",
                page
            )));
        }

        // 壊れたページ送り情報は終端扱いにして、レビュー自体は残す
        let pagination = match document.get("pagination") {
            None | Some(Value::Null) => Pagination::default(),
            Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
                debug!("Ignoring malformed TrustRadius pagination on page {}: {}", page, e);
                Pagination::default()
            }),
        };

        Ok(PageFetch::Page(RawPage {
            number: page,
            has_more: pagination.has_next(),
            next_cursor: pagination.next_cursor,
            body: PageBody::Json(document),
        }))
    }

    fn extract_records(&self, page: &RawPage) -> Vec<RawRecordFields> {
        let PageBody::Json(document) = &page.body else {
            return Vec::new();
        };
        let Some(items) = document.get("reviews").and_then(Value::as_array) else {
            return Vec::new();
        };

        items
            .iter()
            .map(|item| match serde_json::from_value::<ReviewItem>(item.clone()) {
                Ok(review) => Self::review_fields(review),
                Err(e) => {
                    debug!("Skipping malformed TrustRadius review: {}", e);
                    RawRecordFields::new()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::traits::{NormalizeContext, Normalized};
    use chrono::{TimeZone, Utc};

    const BASE: &str = "https://tr.test";

    const FIRST_PAGE: &str = r#"{
        "reviews": [
            {
                "id": 101,
                "heading": "Great for remote teams",
                "text": "We moved every meeting to it.",
                "rating": 9,
                "published_at": "2024-02-10T08:30:00Z",
                "author": {"name": "Reviewed by Alex P.", "job_title": "IT Manager"}
            },
            {
                "id": "102",
                "pros": "Fast setup",
                "cons": "Pricey add-ons",
                "rating": "6 out of 10",
                "published_at": "2024-01-05"
            },
            {"id": 103, "heading": "No text at all"},
            {"id": 104, "text": ["not", "a", "string"]}
        ],
        "pagination": {"next_cursor": "c2", "has_more": true}
    }"#;

    const LAST_PAGE: &str = r#"{
        "reviews": [{"id": 105, "text": "Solid.", "rating": 10, "published_at": "2024-01-01"}],
        "pagination": {"next_cursor": null, "has_more": false}
    }"#;

    fn source(mock: &Arc<MockTransport>) -> TrustRadiusSource {
        TrustRadiusSource::new(mock.clone())
            .with_base_url(BASE)
            .with_search_delay(Duration::ZERO)
    }

    fn handle() -> CompanyHandle {
        CompanyHandle {
            name: "Zoom".into(),
            url: format!("{BASE}/products/zoom"),
            id: "zoom".into(),
        }
    }

    #[tokio::test]
    async fn test_resolve_company_by_search() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(
            &format!("{BASE}/api/v2/search?q=Zoom"),
            r#"{"products": [
                {"name": "Webex", "slug": "webex"},
                {"name": "Zoom Workplace", "slug": "zoom-workplace", "url": "/products/zoom-workplace/reviews"}
            ]}"#,
        );

        let handle = source(&mock).resolve_company("Zoom", None).await.unwrap();
        assert_eq!(handle.id, "zoom-workplace");
        assert_eq!(handle.url, format!("{BASE}/products/zoom-workplace/reviews"));
    }

    #[tokio::test]
    async fn test_direct_url() {
        let mock = Arc::new(MockTransport::new());
        let tr = source(&mock);

        let handle = tr
            .resolve_company("Zoom", Some("https://www.trustradius.com/products/zoom/reviews"))
            .await
            .unwrap();
        assert_eq!(handle.id, "zoom");
        assert!(mock.requests().is_empty());

        let bad = tr
            .resolve_company("Zoom", Some("https://www.trustradius.com/about"))
            .await;
        assert!(matches!(bad, Err(ScraperError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_cursor_pagination() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(&format!("{BASE}/api/v2/products/zoom/reviews?limit=25"), FIRST_PAGE);
        mock.ok(
            &format!("{BASE}/api/v2/products/zoom/reviews?limit=25&cursor=c2"),
            LAST_PAGE,
        );
        let tr = source(&mock);

        let PageFetch::Page(first) = tr.fetch_page(&handle(), 1, None).await.unwrap() else {
            panic!("expected page");
        };
        assert!(first.has_more);
        assert_eq!(first.next_cursor.as_deref(), Some("c2"));

        let PageFetch::Page(last) = tr
            .fetch_page(&handle(), 2, first.next_cursor.as_deref())
            .await
            .unwrap()
        else {
            panic!("expected page");
        };
        assert!(!last.has_more);
        assert_eq!(last.next_cursor, None);

        assert_eq!(
            tr.fetch_page(&handle(), 3, None).await.unwrap(),
            PageFetch::EndOfPages
        );
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_or_broken_pagination_ends_listing() {
        let url = format!("{BASE}/api/v2/products/zoom/reviews?limit=25");
        let variants = [
            r#""pagination": null"#,
            r#""pagination": {"has_more": "yes"}"#,
            r#""pagination": "c2""#,
        ];
        for pagination in variants {
            let mock = Arc::new(MockTransport::new());
            mock.ok(
                &url,
                format!(
                    r#"{{"reviews": [{{"text": "Good tool", "published_at": "2024-02-01"}}], {pagination}}}"#
                ),
            );
            let tr = source(&mock);

            let PageFetch::Page(page) = tr.fetch_page(&handle(), 1, None).await.unwrap() else {
                panic!("expected page");
            };
            assert!(!page.has_more);
            assert_eq!(page.next_cursor, None);
            assert_eq!(tr.extract_records(&page).len(), 1);
        }
    }

    #[tokio::test]
    async fn test_search_waits_between_variations() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(&format!("{BASE}/api/v2/search?q=Zoom"), r#"{"products": []}"#);
        mock.ok(
            &format!("{BASE}/api/v2/search?q=zoom"),
            r#"{"products": [{"name": "Zoom", "slug": "zoom"}]}"#,
        );
        let tr = source(&mock).with_search_delay(Duration::from_millis(30));

        let started = std::time::Instant::now();
        let handle = tr.resolve_company("Zoom", None).await.unwrap();
        assert_eq!(handle.id, "zoom");
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_json_is_error() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(&format!("{BASE}/api/v2/products/zoom/reviews?limit=25"), "<html>blocked</html>");

        let result = source(&mock).fetch_page(&handle(), 1, None).await;
        assert!(matches!(result, Err(ScraperError::Json(_))));
    }

    #[test]
    fn test_extract_and_normalize() {
        let tr = TrustRadiusSource::new(Arc::new(MockTransport::new()));
        let page = RawPage {
            number: 1,
            body: PageBody::Json(serde_json::from_str(FIRST_PAGE).unwrap()),
            has_more: true,
            next_cursor: Some("c2".into()),
        };

        let records = tr.extract_records(&page);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].get("reviewer_title"), Some("IT Manager"));
        assert_eq!(
            records[1].get(RawRecordFields::BODY),
            Some("Pros: Fast setup Cons: Pricey add-ons")
        );
        assert!(records[3].is_empty());

        let ctx = NormalizeContext::new(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        let normalized: Vec<_> = records
            .into_iter()
            .map(|fields| tr.normalize(fields, &ctx))
            .collect();

        let Normalized::Record(first) = &normalized[0] else {
            panic!("expected record");
        };
        assert_eq!(first.rating, Some(4.5));
        assert_eq!(first.reviewer_name.as_deref(), Some("Alex P."));
        assert_eq!(
            first.posted_at,
            Some(Utc.with_ymd_and_hms(2024, 2, 10, 8, 30, 0).unwrap())
        );
        assert_eq!(first.extra.get("review_id").map(String::as_str), Some("101"));

        let Normalized::Record(second) = &normalized[1] else {
            panic!("expected record");
        };
        assert_eq!(second.rating, Some(3.0));

        assert!(matches!(normalized[2], Normalized::Discard(_)));
        assert!(matches!(normalized[3], Normalized::Discard(_)));
    }
}
