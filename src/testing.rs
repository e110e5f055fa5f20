//! テスト用のTransportとフィクスチャ

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EngineSettings;
use crate::error::TransportError;
use crate::retry::RetryPolicy;
use crate::transport::{FetchRequest, FetchResponse, Transport};

type Scripted = Result<FetchResponse, TransportError>;

/// URLごとに応答を台本化したTransport
///
/// キューの最後の応答は消費されずに繰り返される。未登録のURLは404。
#[derive(Default)]
pub(crate) struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<String>) -> &Self {
        self.push(
            url,
            Ok(FetchResponse {
                url: url.to_string(),
                status,
                body: body.into(),
            }),
        )
    }

    pub fn ok(&self, url: &str, body: impl Into<String>) -> &Self {
        self.respond(url, 200, body)
    }

    pub fn fail(&self, url: &str, error: TransportError) -> &Self {
        self.push(url, Err(error))
    }

    fn push(&self, url: &str, scripted: Scripted) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(scripted);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        self.requests.lock().unwrap().push(request.url.clone());

        let mut routes = self.routes.lock().unwrap();
        let Some(queue) = routes.get_mut(&request.url) else {
            return Ok(FetchResponse {
                url: request.url.clone(),
                status: 404,
                body: String::new(),
            });
        };

        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

/// 待機なしの設定
pub(crate) fn instant_settings() -> EngineSettings {
    EngineSettings::default()
        .with_page_delay(Duration::ZERO)
        .with_search_delay(Duration::ZERO)
        .with_retry(RetryPolicy::new(3, Duration::ZERO, Duration::ZERO))
}

/// G2形式のレビュー一覧HTML
///
/// `reviews` は (日付, 本文)。日付が空ならtime要素を出さない。
pub(crate) fn g2_listing(reviews: &[(&str, &str)], has_next: bool) -> String {
    let mut html = String::from("<html><body><div class=\"reviews\">");
    for (i, (date, body)) in reviews.iter().enumerate() {
        html.push_str(&format!(
            "<div class=\"review-card\" data-review-id=\"r{i}\">\
               <h3 class=\"review-title\">Review {i}</h3>\
               <span class=\"rating\" data-rating=\"4.5\">4.5</span>\
               <span class=\"reviewer-name\">Reviewer {i}</span>"
        ));
        if !date.is_empty() {
            html.push_str(&format!("<time datetime=\"{date}\">{date}</time>"));
        }
        html.push_str(&format!("<div class=\"review-text\">{body}</div></div>"));
    }
    html.push_str("</div>");
    if has_next {
        html.push_str("<nav class=\"pagination\"><a rel=\"next\" aria-label=\"Next page\" href=\"?page=next\">Next</a></nav>");
    }
    html.push_str("</body></html>");
    html
}

/// G2形式の検索結果HTML
pub(crate) fn g2_search(products: &[(&str, &str)]) -> String {
    let links: String = products
        .iter()
        .map(|(href, name)| format!("<div class=\"product\"><a href=\"{href}\">{name}</a></div>"))
        .collect();
    format!("<html><body>{links}</body></html>")
}
