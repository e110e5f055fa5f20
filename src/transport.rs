//! HTTP取得の抽象化
//!
//! ドライバーは `Transport` だけに依存し、接続管理やTLSは実装側に任せる。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tracing::debug;

use crate::config::EngineSettings;
use crate::error::TransportError;

/// 商品ページ確認用のタイムアウト
const PRODUCT_PAGE_TIMEOUT: Duration = Duration::from_secs(15);

/// 取得リクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// None の場合はTransportの既定値
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// 取得結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    /// 2xx 以外をエラーに変換（404/410 は NotFound）
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        match self.status {
            200..=299 => Ok(self),
            404 | 410 => Err(TransportError::NotFound(self.url)),
            status => Err(TransportError::Status {
                status,
                url: self.url,
            }),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError>;
}

/// レビュー一覧の取得
///
/// 2ページ目以降の404/410はページ終端として None を返す。
pub async fn fetch_listing(
    transport: &dyn Transport,
    request: &FetchRequest,
    page: u32,
) -> Result<Option<FetchResponse>, TransportError> {
    match transport.fetch(request).await?.error_for_status() {
        Ok(response) => Ok(Some(response)),
        Err(TransportError::NotFound(url)) if page > 1 => {
            debug!("Listing page {} not found, treating as end: {}", page, url);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// 推測した商品ページが存在するか
///
/// 2xx なら true、404/410 なら false。それ以外はエラー。
pub async fn product_page_exists(
    transport: &dyn Transport,
    url: &str,
) -> Result<bool, TransportError> {
    let request = FetchRequest::get(url).with_timeout(PRODUCT_PAGE_TIMEOUT);
    match transport.fetch(&request).await?.error_for_status() {
        Ok(_) => Ok(true),
        Err(TransportError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// reqwest による Transport 実装
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(settings: &EngineSettings) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.8,*/*;q=0.7",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            client,
            timeout: settings.request_timeout,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let url = url::Url::parse(&request.url)?;

        let mut headers = HeaderMap::new();
        for (k, v) in &request.headers {
            if let (Ok(k), Ok(v)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                headers.insert(k, v);
            }
        }

        debug!("Fetching {}", request.url);
        let response = self
            .client
            .get(url)
            .headers(headers)
            .timeout(request.timeout.unwrap_or(self.timeout))
            .send()
            .await?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;

        Ok(FetchResponse {
            url: final_url,
            status,
            body,
        })
    }
}
