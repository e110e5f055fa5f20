use thiserror::Error;

use crate::model::SourceId;

/// Transport層のエラー（リトライ対象の判定を持つ）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("接続エラー: {0}")]
    Connection(String),

    #[error("HTTPステータス {status}: {url}")]
    Status { status: u16, url: String },

    #[error("ページが見つかりません: {0}")]
    NotFound(String),

    #[error("不正なURL: {0}")]
    InvalidUrl(String),

    #[error("レスポンス読み込みエラー: {0}")]
    Body(String),
}

impl TransportError {
    /// リトライで回復しうるエラーか
    ///
    /// 404と不正URLは何度試しても結果が変わらないため対象外
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout(_)
            | TransportError::Connection(_)
            | TransportError::Status { .. }
            | TransportError::Body(_) => true,
            TransportError::NotFound(_) | TransportError::InvalidUrl(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            TransportError::Connection(e.to_string())
        } else if e.is_builder() {
            TransportError::InvalidUrl(e.to_string())
        } else {
            TransportError::Body(e.to_string())
        }
    }
}

impl From<url::ParseError> for TransportError {
    fn from(e: url::ParseError) -> Self {
        TransportError::InvalidUrl(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("設定エラー: {0}")]
    Configuration(String),

    #[error("企業が見つかりません: '{company}' ({platform})")]
    CompanyNotFound { platform: SourceId, company: String },

    #[error("通信エラー: {0}")]
    Transport(#[from] TransportError),

    #[error("ページ解析エラー: {0}")]
    ParseDegraded(String),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ファイル操作エラー: {0}")]
    FileIO(#[from] std::io::Error),
}

impl ScraperError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ScraperError::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_retryable() {
        assert!(TransportError::Timeout("t".into()).is_retryable());
        assert!(TransportError::Connection("c".into()).is_retryable());
        assert!(TransportError::Status {
            status: 503,
            url: "https://example.com".into()
        }
        .is_retryable());
        assert!(!TransportError::NotFound("https://example.com".into()).is_retryable());
        assert!(!TransportError::InvalidUrl("::".into()).is_retryable());
    }

    #[test]
    fn test_scraper_error_retryable_only_for_transport() {
        let err: ScraperError = TransportError::Timeout("slow".into()).into();
        assert!(err.is_retryable());

        let err = ScraperError::CompanyNotFound {
            platform: SourceId::G2,
            company: "Zoom".into(),
        };
        assert!(!err.is_retryable());
        assert!(!ScraperError::Configuration("bad".into()).is_retryable());
    }
}
