use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ScraperError;
use crate::model::SourceId;
use crate::retry::RetryPolicy;

/// 企業検索で検索語を切り替える間の既定の待ち時間
pub const DEFAULT_SEARCH_DELAY: Duration = Duration::from_secs(1);

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 1回のスクレイピング実行の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapingConfig {
    pub company_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub source: SourceId,
    pub output_path: Option<PathBuf>,
    pub max_pages: Option<u32>,
    /// true の場合は期間フィルタを行わない
    pub all_reviews: bool,
    /// 指定時は企業検索を行わずこのURLを使う
    pub direct_url: Option<String>,
}

impl ScrapingConfig {
    pub fn new(
        company_name: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        source: SourceId,
    ) -> Self {
        Self {
            company_name: company_name.into(),
            start_date,
            end_date,
            source,
            output_path: None,
            max_pages: None,
            all_reviews: false,
            direct_url: None,
        }
    }

    /// 文字列引数から設定を作成（日付とソースはここで検証）
    pub fn parse(
        company_name: &str,
        start_date: &str,
        end_date: &str,
        source: &str,
    ) -> Result<Self, ScraperError> {
        let config = Self::new(
            company_name,
            parse_date(start_date)?,
            parse_date(end_date)?,
            source.parse()?,
        );
        config.validate()?;
        Ok(config)
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn with_all_reviews(mut self, all_reviews: bool) -> Self {
        self.all_reviews = all_reviews;
        self
    }

    pub fn with_direct_url(mut self, url: impl Into<String>) -> Self {
        self.direct_url = Some(url.into());
        self
    }

    /// ネットワークアクセス前に設定を検証
    pub fn validate(&self) -> Result<(), ScraperError> {
        if self.company_name.trim().is_empty() {
            return Err(ScraperError::Configuration(
                "company_name が空です".to_string(),
            ));
        }

        if self.start_date > self.end_date {
            return Err(ScraperError::Configuration(format!(
                "start_date ({}) が end_date ({}) より後です",
                self.start_date, self.end_date
            )));
        }

        if self.max_pages == Some(0) {
            return Err(ScraperError::Configuration(
                "max_pages は1以上を指定してください".to_string(),
            ));
        }

        if let Some(raw) = &self.direct_url {
            let url = url::Url::parse(raw).map_err(|e| {
                ScraperError::Configuration(format!("direct_url が不正です ({}): {}", raw, e))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ScraperError::Configuration(format!(
                    "direct_url は http/https のみ対応: {}",
                    raw
                )));
            }
        }

        Ok(())
    }

    /// 日付がフィルタ期間内か（両端を含む）
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// `YYYY-MM-DD` または RFC 3339 の日付を読む
pub fn parse_date(text: &str) -> Result<NaiveDate, ScraperError> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|dt| dt.date_naive()))
        .map_err(|_| ScraperError::Configuration(format!("日付を解釈できません: '{}'", text)))
}

/// エンジン側の動作設定
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// ページ取得の間隔
    pub page_delay: Duration,
    /// 企業検索のリクエスト間隔
    pub search_delay: Duration,
    /// 1リクエストあたりのタイムアウト
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_secs(2),
            search_delay: DEFAULT_SEARCH_DELAY,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl EngineSettings {
    /// 環境変数で上書きした設定を作成（不正な値は無視）
    ///
    /// - `REVIEW_SCRAPER_PAGE_DELAY_MS`
    /// - `REVIEW_SCRAPER_SEARCH_DELAY_MS`
    /// - `REVIEW_SCRAPER_TIMEOUT_SECS`
    /// - `REVIEW_SCRAPER_MAX_ATTEMPTS`
    /// - `REVIEW_SCRAPER_USER_AGENT`
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(ms) = env_number("REVIEW_SCRAPER_PAGE_DELAY_MS") {
            settings.page_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_number("REVIEW_SCRAPER_SEARCH_DELAY_MS") {
            settings.search_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_number("REVIEW_SCRAPER_TIMEOUT_SECS") {
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = env_number("REVIEW_SCRAPER_MAX_ATTEMPTS") {
            settings.retry.max_attempts = attempts.clamp(1, u32::MAX as u64) as u32;
        }
        if let Ok(agent) = std::env::var("REVIEW_SCRAPER_USER_AGENT") {
            if !agent.trim().is_empty() {
                settings.user_agent = agent;
            }
        }

        settings
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }
}

fn env_number(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}
