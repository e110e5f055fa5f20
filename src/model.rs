//! 正規化済みレビューと実行結果の型定義

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScrapingConfig;
use crate::error::ScraperError;

/// レビューサイトの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    G2,
    Capterra,
    TrustRadius,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [SourceId::G2, SourceId::Capterra, SourceId::TrustRadius];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::G2 => "g2",
            SourceId::Capterra => "capterra",
            SourceId::TrustRadius => "trustradius",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SourceId::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| ScraperError::Configuration(format!("未対応のソース: {}", s)))
    }
}

/// 正規化済みレビュー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub title: String,
    pub body: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub reviewer_name: Option<String>,
    /// 0〜5 に換算済みの評価
    pub rating: Option<f64>,
    pub source: SourceId,
    /// 監査用の生データ（フィルタには使わない）
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// ページから抜き出した未加工のフィールド
///
/// キーは `title` / `body` / `date` / `reviewer` / `rating` などソース共通の名前を使い、
/// 空文字の値は保持しない。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecordFields(BTreeMap<String, String>);

impl RawRecordFields {
    pub const TITLE: &'static str = "title";
    pub const BODY: &'static str = "body";
    pub const DATE: &'static str = "date";
    pub const REVIEWER: &'static str = "reviewer";
    pub const RATING: &'static str = "rating";

    pub fn new() -> Self {
        Self::default()
    }

    /// 値が空でなければ登録する
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        if let Some(v) = value {
            if !v.trim().is_empty() {
                self.0.insert(key.into(), v);
            }
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, Some(value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// ページ走査が止まった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// ソースが最終ページを通知した
    EndOfPages,
    /// max_pages に到達
    PageLimit,
    /// 抽出件数0のページが連続した
    EmptyPages,
    /// 新しい順の一覧で期間より古いページに到達
    OlderThanWindow,
    /// ページ取得のリトライが尽きた
    TransportExhausted,
    /// ページ本文を解釈できなかった
    ParseFailed,
}

impl StopReason {
    /// 途中で打ち切られた（部分結果）かどうか
    pub fn is_pagination_terminal(&self) -> bool {
        matches!(self, StopReason::TransportExhausted | StopReason::ParseFailed)
    }
}

/// スクレイピング実行結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub config: ScrapingConfig,
    pub reviews: Vec<ReviewRecord>,
    pub total_reviews_found: usize,
    pub pages_scraped: u32,
    pub scraping_duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
    pub stop_reason: StopReason,
}

impl RunResult {
    pub fn new(
        config: ScrapingConfig,
        reviews: Vec<ReviewRecord>,
        pages_scraped: u32,
        duration: Duration,
        stop_reason: StopReason,
    ) -> Self {
        Self {
            total_reviews_found: reviews.len(),
            config,
            reviews,
            pages_scraped,
            scraping_duration_seconds: duration.as_secs_f64(),
            timestamp: Utc::now(),
            stop_reason,
        }
    }

    /// 評価ごとの件数（"4.5 stars" 形式、評価なしは "unrated"）
    pub fn rating_summary(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for review in &self.reviews {
            let key = match review.rating {
                Some(r) => format!("{:.1} stars", r),
                None => "unrated".to_string(),
            };
            *summary.entry(key).or_insert(0) += 1;
        }
        summary
    }
}
