use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::dates::parse_review_date;
use crate::error::ScraperError;
use crate::model::{RawRecordFields, ReviewRecord, SourceId};
use crate::rating::{parse_rating, RatingScale};
use crate::text::{clean_text, non_empty, strip_byline};

/// 解決済みの企業（商品）ページ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyHandle {
    /// 表示名
    pub name: String,
    /// 商品ページの絶対URL
    pub url: String,
    /// ソース内の識別子（URLのスラッグなど）
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageBody {
    Html(String),
    Json(Value),
}

/// 取得した1ページ分の未加工データ
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    /// 1始まりのページ番号
    pub number: u32,
    pub body: PageBody,
    pub has_more: bool,
    /// カーソル方式のソースで次ページ取得に渡す値
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageFetch {
    Page(RawPage),
    EndOfPages,
}

/// レコードを捨てた理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// フィールドが一つも取れなかった
    Empty,
    /// 本文が空
    MissingBody,
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardReason::Empty => f.write_str("no fields extracted"),
            DiscardReason::MissingBody => f.write_str("missing review body"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Record(ReviewRecord),
    Discard(DiscardReason),
}

/// 正規化時に参照する実行単位の情報
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeContext {
    /// 相対日付の基準時刻（実行開始時に固定）
    pub run_started_at: DateTime<Utc>,
}

impl NormalizeContext {
    pub fn new(run_started_at: DateTime<Utc>) -> Self {
        Self { run_started_at }
    }
}

/// レビューサイトごとのドライバー
#[async_trait]
pub trait ReviewSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// ソース本来の評価スケール
    fn rating_scale(&self) -> RatingScale;

    /// 一覧が新しい順に並んでいるか
    fn newest_first(&self) -> bool {
        false
    }

    /// 企業名（または直接URL）から商品ページを特定
    ///
    /// `direct_url` がある場合は通信しない。
    async fn resolve_company(
        &self,
        company_name: &str,
        direct_url: Option<&str>,
    ) -> Result<CompanyHandle, ScraperError>;

    /// レビュー一覧の1ページを取得
    async fn fetch_page(
        &self,
        handle: &CompanyHandle,
        page: u32,
        cursor: Option<&str>,
    ) -> Result<PageFetch, ScraperError>;

    /// ページからレコード単位のフィールドを抜き出す（文書順）
    fn extract_records(&self, page: &RawPage) -> Vec<RawRecordFields>;

    /// 未加工フィールドを `ReviewRecord` に変換
    fn normalize(&self, fields: RawRecordFields, ctx: &NormalizeContext) -> Normalized {
        normalize_fields(self.id(), self.rating_scale(), fields, ctx)
    }
}

/// ドライバー共通の正規化
///
/// 解釈できない日付・評価は None のまま残し、元の値を `extra` に保存する。
pub fn normalize_fields(
    source: SourceId,
    scale: RatingScale,
    fields: RawRecordFields,
    ctx: &NormalizeContext,
) -> Normalized {
    if fields.is_empty() {
        return Normalized::Discard(DiscardReason::Empty);
    }

    let Some(body) = fields.get(RawRecordFields::BODY).and_then(non_empty) else {
        return Normalized::Discard(DiscardReason::MissingBody);
    };

    let mut extra = BTreeMap::new();

    let posted_at = fields.get(RawRecordFields::DATE).and_then(|raw| {
        extra.insert("raw_date".to_string(), raw.to_string());
        let parsed = parse_review_date(raw, ctx.run_started_at);
        if parsed.is_none() {
            debug!("Unparseable {} review date: {:?}", source, raw);
        }
        parsed
    });

    let rating = fields.get(RawRecordFields::RATING).and_then(|raw| {
        extra.insert("raw_rating".to_string(), raw.to_string());
        extra.insert("rating_scale".to_string(), scale.label());
        parse_rating(raw, scale)
    });

    let reviewer_name = fields
        .get(RawRecordFields::REVIEWER)
        .map(strip_byline)
        .filter(|name| !name.is_empty());

    for (key, value) in fields.iter() {
        let known = [
            RawRecordFields::TITLE,
            RawRecordFields::BODY,
            RawRecordFields::DATE,
            RawRecordFields::REVIEWER,
            RawRecordFields::RATING,
        ];
        if !known.contains(&key.as_str()) {
            extra.insert(key.clone(), value.clone());
        }
    }

    Normalized::Record(ReviewRecord {
        title: fields
            .get(RawRecordFields::TITLE)
            .map(clean_text)
            .unwrap_or_default(),
        body,
        posted_at,
        reviewer_name,
        rating,
        source,
        extra,
    })
}
