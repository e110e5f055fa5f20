//! ページ走査エンジン
//!
//! 企業の特定 → ページ取得 → 抽出 → 正規化 → 期間フィルタ を順番に行う。
//! 1回の実行中にリクエストを並行させることはない。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{EngineSettings, ScrapingConfig};
use crate::error::ScraperError;
use crate::model::{ReviewRecord, RunResult, SourceId, StopReason};
use crate::registry::SourceRegistry;
use crate::traits::{
    CompanyHandle, DiscardReason, NormalizeContext, Normalized, PageFetch, ReviewSource,
};
use crate::transport::ReqwestTransport;

/// 抽出件数0のページがこの回数続いたら打ち切る
const MAX_CONSECUTIVE_EMPTY_PAGES: u32 = 2;
/// 進捗ログの間隔（ページ数）
const PROGRESS_LOG_INTERVAL: u32 = 10;

/// 実行状況の通知先
///
/// すべて既定で何もしない。
pub trait ScrapeObserver: Send + Sync {
    fn on_company_resolved(&self, _source: SourceId, _handle: &CompanyHandle) {}

    fn on_retry(&self, _source: SourceId, _attempt: u32, _delay: Duration, _error: &ScraperError) {}

    /// `extracted` は抽出件数、`kept` はフィルタ後に残った件数
    fn on_page(&self, _source: SourceId, _page: u32, _extracted: usize, _kept: usize) {}

    fn on_discard(&self, _source: SourceId, _page: u32, _reason: DiscardReason) {}

    fn on_finished(&self, _source: SourceId, _reason: StopReason, _pages_scraped: u32) {}
}

/// 何もしない Observer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ScrapeObserver for NoopObserver {}

pub struct TraversalEngine {
    registry: SourceRegistry,
    settings: EngineSettings,
    observer: Arc<dyn ScrapeObserver>,
}

impl TraversalEngine {
    pub fn new(registry: SourceRegistry, settings: EngineSettings) -> Self {
        Self {
            registry,
            settings,
            observer: Arc::new(NoopObserver),
        }
    }

    /// reqwest と組み込みソースで構成
    pub fn with_default_sources(settings: EngineSettings) -> Result<Self, ScraperError> {
        let transport = Arc::new(ReqwestTransport::new(&settings)?);
        Ok(Self::new(
            SourceRegistry::from_settings(transport, &settings),
            settings,
        ))
    }

    pub fn with_observer(mut self, observer: Arc<dyn ScrapeObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn source_for(&self, id: SourceId) -> Result<Arc<dyn ReviewSource>, ScraperError> {
        self.registry.get(id).ok_or_else(|| {
            ScraperError::Configuration(format!("ソースが登録されていません: {}", id))
        })
    }

    /// 企業の特定のみ行う（リトライあり）
    pub async fn resolve_company(
        &self,
        source_id: SourceId,
        company_name: &str,
        direct_url: Option<&str>,
    ) -> Result<CompanyHandle, ScraperError> {
        let source = self.source_for(source_id)?;
        self.resolve_with(source.as_ref(), company_name, direct_url)
            .await
    }

    async fn resolve_with(
        &self,
        source: &dyn ReviewSource,
        company_name: &str,
        direct_url: Option<&str>,
    ) -> Result<CompanyHandle, ScraperError> {
        let id = source.id();
        let label = format!("{} company lookup", id);
        let resolved = self
            .settings
            .retry
            .run_with(
                &label,
                move || source.resolve_company(company_name, direct_url),
                |attempt, delay, e| self.observer.on_retry(id, attempt, delay, e),
            )
            .await;

        // 通信エラーで特定できなかった場合も「見つからない」として終了する
        let handle = match resolved {
            Ok(handle) => handle,
            Err(ScraperError::Transport(e)) => {
                warn!("{} company lookup for '{}' gave up: {}", id, company_name, e);
                return Err(ScraperError::CompanyNotFound {
                    platform: id,
                    company: company_name.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        info!("Resolved {} company '{}' -> {}", id, company_name, handle.url);
        self.observer.on_company_resolved(id, &handle);
        Ok(handle)
    }

    /// 1回分のスクレイピングを実行
    ///
    /// 途中のページ取得失敗は `stop_reason` 付きの部分結果として返す。
    /// 設定不備と企業の特定失敗だけがエラーになる。
    pub async fn run(&self, config: &ScrapingConfig) -> Result<RunResult, ScraperError> {
        let started = Instant::now();
        let ctx = NormalizeContext::new(Utc::now());

        config.validate()?;
        let source = self.source_for(config.source)?;
        let source = source.as_ref();
        let id = source.id();

        info!(
            "Scraping {} reviews for '{}' ({} to {})",
            id, config.company_name, config.start_date, config.end_date
        );

        let handle = self
            .resolve_with(source, &config.company_name, config.direct_url.as_deref())
            .await?;

        let mut reviews: Vec<ReviewRecord> = Vec::new();
        let mut pages_scraped: u32 = 0;
        let mut consecutive_empty: u32 = 0;
        let mut cursor: Option<String> = None;
        let mut page_number: u32 = 1;

        let stop_reason = loop {
            if config.max_pages.is_some_and(|max| pages_scraped >= max) {
                break StopReason::PageLimit;
            }

            if page_number > 1 && !self.settings.page_delay.is_zero() {
                sleep(self.settings.page_delay).await;
            }

            let label = format!("{} page {}", id, page_number);
            let handle_ref = &handle;
            let cursor_ref = cursor.as_deref();
            let fetched = self
                .settings
                .retry
                .run_with(
                    &label,
                    move || source.fetch_page(handle_ref, page_number, cursor_ref),
                    |attempt, delay, e| self.observer.on_retry(id, attempt, delay, e),
                )
                .await;

            let page = match fetched {
                Ok(PageFetch::Page(page)) => page,
                Ok(PageFetch::EndOfPages) => break StopReason::EndOfPages,
                Err(ScraperError::Transport(e)) => {
                    warn!("Stopping {} at page {}: {}", id, page_number, e);
                    break StopReason::TransportExhausted;
                }
                Err(e) => {
                    warn!("Stopping {} at page {}, unreadable page: {}", id, page_number, e);
                    break StopReason::ParseFailed;
                }
            };
            pages_scraped += 1;

            let raw = source.extract_records(&page);
            let extracted = raw.len();
            let mut normalized = 0usize;
            let mut older_than_window = 0usize;
            let mut kept = 0usize;

            for fields in raw {
                let record = match source.normalize(fields, &ctx) {
                    Normalized::Record(record) => record,
                    Normalized::Discard(reason) => {
                        debug!("Discarded {} record on page {}: {}", id, page.number, reason);
                        self.observer.on_discard(id, page.number, reason);
                        continue;
                    }
                };

                normalized += 1;
                if record
                    .posted_at
                    .is_some_and(|ts| ts.date_naive() < config.start_date)
                {
                    older_than_window += 1;
                }

                if in_window(config, &record) {
                    reviews.push(record);
                    kept += 1;
                }
            }

            debug!(
                "{} page {}: {} extracted, {} kept",
                id, page.number, extracted, kept
            );
            self.observer.on_page(id, page.number, extracted, kept);

            if pages_scraped % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    "Progress: {} pages scraped, {} reviews collected",
                    pages_scraped,
                    reviews.len()
                );
            }

            if extracted == 0 {
                consecutive_empty += 1;
                if consecutive_empty >= MAX_CONSECUTIVE_EMPTY_PAGES {
                    break StopReason::EmptyPages;
                }
            } else {
                consecutive_empty = 0;
            }

            if !config.all_reviews
                && source.newest_first()
                && normalized > 0
                && older_than_window == normalized
            {
                info!(
                    "{} page {} is older than {}, stopping",
                    id, page.number, config.start_date
                );
                break StopReason::OlderThanWindow;
            }

            if !page.has_more {
                break StopReason::EndOfPages;
            }

            cursor = page.next_cursor;
            page_number += 1;
        };

        info!(
            "Finished {}: {} reviews from {} pages ({:?})",
            id,
            reviews.len(),
            pages_scraped,
            stop_reason
        );
        self.observer.on_finished(id, stop_reason, pages_scraped);

        Ok(RunResult::new(
            config.clone(),
            reviews,
            pages_scraped,
            started.elapsed(),
            stop_reason,
        ))
    }
}

/// 期間フィルタ（日付不明は all_reviews のときだけ残す）
fn in_window(config: &ScrapingConfig, record: &ReviewRecord) -> bool {
    if config.all_reviews {
        return true;
    }
    record
        .posted_at
        .is_some_and(|ts| config.contains_date(ts.date_naive()))
}
