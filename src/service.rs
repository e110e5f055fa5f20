use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::Service;
use tracing::info;

use crate::config::{EngineSettings, ScrapingConfig};
use crate::engine::TraversalEngine;
use crate::error::ScraperError;
use crate::model::{RunResult, SourceId};
use crate::output::write_result;
use crate::traits::CompanyHandle;

/// tower::Serviceを実装したレビュー収集サービス
///
/// `output_path` が設定されたリクエストは結果をJSONで保存してから返す。
#[derive(Clone)]
pub struct ReviewScraperService {
    engine: Arc<TraversalEngine>,
}

impl ReviewScraperService {
    pub fn new(engine: TraversalEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// reqwest と組み込みソースで構成
    pub fn with_default_sources(settings: EngineSettings) -> Result<Self, ScraperError> {
        Ok(Self::new(TraversalEngine::with_default_sources(settings)?))
    }

    pub fn engine(&self) -> &TraversalEngine {
        &self.engine
    }

    /// 企業の特定だけを行う（レビューは取得しない）
    pub fn search_company(
        &self,
        company_name: impl Into<String>,
        source: SourceId,
    ) -> BoxFuture<'static, Result<CompanyHandle, ScraperError>> {
        let engine = self.engine.clone();
        let company_name = company_name.into();
        Box::pin(async move { engine.resolve_company(source, &company_name, None).await })
    }
}

impl Service<ScrapingConfig> for ReviewScraperService {
    type Response = RunResult;
    type Error = ScraperError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, config: ScrapingConfig) -> Self::Future {
        info!(
            "スクレイピングリクエスト受信: company={}, source={}",
            config.company_name, config.source
        );
        let engine = self.engine.clone();

        Box::pin(async move {
            let result = engine.run(&config).await?;

            if let Some(path) = &config.output_path {
                write_result(&result, path)?;
            }

            info!(
                "スクレイピング完了: reviews={}, pages={}, stop={:?}",
                result.total_reviews_found, result.pages_scraped, result.stop_reason
            );
            Ok(result)
        })
    }
}
