//! レビュー収集ライブラリ
//!
//! - G2 / Capterra / TrustRadius のレビューを共通の `ReviewRecord` に正規化
//! - ページ送り・リトライ・期間フィルタは `TraversalEngine` が担当
//! - サイトごとの差分は `ReviewSource` を実装したドライバーに閉じ込める
//!
//! # 使用例
//!
//! ```rust,ignore
//! use review_scraper::{EngineSettings, ReviewScraperService, ScrapingConfig};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut service = ReviewScraperService::with_default_sources(EngineSettings::from_env()).unwrap();
//!
//!     let config = ScrapingConfig::parse("Zoom", "2024-01-01", "2024-03-01", "g2")
//!         .unwrap()
//!         .with_max_pages(5)
//!         .with_output_path("./output/zoom_g2.json");
//!
//!     let result = service.call(config).await.unwrap();
//!     println!("Reviews: {} ({} pages)", result.total_reviews_found, result.pages_scraped);
//! }
//! ```
//!
//! # ドライバーを差し替える例
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use review_scraper::{G2Source, ReqwestTransport, SourceRegistry, TraversalEngine, EngineSettings};
//!
//! let settings = EngineSettings::default();
//! let transport = Arc::new(ReqwestTransport::new(&settings)?);
//! let mut registry = SourceRegistry::with_default_sources(transport.clone());
//! registry.register(Arc::new(G2Source::new(transport).with_base_url("https://g2-mirror.internal")));
//! let engine = TraversalEngine::new(registry, settings);
//! ```

pub mod capterra;
pub mod config;
pub mod dates;
pub mod engine;
pub mod error;
pub mod g2;
pub mod html;
pub mod model;
pub mod output;
pub mod rating;
pub mod registry;
pub mod retry;
pub mod service;
pub mod text;
pub mod traits;
pub mod transport;
pub mod trustradius;

#[cfg(test)]
pub(crate) mod testing;

// 主要な型をリエクスポート
pub use config::{EngineSettings, ScrapingConfig};
pub use engine::{NoopObserver, ScrapeObserver, TraversalEngine};
pub use error::{ScraperError, TransportError};
pub use model::{RawRecordFields, ReviewRecord, RunResult, SourceId, StopReason};
pub use output::{default_output_filename, output_path, read_result, write_result};
pub use rating::RatingScale;
pub use registry::SourceRegistry;
pub use retry::RetryPolicy;
pub use service::ReviewScraperService;
pub use traits::{
    CompanyHandle, DiscardReason, NormalizeContext, Normalized, PageBody, PageFetch, RawPage,
    ReviewSource,
};
pub use transport::{
    fetch_listing, product_page_exists, FetchRequest, FetchResponse, ReqwestTransport, Transport,
};

// ドライバー
pub use capterra::CapterraSource;
pub use g2::G2Source;
pub use trustradius::TrustRadiusSource;
