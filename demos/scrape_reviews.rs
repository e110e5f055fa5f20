//! レビュー収集デモ
//!
//! 実行方法:
//! ```
//! COMPANY=Zoom SOURCE=g2 START_DATE=2024-01-01 END_DATE=2024-03-01 \
//!     cargo run --example scrape_reviews
//! ```
//!
//! 任意: `MAX_PAGES`, `OUTPUT`, `DIRECT_URL`, `ALL_REVIEWS=1`,
//! `REVIEW_SCRAPER_PAGE_DELAY_MS` などのエンジン設定

use review_scraper::{output_path, EngineSettings, ReviewScraperService, ScrapingConfig};
use tower::Service;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ログ設定
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let company = std::env::var("COMPANY").expect("COMPANY not set");
    let source = std::env::var("SOURCE").unwrap_or_else(|_| "g2".to_string());
    let start_date = std::env::var("START_DATE").expect("START_DATE not set");
    let end_date = std::env::var("END_DATE").expect("END_DATE not set");

    let mut config = ScrapingConfig::parse(&company, &start_date, &end_date, &source)?;
    if let Ok(max_pages) = std::env::var("MAX_PAGES") {
        config = config.with_max_pages(max_pages.parse()?);
    }
    if let Ok(url) = std::env::var("DIRECT_URL") {
        config = config.with_direct_url(url);
    }
    if std::env::var("ALL_REVIEWS").is_ok_and(|v| v == "1" || v == "true") {
        config = config.with_all_reviews(true);
    }
    if let Ok(output) = std::env::var("OUTPUT") {
        config = config.with_output_path(output);
    }
    // 未指定ならカレントディレクトリの既定ファイル名
    let path = output_path(&config);
    config = config.with_output_path(path);

    println!("=== Review Scraper ===");
    println!("Company: {}", config.company_name);
    println!("Source: {}", config.source);
    println!("Date range: {} to {}", config.start_date, config.end_date);
    println!();

    let mut service = ReviewScraperService::with_default_sources(EngineSettings::from_env())?;
    let result = service.call(config).await?;

    println!("Reviews found: {}", result.total_reviews_found);
    println!("Pages scraped: {}", result.pages_scraped);
    println!("Duration: {:.2}s", result.scraping_duration_seconds);
    println!("Stop reason: {:?}", result.stop_reason);
    if let Some(path) = &result.config.output_path {
        println!("Saved to: {}", path.display());
    }

    println!();
    println!("Rating distribution:");
    for (rating, count) in result.rating_summary().iter().rev() {
        println!("  {}: {}", rating, count);
    }

    Ok(())
}
