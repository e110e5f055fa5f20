//! 実行結果のJSON入出力

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::config::ScrapingConfig;
use crate::error::ScraperError;
use crate::model::RunResult;

fn unsafe_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("valid regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// `{企業名}_{ソース}_reviews_{YYYYMMDD}_to_{YYYYMMDD}.json`
pub fn default_output_filename(config: &ScrapingConfig) -> String {
    let company = unsafe_chars_re().replace_all(&config.company_name, "");
    let company = whitespace_re().replace_all(company.trim(), "_");
    format!(
        "{}_{}_reviews_{}_to_{}.json",
        company,
        config.source,
        config.start_date.format("%Y%m%d"),
        config.end_date.format("%Y%m%d")
    )
}

/// 設定の出力先、無ければカレントディレクトリの既定ファイル名
pub fn output_path(config: &ScrapingConfig) -> PathBuf {
    config
        .output_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(default_output_filename(config)))
}

/// 親ディレクトリを作成して整形済みJSONを書き出す
pub fn write_result(result: &RunResult, path: &Path) -> Result<(), ScraperError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)?;
    info!(
        "Saved {} reviews to {}",
        result.total_reviews_found,
        path.display()
    );
    Ok(())
}

/// 書き出し済みの結果を読み込み、内容の整合性を確認する
pub fn read_result(path: &Path) -> Result<RunResult, ScraperError> {
    let json = std::fs::read_to_string(path)?;
    let result: RunResult = serde_json::from_str(&json)?;

    result.config.validate()?;

    if result.total_reviews_found != result.reviews.len() {
        return Err(ScraperError::ParseDegraded(format!(
            "total_reviews_found ({}) がレビュー件数 ({}) と一致しません",
            result.total_reviews_found,
            result.reviews.len()
        )));
    }

    if let Some(index) = result
        .reviews
        .iter()
        .position(|r| r.body.trim().is_empty() || r.source != result.config.source)
    {
        return Err(ScraperError::ParseDegraded(format!(
            "不正なレビューが含まれています (index {})",
            index
        )));
    }

    Ok(result)
}
