//! HTMLドライバー共通のセレクタ操作

use regex::Regex;
use scraper::{ElementRef, Selector};
use std::sync::OnceLock;

use crate::text::{clean_text, non_empty};

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

/// 不正なセレクタは None（ドライバーの定数なので通常は起きない）
pub fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

pub fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// 最初に一致した要素のテキスト（空なら次の候補）
pub fn select_text(scope: ElementRef<'_>, css: &str) -> Option<String> {
    let sel = selector(css)?;
    scope
        .select(&sel)
        .map(element_text)
        .find(|text| !text.is_empty())
}

/// 最初に一致した要素の属性。どの属性も無ければそのテキスト
pub fn select_attr_or_text(scope: ElementRef<'_>, css: &str, attrs: &[&str]) -> Option<String> {
    let sel = selector(css)?;
    let element = scope.select(&sel).next()?;
    attrs
        .iter()
        .find_map(|name| element.value().attr(name).and_then(non_empty))
        .or_else(|| non_empty(&element_text(element)))
}

/// 候補セレクタを順に試し、最初に一致があったものの要素一覧
pub fn first_matching<'a>(scope: ElementRef<'a>, candidates: &[&str]) -> Vec<ElementRef<'a>> {
    for css in candidates {
        let Some(sel) = selector(css) else {
            continue;
        };
        let found: Vec<_> = scope.select(&sel).collect();
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

pub fn count_matches(scope: ElementRef<'_>, css: &str) -> usize {
    selector(css)
        .map(|sel| scope.select(&sel).count())
        .unwrap_or(0)
}

/// href を持ち、無効化されていないリンクがあるか
pub fn has_enabled_link(scope: ElementRef<'_>, css: &str) -> bool {
    let Some(sel) = selector(css) else {
        return false;
    };
    scope.select(&sel).any(|link| {
        let el = link.value();
        let disabled = el.attr("disabled").is_some()
            || el.attr("aria-disabled") == Some("true")
            || el.classes().any(|c| c == "disabled");
        !disabled && el.attr("href").is_some_and(|href| !href.trim().is_empty() && href != "#")
    })
}

/// ページャーの現在ページより大きい番号があるか
pub fn pager_has_later_page(scope: ElementRef<'_>, links_css: &str, current_css: &str) -> Option<bool> {
    let current = select_text(scope, current_css).and_then(|t| first_integer(&t))?;
    let sel = selector(links_css)?;
    let max = scope
        .select(&sel)
        .filter_map(|link| first_integer(&element_text(link)))
        .max()?;
    Some(current < max)
}

fn first_integer(text: &str) -> Option<u32> {
    digits_re().find(text)?.as_str().parse().ok()
}

/// 相対リンクを絶対URLへ
pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    let base = url::Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

/// 商品URLを `marker` の後ろ `depth` セグメントまでに切り詰める
///
/// 戻り値は (切り詰めたURL, 最後のセグメント)。
pub fn product_root(raw: &str, marker: &str, depth: usize) -> Option<(String, String)> {
    let mut url = url::Url::parse(raw).ok()?;
    let segments: Vec<String> = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let start = segments.iter().position(|s| s == marker)?;
    let end = start + depth;
    if end >= segments.len() {
        return None;
    }
    let kept = &segments[..=end];
    url.set_path(&format!("/{}", kept.join("/")));
    url.set_query(None);
    url.set_fragment(None);
    Some((url.to_string(), kept[end].clone()))
}
