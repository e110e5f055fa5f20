//! テキスト整形と企業名マッチング

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn legal_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s+(inc|llc|corp|ltd|co)\.?$").expect("valid regex"))
}

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("valid regex"))
}

fn non_slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"))
}

/// 空白をまとめ、残っているHTMLエンティティを戻す
pub fn clean_text(text: &str) -> String {
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    whitespace_re().replace_all(decoded.trim(), " ").trim().to_string()
}

/// 空なら None
pub fn non_empty(text: &str) -> Option<String> {
    let cleaned = clean_text(text);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// "by Jane D." → "Jane D."
pub fn strip_byline(name: &str) -> String {
    let cleaned = clean_text(name);
    for prefix in ["reviewed by ", "by "] {
        let head = cleaned.get(..prefix.len());
        if head.is_some_and(|h| h.eq_ignore_ascii_case(prefix)) {
            return cleaned[prefix.len()..].trim().to_string();
        }
    }
    cleaned
}

/// URL用のスラッグ（"Acme & Co" → "acme-co"）
pub fn company_slug(company_name: &str) -> String {
    let lower = clean_text(company_name).to_lowercase();
    non_slug_re()
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

/// 検索に使う企業名のバリエーション（重複なし、元の名前が先頭）
pub fn company_name_variations(company_name: &str) -> Vec<String> {
    let name = company_name.trim();
    let mut candidates = vec![name.to_string(), name.to_lowercase()];

    let stripped = legal_suffix_re().replace(name, "").to_string();
    if stripped != name {
        candidates.push(stripped.clone());
        candidates.push(stripped.to_lowercase());
    }

    let expanded = name.replace('&', "and");
    if expanded != name {
        candidates.push(expanded.clone());
        candidates.push(expanded.to_lowercase());
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}

/// 検索語と商品名が同じ企業を指しているか
///
/// 部分一致、またはストップワードを除いた単語の半分以上が重なれば一致とみなす。
pub fn is_company_match(search_term: &str, product_name: &str, stop_words: &[&str]) -> bool {
    let search = search_term.trim().to_lowercase();
    let product = clean_text(product_name).to_lowercase();
    if search.is_empty() || product.len() < 2 {
        return false;
    }

    if product.contains(&search) || search.contains(&product) {
        return true;
    }

    let words = |text: &str| -> HashSet<String> {
        punctuation_re()
            .replace_all(text, " ")
            .split_whitespace()
            .filter(|w| !stop_words.contains(w))
            .map(str::to_string)
            .collect()
    };

    let a = words(&search);
    let b = words(&product);
    if a.is_empty() || b.is_empty() {
        return false;
    }

    let overlap = a.intersection(&b).count();
    overlap * 2 >= a.len().max(b.len())
}

/// 企業名マッチングで無視する単語
pub const COMPANY_STOP_WORDS: &[&str] = &[
    "the", "inc", "llc", "corp", "ltd", "corporation", "software", "review", "reviews",
];
