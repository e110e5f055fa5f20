use serde::Deserialize;

/// 検索APIのレスポンス
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub products: Vec<ProductSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductSummary {
    pub name: String,
    pub slug: String,
    /// 商品ページのパス（無い場合は slug から組み立てる）
    pub url: Option<String>,
}

/// ページ送り情報
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    pub next_cursor: Option<String>,
    pub has_more: Option<bool>,
}

impl Pagination {
    pub fn has_next(&self) -> bool {
        self.next_cursor.is_some() && self.has_more.unwrap_or(true)
    }
}

/// レビュー1件
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewItem {
    pub id: Option<Scalar>,
    pub heading: Option<String>,
    pub text: Option<String>,
    pub pros: Option<String>,
    pub cons: Option<String>,
    pub rating: Option<Scalar>,
    #[serde(alias = "date")]
    pub published_at: Option<String>,
    pub author: Option<Author>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Author {
    pub name: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
}

/// 数値・文字列のどちらでも来る値
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    pub fn into_string(self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(s) => s,
        }
    }
}
