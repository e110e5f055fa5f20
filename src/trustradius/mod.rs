//! TrustRadius ドライバー
//!
//! JSON API を `cursor` で辿る。評価は0〜10。

mod source;
mod types;

pub use source::TrustRadiusSource;
pub use types::{Author, Pagination, ProductSummary, ReviewItem, Scalar, SearchResponse};
