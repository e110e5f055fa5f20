//! Capterra ドライバー
//!
//! 評価は1〜5の星（半星あり）。日付は "3 days ago" のような相対表記も混ざる。

mod source;

pub use source::CapterraSource;
