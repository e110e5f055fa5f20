//! G2 ドライバー
//!
//! HTMLの一覧ページを `?page=N` で辿る。評価は0〜5の小数。

mod source;

pub use source::G2Source;
