//! 評価値の抽出と0〜5への換算

use std::sync::OnceLock;

use regex::Regex;

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid regex"))
}

fn out_of_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:out of|/)\s*(\d+(?:\.\d+)?)").expect("valid regex")
    })
}

/// ソース固有の評価スケール
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingScale {
    pub min: f64,
    pub max: f64,
}

impl RatingScale {
    /// 0〜5（小数あり）
    pub const ZERO_TO_FIVE: RatingScale = RatingScale { min: 0.0, max: 5.0 };
    /// 1〜5 の星（半星あり）
    pub const ONE_TO_FIVE_STARS: RatingScale = RatingScale { min: 1.0, max: 5.0 };
    /// 0〜10
    pub const ZERO_TO_TEN: RatingScale = RatingScale { min: 0.0, max: 10.0 };

    pub const CANONICAL_MAX: f64 = 5.0;

    /// スケール範囲外の値は None（推測で補正しない）
    pub fn rescale(&self, value: f64) -> Option<f64> {
        if !value.is_finite() || value < self.min || value > self.max || self.max <= self.min {
            return None;
        }
        let scaled = (value - self.min) / (self.max - self.min) * Self::CANONICAL_MAX;
        Some((scaled * 100.0).round() / 100.0)
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.min, self.max)
    }
}

/// テキスト中の最初の数値
pub fn first_number(text: &str) -> Option<f64> {
    number_re()
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// "8 out of 10" / "4.5/5" 形式なら (値, 上限)
pub fn out_of(text: &str) -> Option<(f64, f64)> {
    let caps = out_of_re().captures(text)?;
    let value = caps.get(1)?.as_str().parse().ok()?;
    let max = caps.get(2)?.as_str().parse().ok()?;
    Some((value, max))
}

/// 評価テキストを読んでスケール換算する
///
/// "X out of Y" 形式で上限が明示されていればそれを優先する。
pub fn parse_rating(text: &str, scale: RatingScale) -> Option<f64> {
    if let Some((value, max)) = out_of(text) {
        if max > 0.0 && max != scale.max {
            return RatingScale { min: 0.0, max }.rescale(value);
        }
        return scale.rescale(value);
    }
    scale.rescale(first_number(text)?)
}
