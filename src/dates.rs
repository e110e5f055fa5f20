//! レビュー日付のパース
//!
//! 相対表記（"3 days ago"）は実行開始時刻を基準に解決する。

use std::sync::OnceLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use crate::text::clean_text;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%B %d %Y", "%d %B %Y", "%m/%d/%Y", "%m/%d/%y"];

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d+|an?)\s+(minute|hour|day|week|month|year)s?\s+ago\b")
            .expect("valid regex")
    })
}

fn embedded_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\d{4}-\d{1,2}-\d{1,2}|[A-Za-z]{3,9}\.? \d{1,2},? \d{4}|\d{1,2} [A-Za-z]{3,9} \d{4}|\d{1,2}/\d{1,2}/\d{2,4}",
        )
        .expect("valid regex")
    })
}

/// 日付テキストを解釈する。解釈できなければ None（現在時刻などで補わない）
pub fn parse_review_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = clean_text(text);
    if text.is_empty() {
        return None;
    }

    if let Some(relative) = parse_relative(&text, now) {
        return Some(relative);
    }

    if let Some(absolute) = parse_absolute(&text) {
        return Some(absolute);
    }

    // "Reviewed on March 3, 2024 by ..." のような文中の日付
    embedded_date_re()
        .find_iter(&text)
        .find_map(|m| parse_absolute(m.as_str()))
}

fn parse_absolute(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.and_utc());
        }
    }

    // "Feb. 5, 2024" の省略ピリオド
    let text = text.replace('.', "");
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn parse_relative(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = text.to_lowercase();
    match lower.as_str() {
        "today" | "just now" => return Some(now),
        "yesterday" => return now.checked_sub_signed(Duration::days(1)),
        _ => {}
    }

    let caps = relative_re().captures(&lower)?;
    let amount: i64 = match caps.get(1)?.as_str() {
        "a" | "an" => 1,
        n => n.parse().ok()?,
    };

    // 月・年は概算（30日・365日）
    let delta = match caps.get(2)?.as_str() {
        "minute" => Duration::try_minutes(amount),
        "hour" => Duration::try_hours(amount),
        "day" => Duration::try_days(amount),
        "week" => Duration::try_weeks(amount),
        "month" => amount.checked_mul(30).and_then(Duration::try_days),
        "year" => amount.checked_mul(365).and_then(Duration::try_days),
        _ => None,
    }?;

    now.checked_sub_signed(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_absolute_formats() {
        assert_eq!(parse_review_date("2024-01-15", now()), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_review_date("January 15, 2024", now()), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_review_date("Jan 5, 2024", now()), Some(ymd(2024, 1, 5)));
        assert_eq!(parse_review_date("Feb. 5, 2024", now()), Some(ymd(2024, 2, 5)));
        assert_eq!(parse_review_date("15 January 2024", now()), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_review_date("01/15/2024", now()), Some(ymd(2024, 1, 15)));
        assert_eq!(
            parse_review_date("2024-01-15T10:30:00Z", now()),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap())
        );
        assert_eq!(
            parse_review_date("2024-01-15T10:30:00+09:00", now()),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 1, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_relative_dates_use_given_now() {
        assert_eq!(parse_review_date("3 days ago", now()), Some(now() - Duration::days(3)));
        assert_eq!(parse_review_date("a week ago", now()), Some(now() - Duration::weeks(1)));
        assert_eq!(parse_review_date("2 months ago", now()), Some(now() - Duration::days(60)));
        assert_eq!(parse_review_date("Yesterday", now()), Some(now() - Duration::days(1)));
        assert_eq!(parse_review_date("Posted 5 hours ago", now()), Some(now() - Duration::hours(5)));
    }

    #[test]
    fn test_embedded_date() {
        assert_eq!(
            parse_review_date("Reviewed on March 3, 2024 by a verified user", now()),
            Some(ymd(2024, 3, 3))
        );
    }

    #[test]
    fn test_fractional_seconds_kept() {
        assert_eq!(
            parse_review_date("2024-01-15T10:30:00.250Z", now()),
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap() + Duration::milliseconds(250))
        );
    }

    #[test]
    fn test_unparseable_is_none() {
        assert_eq!(parse_review_date("", now()), None);
        assert_eq!(parse_review_date("sometime last spring", now()), None);
        assert_eq!(parse_review_date("2024-13-45", now()), None);
        assert_eq!(parse_review_date("99999999999999 years ago", now()), None);
    }
}
