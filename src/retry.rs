//! 指数バックオフ付きリトライ

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::{ScraperError, TransportError};

/// リトライで回復しうるエラー
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        TransportError::is_retryable(self)
    }
}

impl Retryable for ScraperError {
    fn is_retryable(&self) -> bool {
        ScraperError::is_retryable(self)
    }
}

/// リトライ設定
///
/// `max_attempts` は初回を含む試行回数。待機時間は失敗ごとに倍になり `max_delay` で頭打ち。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// n回目（1始まり）の失敗後に待つ時間
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed_attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn run<T, E, F, Fut>(&self, label: &str, op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_with(label, op, |_, _, _| {}).await
    }

    /// `on_retry(失敗回数, 待機時間, エラー)` は待機の直前に呼ばれる
    pub async fn run_with<T, E, F, Fut, R>(
        &self,
        label: &str,
        mut op: F,
        mut on_retry: R,
    ) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnMut(u32, Duration, &E),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} attempt {}/{} failed, retrying in {}ms: {}",
                        label,
                        attempt,
                        max_attempts,
                        delay.as_millis(),
                        e
                    );
                    on_retry(attempt, delay, &e);
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!("{} failed after {} attempts: {}", label, attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
