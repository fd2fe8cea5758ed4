//! 指数バックオフ再試行ロジック。
//!
//! 分類呼び出しの再試行はジッターなしの純粋な指数遅延を用いる。
use std::time::Duration;

/// 再試行戦略の設定。
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// 最大試行回数（初回を含む）
    pub max_attempts: usize,
    /// ベースとなる遅延時間（ミリ秒）
    pub base_delay_ms: u64,
    /// 最大遅延時間（ミリ秒）
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 8000,
        }
    }
}

impl RetryConfig {
    /// 新しい再試行設定を作成する。
    #[must_use]
    pub const fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// 指定された試行回数に対する遅延時間を計算する。
    ///
    /// # Arguments
    /// * `attempt` - 試行回数（0から開始、0は初回で遅延なし）
    ///
    /// # Returns
    /// 待機すべき期間。既定値では 1s, 2s, 4s, … と倍増し上限でキャップされる。
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::from_millis(0);
        }

        // 指数バックオフ: base * 2^(attempt-1)
        let exponent = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
        let multiplier = 1_u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let exponential_delay = self.base_delay_ms.saturating_mul(multiplier);

        // 上限でキャップ
        Duration::from_millis(exponential_delay.min(self.max_delay_ms))
    }

    /// この試行回数が再試行可能かどうかを判定する。
    #[must_use]
    pub const fn can_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_for_attempt_zero_is_zero() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(0));
    }

    #[test]
    fn default_schedule_is_one_then_two_seconds() {
        let config = RetryConfig::default();

        // 失敗した候補の再試行間隔は 1s → 2s
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn delay_for_attempt_respects_max_delay() {
        let config = RetryConfig::new(10, 1000, 5000);

        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(config.delay_for_attempt(10), Duration::from_millis(5000));
    }

    #[test]
    fn delay_does_not_overflow_on_large_attempts() {
        let config = RetryConfig::new(usize::MAX, 1000, 30000);

        assert_eq!(config.delay_for_attempt(200), Duration::from_millis(30000));
    }

    #[test]
    fn can_retry_respects_max_attempts() {
        let config = RetryConfig::new(3, 1000, 8000);

        assert!(config.can_retry(0));
        assert!(config.can_retry(1));
        assert!(config.can_retry(2));
        assert!(!config.can_retry(3));
        assert!(!config.can_retry(4));
    }
}
