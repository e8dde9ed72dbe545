//! 지수 백오프 정책.
//!
//! `delay = min(base * 2^attempt, max) + uniform(0, jitter)`

use std::time::Duration;

use rand::Rng;

use riser_core::BackoffConfig;

/// 재시도 지연 계산기.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// 첫 재시도 지연
    pub base_delay: Duration,
    /// 지수 증가 상한 (지터 제외)
    pub max_delay: Duration,
    /// 지터 범위
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&BackoffConfig::default())
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }
}

impl BackoffPolicy {
    /// 새 정책을 생성합니다.
    pub fn new(base_delay: Duration, max_delay: Duration, jitter: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter,
        }
    }

    /// 지연 없는 정책 (테스트용).
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    /// 지터를 제외한 지연. 오버플로 시 상한으로 고정됩니다.
    pub fn exponential(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let delay_ms = 1u64
            .checked_shl(attempt)
            .and_then(|factor| base_ms.checked_mul(factor))
            .map_or(max_ms, |ms| ms.min(max_ms));

        Duration::from_millis(delay_ms)
    }

    /// `attempt`(0부터) 번째 실패 후의 대기 시간.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    /// 난수 생성기를 지정하여 대기 시간을 계산합니다.
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..jitter_ms)
        };

        self.exponential(attempt) + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_exponential_growth_and_cap() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.exponential(0), Duration::from_millis(1_000));
        assert_eq!(policy.exponential(1), Duration::from_millis(2_000));
        assert_eq!(policy.exponential(3), Duration::from_millis(8_000));
        assert_eq!(policy.exponential(5), Duration::from_millis(30_000));
        // 시프트/곱셈 오버플로도 상한으로
        assert_eq!(policy.exponential(64), Duration::from_millis(30_000));
        assert_eq!(policy.exponential(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_stays_within_window() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);

        for attempt in 0..8 {
            let base = policy.exponential(attempt);
            let delay = policy.delay_with_rng(attempt, &mut rng);
            assert!(delay >= base);
            assert!(delay < base + Duration::from_millis(100));
        }
    }

    #[test]
    fn test_seeded_rng_is_deterministic() {
        let policy = BackoffPolicy::default();
        let a = policy.delay_with_rng(2, &mut StdRng::seed_from_u64(42));
        let b = policy.delay_with_rng(2, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_jitter() {
        let policy = BackoffPolicy::new(
            Duration::from_millis(10),
            Duration::from_millis(50),
            Duration::ZERO,
        );
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(4), Duration::from_millis(50));
        assert_eq!(BackoffPolicy::none().delay(3), Duration::ZERO);
    }
}
