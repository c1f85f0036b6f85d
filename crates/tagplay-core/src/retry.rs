//! Exponential backoff with jitter for remote commands

use rand_core::RngCore;

use crate::config;

/// Backoff parameters applied to every remote command.
///
/// `max_attempts` counts every attempt, the first one included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub initial_delay_ms: u32,
    pub max_delay_ms: u32,
    pub multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: config::RETRY_MAX_ATTEMPTS,
            initial_delay_ms: config::RETRY_INITIAL_DELAY_MS,
            max_delay_ms: config::RETRY_MAX_DELAY_MS,
            multiplier: config::RETRY_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits or retries
    pub const fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            multiplier: 1.0,
        }
    }

    /// Delay before retry `retry` (0 based) without jitter:
    /// `clamp(initial * multiplier^retry, initial, max)`
    pub fn base_delay_ms(&self, retry: u8) -> u32 {
        let ceiling = self.max_delay_ms.max(1);
        let floor = self.initial_delay_ms.clamp(1, ceiling);

        let mut delay = floor as f32;
        for _ in 0..retry {
            delay *= self.multiplier;
            if delay >= ceiling as f32 {
                return ceiling;
            }
        }

        (delay as u32).clamp(floor, ceiling)
    }

    /// Base delay adjusted by up to ±25% random jitter, never zero
    pub fn delay_ms<R: RngCore>(&self, retry: u8, rng: &mut R) -> u32 {
        let base = self.base_delay_ms(retry);
        let spread = base / 4;
        if spread == 0 {
            return base.max(1);
        }

        let roll = rng.next_u32();
        let jitter = (roll >> 1) % (spread + 1);
        let delay = if roll & 1 == 0 {
            base + jitter
        } else {
            base - jitter
        };
        delay.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SeqRng;

    #[test]
    fn base_delay_doubles_until_the_cap() {
        let policy = RetryPolicy::default();
        let delays: std::vec::Vec<u32> = (0..6).map(|n| policy.base_delay_ms(n)).collect();
        assert_eq!(delays, [1_000, 2_000, 4_000, 8_000, 10_000, 10_000]);
    }

    #[test]
    fn jittered_delay_stays_within_a_quarter() {
        let policy = RetryPolicy::default();
        let mut rng = SeqRng::new(7);
        for retry in 0..8 {
            let base = policy.base_delay_ms(retry);
            for _ in 0..200 {
                let d = policy.delay_ms(retry, &mut rng);
                assert!(d >= base - base / 4, "{} below range of {}", d, base);
                assert!(d <= base + base / 4, "{} above range of {}", d, base);
                assert!(d <= policy.max_delay_ms + policy.max_delay_ms / 4);
            }
        }
    }

    #[test]
    fn mean_delay_does_not_decrease() {
        let policy = RetryPolicy::default();
        let mut rng = SeqRng::new(99);
        let mut previous = 0u64;
        for retry in 0..6 {
            let total: u64 = (0..2_000)
                .map(|_| policy.delay_ms(retry, &mut rng) as u64)
                .sum();
            let mean = total / 2_000;
            assert!(mean + 500 >= previous, "mean {} after {}", mean, previous);
            previous = mean;
        }
    }

    #[test]
    fn tiny_delays_never_reach_zero() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 0,
            max_delay_ms: 2,
            multiplier: 2.0,
        };
        let mut rng = SeqRng::new(3);
        for retry in 0..5 {
            assert!(policy.delay_ms(retry, &mut rng) >= 1);
        }
    }

    #[test]
    fn degenerate_multiplier_is_clamped() {
        let policy = RetryPolicy {
            multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.base_delay_ms(3), policy.initial_delay_ms);
    }
}
