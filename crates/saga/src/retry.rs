//! Exponential backoff for failed handler invocations.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use common::RandomSource;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Base delay for first retry (before jitter).
    pub base_delay: Duration,
    /// Maximum delay cap (before jitter).
    pub max_delay: Duration,
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay is scaled by a random factor in `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_retries: 3,
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// Gives up after the first failure.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn builder(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_retries as usize)
    }

    /// Delays before each retry, one per allowed retry.
    ///
    /// `base * 2^n` capped at `max_delay`, then jittered with the injected
    /// random source instead of backon's own jitter, so a seeded run is
    /// reproducible.
    pub fn backoff<'a>(&self, random: &'a dyn RandomSource) -> impl Iterator<Item = Duration> + 'a {
        let jitter = self.jitter;
        self.builder()
            .build()
            .map(move |delay| jittered(delay, jitter, random))
    }
}

fn jittered(delay: Duration, jitter: f64, random: &dyn RandomSource) -> Duration {
    if jitter <= 0.0 {
        return delay;
    }
    // -1.0 to 1.0
    let jitter_pct = f64::from(random.next_below(1001)) / 500.0 - 1.0;
    let millis = delay.as_secs_f64() * 1000.0 * (1.0 + jitter_pct * jitter);
    Duration::from_millis(millis.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{ScriptedRandom, SeededRandom};

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        }
    }

    // backon scales delays in f32, so compare whole milliseconds.
    fn millis(delays: impl Iterator<Item = Duration>) -> Vec<u64> {
        delays
            .map(|d| (d.as_secs_f64() * 1000.0).round() as u64)
            .collect()
    }

    #[test]
    fn delay_doubles_per_retry() {
        let random = SeededRandom::new(1);
        assert_eq!(millis(no_jitter().backoff(&random)), vec![100, 200, 400]);
    }

    #[test]
    fn delay_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            ..no_jitter()
        };
        let random = SeededRandom::new(1);
        let delays = millis(config.backoff(&random));
        assert_eq!(delays.len(), 10);
        assert_eq!(delays[5], 3200);
        assert_eq!(&delays[6..], &[5000; 4]);
    }

    #[test]
    fn jitter_bounds() {
        let config = RetryConfig::default();
        // 0 maps to -25%, 1000 maps to +25%, 500 to no change.
        let first = |value| config.backoff(&ScriptedRandom::constant(value)).next();
        assert_eq!(first(0), Some(Duration::from_millis(75)));
        assert_eq!(first(1000), Some(Duration::from_millis(125)));
        assert_eq!(first(500), Some(Duration::from_millis(100)));
    }

    #[test]
    fn retry_count_respects_limit() {
        let random = SeededRandom::new(1);
        assert_eq!(RetryConfig::default().backoff(&random).count(), 3);
        assert_eq!(RetryConfig::no_retries().backoff(&random).next(), None);
    }
}
