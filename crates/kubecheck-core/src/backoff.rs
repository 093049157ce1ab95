//! Exponential backoff between retry attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lower and upper bound of the backoff sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First delay handed out.
    #[serde(with = "crate::config::secs_f64")]
    pub min: Duration,
    /// Cap on every delay.
    #[serde(with = "crate::config::secs_f64")]
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

/// Produces a doubling delay sequence: `min, 2·min, 4·min, …` capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Create a backoff from explicit bounds. `max` below `min` is raised to `min`.
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.min, config.max)
    }

    /// Next delay in the sequence.
    pub fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Delay the next call to [`Backoff::next`] would return, without advancing.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Restart the sequence at `min`.
    pub fn reset(&mut self) {
        self.current = self.min;
    }

    /// Sleep for the next delay, but never longer than `remaining`.
    ///
    /// Returns how long it actually slept.
    pub async fn sleep(&mut self, remaining: Duration) -> Duration {
        let delay = self.next().min(remaining);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_min() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(backoff.next(), Duration::from_secs(1));
        assert_eq!(backoff.next(), Duration::from_secs(2));
        assert_eq!(backoff.next(), Duration::from_secs(4));
        assert_eq!(backoff.next(), Duration::from_secs(8));
    }

    #[test]
    fn caps_at_max_then_stays_constant() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));
        let delays: Vec<_> = (0..10).map(|_| backoff.next()).collect();

        // 1 → 2 → 4 → 8 → 16 → 32 → 60 → 60 → 60 → 60
        assert_eq!(delays[6], Duration::from_secs(60));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(60)));
        assert!(delays[6..].iter().all(|d| *d == Duration::from_secs(60)));
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        backoff.next();
        backoff.next();
        assert_eq!(backoff.peek(), Duration::from_millis(400));

        backoff.reset();
        assert_eq!(backoff.next(), Duration::from_millis(100));
    }

    #[test]
    fn max_below_min_is_raised() {
        let mut backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.next(), Duration::from_secs(5));
        assert_eq!(backoff.next(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_never_exceeds_remaining_budget() {
        let mut backoff = Backoff::new(Duration::from_secs(4), Duration::from_secs(8));
        let start = tokio::time::Instant::now();

        let slept = backoff.sleep(Duration::from_secs(1)).await;
        assert_eq!(slept, Duration::from_secs(1));
        assert_eq!(start.elapsed(), Duration::from_secs(1));

        // The sequence still advanced.
        assert_eq!(backoff.peek(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_with_no_budget_returns_immediately() {
        let mut backoff = Backoff::default();
        let start = tokio::time::Instant::now();
        assert_eq!(backoff.sleep(Duration::ZERO).await, Duration::ZERO);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
