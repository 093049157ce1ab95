//! Wall-clock budget for a probe run.
//!
//! Backed by the tokio clock so that a paused test runtime can advance it
//! deterministically.

use std::time::Duration;

use tokio::time::Instant;

/// A fixed budget measured from the moment it was created.
///
/// Every retrying component checks the same `Deadline` before it sleeps or
/// retries. The value itself never changes; only the clock moves it.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    /// Start a deadline with the given budget, measured from now.
    pub fn new(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    /// Time elapsed since the deadline started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left before the budget runs out. Never negative.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }

    /// Whether the budget is used up.
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn remaining_is_budget_minus_elapsed() {
        let deadline = Deadline::new(Duration::from_secs(10));
        assert_eq!(deadline.remaining(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(deadline.elapsed(), Duration::from_secs(3));
        assert_eq!(deadline.remaining(), Duration::from_secs(7));
        assert!(!deadline.expired());
    }

    #[tokio::test(start_paused = true)]
    async fn expires_exactly_at_budget() {
        let deadline = Deadline::new(Duration::from_secs(2));
        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(!deadline.expired());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_saturates_after_expiry() {
        let deadline = Deadline::new(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert!(deadline.expired());
        assert_eq!(deadline.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_is_expired_immediately() {
        let deadline = Deadline::new(Duration::ZERO);
        assert!(deadline.expired());
    }
}
