use rand::Rng;
use std::time::Duration;

/// Jittered exponential backoff that gives up after a number of consecutive
/// attempts.
#[derive(Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    max_attempts: u32,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    /// Creates a new `Backoff`. `max_attempts == 0` retries forever.
    ///
    /// # Examples
    ///
    /// ```
    /// use hexglobal_client::backoff::Backoff;
    /// use std::time::Duration;
    /// let mut backoff = Backoff::new(
    ///     Duration::from_millis(100),
    ///     Duration::from_millis(5000),
    ///     2.0,
    ///     3,
    /// );
    /// let delay = backoff.next_delay().unwrap();
    /// assert!(delay >= Duration::from_millis(75)); // 100ms * 0.75 jitter
    /// assert!(delay <= Duration::from_millis(125)); // 100ms * 1.25 jitter
    /// ```
    #[must_use]
    pub const fn new(initial: Duration, max: Duration, factor: f64, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            factor,
            max_attempts,
            current: initial,
            attempts: 0,
        }
    }

    /// Consecutive attempts handed out since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    /// Compute the next delay (with jitter) and advance the internal state, or
    /// `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts > 0 && self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;

        let current_ms = self.current.as_millis().min(u128::from(u64::MAX)) as u64;
        let jitter_factor = rand::thread_rng().gen_range(0.75..=1.25);
        let delay = Duration::from_millis((current_ms as f64 * jitter_factor) as u64);

        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let next_ms = ((current_ms as f64 * self.factor) as u64).min(max_ms);
        self.current = Duration::from_millis(next_ms);

        Some(delay)
    }

    /// Restore the initial delay and the full attempt budget.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }
}
