use std::time;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// The retry policy sources use to decide how long to wait before trying again. There is no limit
/// on attempts: callers retry until they succeed.
pub struct RetryPolicy {
    /// Coefficient to multiply initial_interval with for every past attempt.
    backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    initial_interval: time::Duration,
    /// The maximum possible backoff between retries.
    maximum_interval: Option<time::Duration>,
}

impl RetryPolicy {
    pub fn new(
        backoff_coefficient: u32,
        initial_interval: time::Duration,
        maximum_interval: Option<time::Duration>,
    ) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            maximum_interval,
        }
    }

    /// Always wait the same `delay` between attempts.
    pub fn fixed(delay: time::Duration) -> Self {
        Self::new(1, delay, None)
    }

    /// Calculate the time until the next retry after `attempt` failed attempts.
    pub fn time_until_next_retry(&self, attempt: u32) -> time::Duration {
        let candidate_interval = self
            .initial_interval
            .saturating_mul(self.backoff_coefficient.saturating_pow(attempt));

        match self.maximum_interval {
            Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
            None => candidate_interval,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(time::Duration::from_secs(5))
    }
}
