//! Backoff schedules
//!
//! A [`RetryPolicy`] is an ordered list of waits. Attempt `n` waits
//! `delays[min(n, len - 1)]`, so once the list is exhausted the last wait
//! repeats for as long as the caller keeps retrying.

use std::time::Duration;

use crate::{RestakerError, Result};

/// Ordered backoff durations, clamped to the last entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Result<Self> {
        if delays.is_empty() {
            return Err(RestakerError::Config(config::ConfigError::Message(
                "retry policy must contain at least one delay".into(),
            )));
        }
        Ok(Self { delays })
    }

    pub fn from_secs(secs: &[u64]) -> Result<Self> {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// Outer decision loop backoff
    pub fn default_outer() -> Self {
        let secs = [5, 5, 60, 60, 60, 60, 60, 300, 300, 600, 3600, 21600, 43200];
        Self {
            delays: secs.into_iter().map(Duration::from_secs).collect(),
        }
    }

    /// Receipt polling: five short polls, five medium, five long, then a fixed long interval
    pub fn default_receipt_poll() -> Self {
        let delays = std::iter::repeat(Duration::from_secs(3))
            .take(5)
            .chain(std::iter::repeat(Duration::from_secs(10)).take(5))
            .chain(std::iter::repeat(Duration::from_secs(60)).take(5))
            .chain(std::iter::once(Duration::from_secs(300)))
            .collect();
        Self { delays }
    }

    /// Wait before attempt `attempt` (0-based)
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let idx = attempt.min(self.delays.len() - 1);
        self.delays[idx]
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    /// Endless sequence of waits following the policy
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..).map(move |attempt| self.delay_for(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_outer()
    }
}
