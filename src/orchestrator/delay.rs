//! Randomized pauses between crawl steps

use std::time::Duration;

use rand::Rng;

/// Inclusive range a delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        // An inverted range collapses to `min`.
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn from_secs(min: u64, max: u64) -> Self {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    /// Always zero
    pub fn zero() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Draw a delay uniformly from the range
    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min >= max {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Pauses applied by the orchestration loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    /// After each platform except the last in a round
    pub between_platforms: DelayRange,
    /// After each round except the last
    pub between_rounds: DelayRange,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            between_platforms: DelayRange::from_secs(60, 120),
            between_rounds: DelayRange::from_secs(300, 600),
        }
    }
}

impl DelayPolicy {
    /// No pauses at all
    pub fn none() -> Self {
        Self {
            between_platforms: DelayRange::zero(),
            between_rounds: DelayRange::zero(),
        }
    }
}
