//! Retry delays.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on a single retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// base * 2^(attempt - 1)
    Exponential,
    /// base on every attempt
    Fixed,
}

impl BackoffStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exponential => "exponential",
            Self::Fixed => "fixed",
        }
    }
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exponential" => Ok(Self::Exponential),
            "fixed" => Ok(Self::Fixed),
            other => Err(format!("unknown backoff strategy: {other}")),
        }
    }
}

/// How long a failed job waits before it becomes eligible again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub strategy: BackoffStrategy,
    pub base: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(5))
    }
}

impl BackoffPolicy {
    pub fn exponential(base: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base,
        }
    }

    pub fn fixed(base: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Fixed,
            base,
        }
    }

    /// Delay after the given number of attempts have been made (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base,
            BackoffStrategy::Exponential => {
                let factor = 2_u32.saturating_pow(attempt - 1);
                self.base.saturating_mul(factor)
            }
        };

        delay.min(MAX_BACKOFF)
    }

    pub fn base_ms(&self) -> u64 {
        self.base.as_millis() as u64
    }
}
