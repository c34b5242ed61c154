// ai
//! 🔄 Retry policy: exponential backoff, a pinch of jitter, and a hard deadline.
//!
//! "Try up to 3 times, sleep 10s between tries" is fine for a setup script.
//! For bulk chunks it means a throttled cluster gets hammered in lockstep and a
//! lambda sleeps straight through its own timeout. So:
//!
//! - `delay(n) = min(initial * multiplier^n, max)`, ±10% jitter when enabled
//! - `max_attempts` caps the attempts (the first try counts)
//! - an optional deadline: if the next sleep would end past it, we stop asking
//!
//! 🧠 Knowledge graph: the indexer builds one [`RetryPolicy`] per invocation, so the
//! lambda can hand it the invocation deadline minus a safety margin.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::debug;

/// 🔧 Retry knobs, straight from config.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RetryConfig {
    /// 🔢 Total attempts, first one included. Must be at least 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// 🎲 Spread retries out so a fleet of lambdas doesn't stampede in sync.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    200
}

// -- 10s. if the cluster needs longer than that between tries, it needs a nap, not a retry.
fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// ⏱️ Backoff before retry number `retry` (0-based), capped, jittered if asked.
    pub fn compute_delay(&self, retry: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.multiplier.powi(retry as i32);
        let capped = base.min(self.max_delay_ms as f64);
        let delay_ms = if self.jitter {
            let jitter_range = capped * 0.1;
            capped - jitter_range + (rand::random::<f64>() * jitter_range * 2.0)
        } else {
            capped
        };
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

/// 🔄 One invocation's worth of retry budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    deadline: Option<Instant>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            deadline: None,
        }
    }

    /// ⏰ Nothing sleeps past this instant.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// 🤔 How long to wait before the next attempt, given `attempts_made` so far.
    /// `None` means give up: attempts are spent, or the nap would outlive the deadline.
    pub fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        if attempts_made >= self.max_attempts() {
            return None;
        }
        let delay = self.config.compute_delay(attempts_made.saturating_sub(1));
        if let Some(deadline) = self.deadline {
            if Instant::now() + delay >= deadline {
                debug!("⏰ next retry would cross the deadline, giving up early");
                return None;
            }
        }
        Some(delay)
    }

    /// 😴 Sleep before the next attempt. Returns `false` when there is no next attempt.
    pub async fn backoff(&self, attempts_made: u32) -> bool {
        match self.next_delay(attempts_made) {
            Some(delay) => {
                debug!("🔄 backing off {:?} before attempt {}", delay, attempts_made + 1);
                tokio::time::sleep(delay).await;
                true
            }
            None => false,
        }
    }
}
