// ABOUTME: Exponential backoff for adapter transports (IRC socket, Steam sidecar process)
// ABOUTME: Delays run 2s, 4s, 8s... capped at 60s and reset after a healthy session

use std::time::Duration;

/// Backoff settings for re-establishing an adapter transport
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    /// A session that lasted at least this long counts as healthy and
    /// resets the delay on its next failure
    pub healthy_after: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            multiplier: 2,
            healthy_after: Duration::from_secs(60),
        }
    }
}

/// Retry delay tracker. Adapters retry forever; only shutdown stops them.
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempts: u32,
    next_delay: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        let next_delay = policy.initial_delay;
        Self {
            policy,
            attempts: 0,
            next_delay,
        }
    }

    /// Forget earlier failures
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.next_delay = self.policy.initial_delay;
    }

    /// Record a lost session and return how long to wait before retrying.
    ///
    /// `uptime` is how long the session lasted; a healthy session resets
    /// the sequence so a one-off drop is retried quickly.
    pub fn on_failure(&mut self, uptime: Duration) -> Duration {
        if uptime >= self.policy.healthy_after {
            self.reset();
        }
        self.attempts += 1;

        let delay = self.next_delay;
        self.next_delay = std::cmp::min(
            self.next_delay.saturating_mul(self.policy.multiplier),
            self.policy.max_delay,
        );
        delay
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
