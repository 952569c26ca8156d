// ABOUTME: Inactivity watchdog for the Steam session
// ABOUTME: Detects silent partitions (no inbound events for hours) and asks for a forced reconnect

use std::time::Duration;
use tokio::time::Instant;

/// Where the watchdog is in its reconnect cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Session believed healthy
    Idle,
    /// A check found the session stale; the reconnect has not started yet
    ReconnectPending,
    /// Log-off issued and log-on scheduled; waiting for authentication
    Reconnecting,
}

/// Pure state machine; the relay loop owns the timers and feeds it `now`.
#[derive(Debug, Clone)]
pub struct Watchdog {
    state: WatchdogState,
    last_activity: Instant,
    threshold: Duration,
    grace: Duration,
}

impl Watchdog {
    pub fn new(threshold: Duration, grace: Duration, now: Instant) -> Self {
        Self {
            state: WatchdogState::Idle,
            last_activity: now,
            threshold,
            grace,
        }
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Called for every inbound Steam event
    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Periodic evaluation. Returns true when a reconnect should start, in
    /// which case the state is now `ReconnectPending`.
    ///
    /// While `Reconnecting` (no authentication since the last forced
    /// log-on) every check asks for another attempt.
    pub fn check(&mut self, now: Instant) -> bool {
        let silent_for = now.saturating_duration_since(self.last_activity);
        let fire = match self.state {
            WatchdogState::Idle => silent_for > self.threshold,
            WatchdogState::ReconnectPending | WatchdogState::Reconnecting => true,
        };

        if fire {
            tracing::warn!(
                silent_secs = silent_for.as_secs(),
                state = ?self.state,
                "Steam session looks stale, reconnect pending"
            );
            self.state = WatchdogState::ReconnectPending;
        }
        fire
    }

    /// Enter `Reconnecting`. Resets the activity clock so the next check
    /// does not immediately re-trigger, and returns the grace delay to wait
    /// between log-off and log-on.
    pub fn begin_reconnect(&mut self, now: Instant) -> Duration {
        self.last_activity = now;
        self.state = WatchdogState::Reconnecting;
        self.grace
    }

    /// Successful authentication closes the reconnect cycle
    pub fn on_authenticated(&mut self) {
        self.state = WatchdogState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_fresh_watchdog_is_idle() {
        let now = Instant::now();
        let watchdog = Watchdog::new(3 * HOUR, Duration::from_secs(5), now);
        assert_eq!(watchdog.state(), WatchdogState::Idle);
        assert_eq!(watchdog.last_activity(), now);
    }

    #[test]
    fn test_exactly_threshold_does_not_fire() {
        let t0 = Instant::now();
        let mut watchdog = Watchdog::new(3 * HOUR, Duration::from_secs(5), t0);
        assert!(!watchdog.check(t0 + 3 * HOUR));
        assert_eq!(watchdog.state(), WatchdogState::Idle);
    }

    #[test]
    fn test_begin_reconnect_resets_clock_and_returns_grace() {
        let t0 = Instant::now();
        let mut watchdog = Watchdog::new(3 * HOUR, Duration::from_secs(5), t0);
        let later = t0 + 4 * HOUR;
        assert!(watchdog.check(later));
        assert_eq!(watchdog.state(), WatchdogState::ReconnectPending);

        assert_eq!(watchdog.begin_reconnect(later), Duration::from_secs(5));
        assert_eq!(watchdog.state(), WatchdogState::Reconnecting);
        assert_eq!(watchdog.last_activity(), later);
    }

    #[test]
    fn test_authentication_returns_to_idle() {
        let t0 = Instant::now();
        let mut watchdog = Watchdog::new(3 * HOUR, Duration::from_secs(5), t0);
        watchdog.check(t0 + 4 * HOUR);
        watchdog.begin_reconnect(t0 + 4 * HOUR);
        watchdog.on_authenticated();
        assert_eq!(watchdog.state(), WatchdogState::Idle);
        // Fresh clock: five minutes later nothing fires
        assert!(!watchdog.check(t0 + 4 * HOUR + Duration::from_secs(300)));
    }
}
