use std::time::Duration;

/// Trait for defining reconnection strategies
///
/// Implement this trait to control how long the client waits between
/// reconnection attempts and when it gives up.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before reconnection attempt number `attempt` (1-indexed)
    fn delay(&self, attempt: usize) -> Duration;

    /// Check if we should continue reconnecting
    ///
    /// # Arguments
    /// * `attempts_made` - Reconnection attempts already scheduled since the
    ///   last successful connection
    fn should_reconnect(&self, attempts_made: usize) -> bool;

    /// Get the delay before the next reconnection attempt
    ///
    /// # Returns
    /// * `Some(duration)` - Wait this long before reconnecting
    /// * `None` - Stop reconnecting
    fn next_delay(&self, attempts_made: usize) -> Option<Duration> {
        if !self.should_reconnect(attempts_made) {
            return None;
        }
        Some(self.delay(attempts_made + 1))
    }
}

/// Exponential backoff reconnection strategy
///
/// Delays between reconnection attempts grow exponentially:
/// base_delay * 2^attempt, capped at max_delay. With a one second base the
/// first retry waits two seconds.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<usize>,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff strategy
    ///
    /// # Arguments
    /// * `base_delay` - Delay unit that is doubled per attempt
    /// * `max_delay` - The maximum delay between reconnects
    /// * `max_attempts` - Maximum number of attempts (None = unlimited)
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }
}

impl Default for ExponentialBackoff {
    /// 1s base, 30s cap, 10 attempts
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), Some(10))
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn delay(&self, attempt: usize) -> Duration {
        let max_ms = self.max_delay.as_millis() as u64;
        let factor = u32::try_from(attempt)
            .ok()
            .and_then(|exp| 2u64.checked_pow(exp))
            .unwrap_or(u64::MAX);
        let delay = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay.min(max_ms))
    }

    fn should_reconnect(&self, attempts_made: usize) -> bool {
        self.max_attempts.map_or(true, |max| attempts_made < max)
    }
}

/// What the policy decided after a connection failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Auto-reconnect is switched off
    Disabled,
    /// Retry after `delay`; `attempt` is the 1-indexed attempt number
    Retry { attempt: usize, delay: Duration },
    /// The strategy is exhausted
    GiveUp { attempts: usize },
}

/// Reconnect bookkeeping owned by the connection state machine
///
/// Holds the enabled flag and the attempt counter; the strategy decides
/// the delays.
pub struct ReconnectPolicy {
    enabled: bool,
    attempt: usize,
    strategy: Box<dyn ReconnectionStrategy>,
}

impl ReconnectPolicy {
    pub fn new(strategy: Box<dyn ReconnectionStrategy>, enabled: bool) -> Self {
        Self {
            enabled,
            attempt: 0,
            strategy,
        }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Attempts scheduled since the last successful connection
    #[inline]
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Called on every successful connection and on explicit reset
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Decide what to do after a failure, incrementing the attempt counter
    /// when a retry is scheduled.
    pub fn on_failure(&mut self) -> ReconnectDecision {
        if !self.enabled {
            return ReconnectDecision::Disabled;
        }

        match self.strategy.next_delay(self.attempt) {
            Some(delay) => {
                self.attempt += 1;
                ReconnectDecision::Retry {
                    attempt: self.attempt,
                    delay,
                }
            }
            None => ReconnectDecision::GiveUp {
                attempts: self.attempt,
            },
        }
    }
}

impl std::fmt::Debug for ReconnectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectPolicy")
            .field("enabled", &self.enabled)
            .field("attempt", &self.attempt)
            .finish()
    }
}
