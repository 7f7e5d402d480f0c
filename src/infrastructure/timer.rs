use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Reconnect bookkeeping with exponential backoff and jitter.
///
/// `delay = min(base * 2^min(attempts, max_exponent), max_delay) + jitter`, where
/// `base` is the initial delay before the first retry and the regular delay after.
#[derive(Debug, Clone)]
pub struct ReconnectBudget {
    attempts: u32,
    max_attempts: u32,
    initial_delay: Duration,
    base_delay: Duration,
    max_exponent: u32,
    max_delay: Duration,
    max_jitter: Duration,
    last_attempt_at: Option<Instant>,
}

impl ReconnectBudget {
    pub fn new(max_attempts: u32, initial_delay: Duration, base_delay: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            initial_delay,
            base_delay,
            max_exponent: 6,
            max_delay: base_delay.saturating_mul(1 << 6),
            max_jitter: Duration::ZERO,
            last_attempt_at: None,
        }
    }

    pub fn with_cap(mut self, max_exponent: u32, max_delay: Duration) -> Self {
        // Beyond 2^31 the shift would overflow u32
        self.max_exponent = max_exponent.min(31);
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Backoff for the current attempt count, without jitter
    pub fn base_delay(&self) -> Duration {
        let base = if self.attempts == 0 {
            self.initial_delay
        } else {
            self.base_delay
        };
        let exponent = self.attempts.min(self.max_exponent);
        base.saturating_mul(1u32 << exponent).min(self.max_delay)
    }

    /// Delay before the next scheduled attempt
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..jitter_ms)
        };
        self.base_delay() + Duration::from_millis(jitter)
    }

    /// Counts a scheduled attempt as spent. Returns the new count.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Zeroes the attempt count (successful connect).
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Zeroes the attempt count and forgets the last connect attempt, so the
    /// next `connect` is not throttled.
    pub fn reset_all(&mut self) {
        self.attempts = 0;
        self.last_attempt_at = None;
    }

    /// Whether a connect attempt at `now` falls inside `window` of the previous one.
    pub fn is_throttled(&self, now: Instant, window: Duration) -> bool {
        self.last_attempt_at
            .is_some_and(|last| now.saturating_duration_since(last) < window)
    }

    pub fn mark_attempt_started(&mut self, now: Instant) {
        self.last_attempt_at = Some(now);
    }
}
