//! Retry decisions for optimistic stock writes.

use std::time::Duration;

use rand::Rng;

/// How long to keep retrying a lost compare-and-swap, and how long to wait
/// between tries.
///
/// Attempts are counted from 1. Delays grow geometrically from
/// `base_delay`, are capped at `max_delay`, and with `jitter` on are drawn
/// uniformly from the upper half of that value so competing writers drift
/// apart.
///
/// # Default Values
///
/// - `max_attempts`: 5
/// - `base_delay`: 5ms
/// - `max_delay`: 100ms
/// - `multiplier`: 2.0
/// - `jitter`: on
/// - `max_release_attempts`: 50
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictPolicy {
    /// Attempts allowed for a reservation before giving up.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Randomize delays.
    pub jitter: bool,
    /// Attempts allowed for a compensating release before it is reported
    /// as an incident.
    pub max_release_attempts: u32,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConflictPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> ConflictPolicyBuilder {
        ConflictPolicyBuilder {
            max_attempts: 5,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: true,
            max_release_attempts: 50,
        }
    }

    /// Whether another reservation attempt may follow attempt number `attempt`.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Whether another release attempt may follow attempt number `attempt`.
    #[must_use]
    pub fn should_retry_release(&self, attempt: u32) -> bool {
        attempt < self.max_release_attempts
    }

    /// Delay to wait after failed attempt number `attempt`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let ceiling_us = ceiling.as_micros() as u64;
        let jittered = rand::thread_rng().gen_range(ceiling_us / 2..=ceiling_us);
        Duration::from_micros(jittered)
    }

    /// Un-jittered delay for `attempt`, capped at `max_delay`.
    fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay_us = self.base_delay.as_micros() as f64 * self.multiplier.powi(exponent);
        if delay_us >= self.max_delay.as_micros() as f64 {
            self.max_delay
        } else {
            Duration::from_micros(delay_us as u64)
        }
    }
}

/// Builder for [`ConflictPolicy`].
#[derive(Debug, Clone)]
pub struct ConflictPolicyBuilder {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    max_release_attempts: u32,
}

impl ConflictPolicyBuilder {
    /// Set the number of reservation attempts (at least 1).
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the delay after the first failed attempt.
    #[must_use]
    pub const fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the cap on any single delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor between delays.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Turn delay randomization on or off.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the number of release attempts before reporting an incident.
    #[must_use]
    pub const fn max_release_attempts(mut self, attempts: u32) -> Self {
        self.max_release_attempts = attempts;
        self
    }

    /// Build the [`ConflictPolicy`].
    #[must_use]
    pub fn build(self) -> ConflictPolicy {
        ConflictPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: self.base_delay,
            max_delay: self.max_delay.max(self.base_delay),
            multiplier: self.multiplier.max(1.0),
            jitter: self.jitter,
            max_release_attempts: self.max_release_attempts.max(1),
        }
    }
}
