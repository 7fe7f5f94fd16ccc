//! Exponential backoff with jitter

use std::time::Duration;

use avalanche_core::config::ChannelSettings;

/// Longest server hint honoured when it exceeds the policy's own cap
pub const MAX_HINT: Duration = Duration::from_secs(3600);

/// Delay schedule applied after retryable send failures
///
/// Attempt `n` (1-based) waits `base * 2^(n-1)`, capped at `max`, then
/// spread by `±jitter_factor / 2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub jitter_factor: f64,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, jitter_factor: f64) -> Self {
        Self {
            base,
            max,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Delay for `attempt` before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Jittered delay for `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.base_delay(attempt).as_secs_f64() * 1000.0;
        let jitter = delay_ms * self.jitter_factor * (rand::random::<f64>() - 0.5);
        Duration::from_secs_f64((delay_ms + jitter).max(0.0) / 1000.0)
    }

    /// Jittered delay, stretched to a server-provided hint when that is longer
    ///
    /// The hint is capped at `max(self.max, MAX_HINT)`.
    pub fn delay_with_hint(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let delay = self.delay(attempt);
        let ceiling = self.max.max(MAX_HINT);
        hint.map_or(delay, |hint| hint.min(ceiling).max(delay))
    }
}

impl From<&ChannelSettings> for BackoffPolicy {
    fn from(settings: &ChannelSettings) -> Self {
        Self::new(
            settings.backoff_base,
            settings.backoff_max,
            settings.jitter_factor,
        )
    }
}
