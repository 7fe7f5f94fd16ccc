//! Shared outbound budget for batch transmission
//!
//! Every channel's sender draws from one [`OutboundBudget`] before a request
//! leaves the process, so the combined traffic of all channels stays under a
//! request rate and a byte rate.
//!
//! ## Architecture
//!
//! - [`TokenBucket`]: token bucket with fractional refill and adaptive
//!   capacity (halved on throttle, recovered gradually on success)
//! - [`OutboundBudget`]: one request bucket and one byte bucket behind a fair
//!   async mutex, so waiting senders are served in arrival order
//!
//! ## Usage
//!
//! ```rust,no_run
//! use avalanche_ingestion::rate_limit::OutboundBudget;
//! use avalanche_core::config::RateLimitingConfig;
//!
//! # async fn example() {
//! let budget = OutboundBudget::from(&RateLimitingConfig::default());
//! budget.acquire(2_048).await;
//! // ... send the request ...
//! budget.on_success();
//! # }
//! ```

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use avalanche_core::config::RateLimitingConfig;

/// Consecutive successes needed before capacity grows again
const RECOVERY_INTERVAL: u64 = 100;

/// Shortest sleep while waiting for a refill
const MIN_WAIT: Duration = Duration::from_millis(10);

// ============================================================================
// TokenBucket
// ============================================================================

#[derive(Debug)]
struct BucketState {
    /// Available tokens (fractional for smooth refill)
    tokens: f64,
    last_refill: Instant,
    /// Capacity after throttle adjustments
    effective_capacity: u64,
    /// Consecutive successes since the last throttle
    successes: u64,
}

/// Token bucket with adaptive capacity
///
/// Starts full. Amounts larger than the effective capacity are clamped to it
/// so an oversized request waits for a full bucket instead of forever.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u64,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a bucket holding up to `capacity` tokens, refilled at
    /// `refill_rate` tokens per second
    pub fn new(capacity: u64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
                effective_capacity: capacity,
                successes: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // State stays consistent across a panic in another holder
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn refill(state: &mut BucketState, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens =
                (state.tokens + elapsed * refill_rate).min(state.effective_capacity as f64);
            state.last_refill = now;
        }
    }

    fn clamp(state: &BucketState, amount: u64) -> f64 {
        amount.min(state.effective_capacity) as f64
    }

    /// Takes `amount` tokens if available; otherwise leaves the bucket untouched
    pub fn try_acquire(&self, amount: u64) -> bool {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);

        let needed = Self::clamp(&state, amount);
        if state.tokens >= needed {
            state.tokens -= needed;
            true
        } else {
            false
        }
    }

    /// Time until `amount` tokens are available (zero if they already are)
    pub fn time_until_available(&self, amount: u64) -> Duration {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);

        let deficit = Self::clamp(&state, amount) - state.tokens;
        if deficit <= 0.0 {
            Duration::ZERO
        } else if self.refill_rate > 0.0 {
            Duration::from_secs_f64(deficit / self.refill_rate)
        } else {
            Duration::MAX
        }
    }

    /// Waits until `amount` tokens could be taken, then takes them
    pub async fn acquire(&self, amount: u64) {
        loop {
            if self.try_acquire(amount) {
                return;
            }
            let wait = self.time_until_available(amount).max(MIN_WAIT);
            debug!(amount, wait_ms = wait.as_millis() as u64, "Waiting for refill");
            tokio::time::sleep(wait).await;
        }
    }

    pub fn available_tokens(&self) -> f64 {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);
        state.tokens
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn effective_capacity(&self) -> u64 {
        self.lock().effective_capacity
    }

    /// Records a success; every 100 in a row grows capacity by 5%
    pub fn on_success(&self) {
        let mut state = self.lock();
        state.successes += 1;

        if state.successes % RECOVERY_INTERVAL == 0 && state.effective_capacity < self.capacity {
            let increase = ((state.effective_capacity as f64 * 0.05) as u64).max(1);
            let new_cap = (state.effective_capacity + increase).min(self.capacity);
            debug!(
                old_capacity = state.effective_capacity,
                new_capacity = new_cap,
                successes = state.successes,
                "Adaptive recovery: increasing bucket capacity"
            );
            state.effective_capacity = new_cap;
        }
    }

    /// Records a throttle response; halves capacity (minimum 1)
    pub fn on_throttle(&self) {
        let mut state = self.lock();
        let old = state.effective_capacity;
        state.effective_capacity = (old / 2).max(1);
        state.tokens = state.tokens.min(state.effective_capacity as f64);
        state.successes = 0;
        warn!(
            old_capacity = old,
            new_capacity = state.effective_capacity,
            "Throttle detected: reducing bucket capacity by 50%"
        );
    }
}

// ============================================================================
// OutboundBudget
// ============================================================================

/// Request and byte budget shared by every channel
///
/// Acquisition holds a `tokio::sync::Mutex`, whose waiters are woken in
/// FIFO order; a throttled sender waits for its turn instead of failing.
#[derive(Debug)]
pub struct OutboundBudget {
    requests: TokenBucket,
    bytes: TokenBucket,
    turn: tokio::sync::Mutex<()>,
}

impl OutboundBudget {
    pub fn new(requests_per_second: f64, request_burst: u32, bytes_per_second: u64, byte_burst: u64) -> Self {
        Self {
            requests: TokenBucket::new(u64::from(request_burst), requests_per_second),
            bytes: TokenBucket::new(byte_burst, bytes_per_second as f64),
            turn: tokio::sync::Mutex::new(()),
        }
    }

    /// Waits until one request of `bytes` bytes fits in the budget, then spends it
    pub async fn acquire(&self, bytes: u64) {
        let _turn = self.turn.lock().await;
        self.requests.acquire(1).await;
        self.bytes.acquire(bytes).await;
    }

    pub fn on_success(&self) {
        self.requests.on_success();
    }

    pub fn on_throttle(&self) {
        self.requests.on_throttle();
    }

    pub fn requests(&self) -> &TokenBucket {
        &self.requests
    }

    pub fn bytes(&self) -> &TokenBucket {
        &self.bytes
    }
}

impl From<&RateLimitingConfig> for OutboundBudget {
    fn from(config: &RateLimitingConfig) -> Self {
        Self::new(
            config.requests_per_second,
            config.request_burst,
            config.bytes_per_second,
            config.byte_burst,
        )
    }
}

// ============================================================================
// Retry-After header parsing
// ============================================================================

/// Longest Retry-After honoured
pub const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Parses a Retry-After header value
///
/// Accepts delay-seconds (`"30"`) or an HTTP-date. Delay-seconds are capped
/// at one hour; a date is ignored when it is unparseable, in the past, or
/// more than an hour away.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        if seconds > MAX_RETRY_AFTER_SECS {
            debug!(seconds, "Capping Retry-After");
        }
        return Some(Duration::from_secs(seconds.min(MAX_RETRY_AFTER_SECS)));
    }

    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let secs = (date.with_timezone(&chrono::Utc) - chrono::Utc::now()).num_seconds();
    match u64::try_from(secs) {
        Ok(secs) if secs > 0 && secs <= MAX_RETRY_AFTER_SECS => Some(Duration::from_secs(secs)),
        _ => {
            warn!(value, "Ignoring unusable Retry-After header");
            None
        }
    }
}
