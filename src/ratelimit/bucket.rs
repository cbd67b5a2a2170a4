//! Token bucket runtime state.

use std::time::Instant;

/// Seconds in the rate window a ceiling is expressed over.
const SECS_PER_HOUR: f64 = 3600.0;

/// Per-key token bucket state.
///
/// A bucket starts full, granting the configured ceiling as an immediate burst
/// allowance, and is replenished continuously at `ceiling / 3600` tokens per
/// second up to its capacity. Invariant: `tokens` stays within
/// `[0, capacity]` at every observation point.
#[derive(Debug)]
pub struct TokenBucket {
    /// Current token count
    tokens: f64,
    /// Maximum token count, equal to the rule's hourly ceiling
    capacity: f64,
    /// Tokens replenished per elapsed second
    rate_per_sec: f64,
    /// When the bucket was last refilled
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket for the given hourly ceiling.
    pub fn new(ceiling: i64, now: Instant) -> Self {
        let capacity = ceiling as f64;
        Self {
            tokens: capacity,
            capacity,
            rate_per_sec: capacity / SECS_PER_HOUR,
            last_refill: now,
        }
    }

    /// Recompute capacity and refill rate from the governing rule's ceiling.
    ///
    /// Called on every admission check so a changed ceiling takes effect
    /// without waiting for the bucket to be recreated. The token count itself
    /// is not touched; the next refill clamps it if capacity shrank.
    pub fn set_ceiling(&mut self, ceiling: i64) {
        self.capacity = ceiling as f64;
        self.rate_per_sec = self.capacity / SECS_PER_HOUR;
    }

    /// Add tokens for the time elapsed since the last refill, clamped to
    /// capacity, and advance the refill timestamp.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Consume one token if available.
    ///
    /// Returns `true` and subtracts one token when at least a whole token is
    /// present; otherwise returns `false` and leaves the count untouched.
    pub fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Get the current token count.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}
