//! Per-Caller Request Rate Limiter
//!
//! Backs the `request_rate_limiter` route filter. Each filter instance owns
//! one keyed GCRA limiter, so limits are per route and per caller.
//!
//! # Keys
//!
//! - Authenticated requests are keyed by the token subject (`sub:<id>`)
//! - Anonymous requests fall back to the client IP (`ip:<addr>`)
//!
//! State is in-memory only; every gateway instance enforces its own quota.

use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Keys tracked before stale entries are pruned
const MAX_TRACKED_KEYS: usize = 10_000;

/// Rate limit error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitError {
    pub message: String,
    pub retry_after_secs: u64,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RateLimitError {}

type KeyedLimiter = GovernorRateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Token bucket per caller key
#[derive(Clone)]
pub struct CallerRateLimiter {
    limiter: Arc<KeyedLimiter>,
    replenish_per_second: u32,
    burst: u32,
}

impl CallerRateLimiter {
    /// Create a limiter that refills `replenish_per_second` tokens per second
    /// up to `burst`
    pub fn new(replenish_per_second: u32, burst: u32) -> shared::Result<Self> {
        let rate = NonZeroU32::new(replenish_per_second).ok_or_else(|| {
            shared::Error::config("request_rate_limiter replenish_per_second must be > 0")
        })?;
        let burst_size = NonZeroU32::new(burst)
            .ok_or_else(|| shared::Error::config("request_rate_limiter burst must be > 0"))?;

        let quota = Quota::per_second(rate).allow_burst(burst_size);

        Ok(Self {
            limiter: Arc::new(GovernorRateLimiter::keyed(quota)),
            replenish_per_second,
            burst,
        })
    }

    /// Consume one token for `key`
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Request is allowed
    /// * `Err(RateLimitError)` - Bucket is empty; `retry_after_secs` is at least 1
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        if self.limiter.len() > MAX_TRACKED_KEYS {
            self.cleanup_stale_keys();
        }

        match self.limiter.check_key(&key.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                let retry_after_secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
                let retry_after_secs = retry_after_secs.max(1);

                tracing::warn!(
                    key = key,
                    retry_after_secs = retry_after_secs,
                    "Request rate limit exceeded"
                );

                Err(RateLimitError {
                    message: "Too many requests. Please try again later.".to_string(),
                    retry_after_secs,
                })
            }
        }
    }

    /// Drop keys whose buckets are full again
    pub fn cleanup_stale_keys(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();

        tracing::debug!(
            removed = before.saturating_sub(self.limiter.len()),
            remaining = self.limiter.len(),
            "Cleaned up stale rate limiter keys"
        );
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }
}

impl std::fmt::Debug for CallerRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallerRateLimiter")
            .field("replenish_per_second", &self.replenish_per_second)
            .field("burst", &self.burst)
            .finish()
    }
}

/// Limiter key for a caller
pub fn caller_key(subject: Option<&str>, client_ip: Option<&str>) -> String {
    match (subject, client_ip) {
        (Some(sub), _) => format!("sub:{}", sub),
        (None, Some(ip)) => format!("ip:{}", ip),
        (None, None) => "anonymous".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_rejected() {
        assert!(CallerRateLimiter::new(0, 10).is_err());
        assert!(CallerRateLimiter::new(10, 0).is_err());
    }

    #[test]
    fn test_burst_then_reject() {
        let limiter = CallerRateLimiter::new(1, 2).unwrap();

        assert!(limiter.check("sub:alice").is_ok());
        assert!(limiter.check("sub:alice").is_ok());

        let err = limiter.check("sub:alice").unwrap_err();
        assert!(err.retry_after_secs >= 1);
        assert!(err.message.contains("Too many requests"));
    }

    #[test]
    fn test_keys_independent() {
        let limiter = CallerRateLimiter::new(1, 1).unwrap();

        assert!(limiter.check("sub:alice").is_ok());
        assert!(limiter.check("sub:alice").is_err());
        assert!(limiter.check("sub:bob").is_ok());
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn test_clone_shares_state() {
        let limiter1 = CallerRateLimiter::new(1, 1).unwrap();
        let limiter2 = limiter1.clone();

        assert!(limiter1.check("ip:10.0.0.1").is_ok());
        assert!(limiter2.check("ip:10.0.0.1").is_err());
    }

    #[test]
    fn test_caller_key() {
        assert_eq!(caller_key(Some("u-1"), Some("10.0.0.1")), "sub:u-1");
        assert_eq!(caller_key(None, Some("10.0.0.1")), "ip:10.0.0.1");
        assert_eq!(caller_key(None, None), "anonymous");
    }
}
