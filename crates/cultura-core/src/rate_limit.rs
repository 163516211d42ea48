//! Global token bucket in front of the upstream model.
//!
//! One bucket is shared by every session. Waiting is cancellable through the
//! caller's [`CallContext`]; a cancelled or timed-out wait does not consume a
//! token.

use crate::config::RateLimitConfig;
use crate::context::{CallContext, Interrupted};
use crate::error::{AiError, AiResult};
use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;

pub struct RateLimiter {
    bucket: DefaultDirectRateLimiter,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> AiResult<Self> {
        let burst = NonZeroU32::new(config.burst)
            .ok_or_else(|| AiError::InvalidInput("rate_limit.burst must be at least 1".to_string()))?;
        let quota = Quota::with_period(config.refill_interval())
            .ok_or_else(|| AiError::InvalidInput("rate_limit.refill_interval_ms must be positive".to_string()))?
            .allow_burst(burst);
        Ok(Self {
            bucket: DefaultDirectRateLimiter::direct(quota),
        })
    }

    /// Take a token without waiting.
    pub fn try_acquire(&self) -> bool {
        self.bucket.check().is_ok()
    }

    /// Wait for a token, or fail `ResourceExhausted` if `ctx` is cancelled or
    /// its deadline passes first.
    pub async fn acquire(&self, ctx: &CallContext) -> AiResult<()> {
        match ctx.run(self.bucket.until_ready()).await {
            Ok(()) => Ok(()),
            Err(Interrupted::Cancelled) => Err(AiError::ResourceExhausted(
                "request cancelled while waiting for rate limit".to_string(),
            )),
            Err(Interrupted::DeadlineExceeded) => Err(AiError::ResourceExhausted(
                "rate limit wait exceeded the call deadline".to_string(),
            )),
        }
    }
}
