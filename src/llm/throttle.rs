use governor::{ DefaultDirectRateLimiter, Quota, RateLimiter };
use log::debug;
use std::time::Duration;

/// Fixed-interval gate in front of outbound requests: a request may dispatch
/// at most once per `interval`. A zero interval disables the gate.
///
/// This is a throttle, not a queue. Waiters are not ordered and nothing is
/// rejected; callers simply sleep until the next slot opens.
pub struct RequestGate {
    interval: Duration,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl RequestGate {
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval).map(RateLimiter::direct);
        Self { interval, limiter }
    }

    /// Waits until a request may be sent and claims the slot.
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                debug!("Request gate closed, waiting up to {:?}", self.interval);
                limiter.until_ready().await;
            }
        }
    }
}
