/// External rate limiter consulted before issuance and authentication.
pub trait RateLimiter: Send + Sync {
    /// Whether a request keyed by `key` may proceed.
    fn check(&self, key: &str) -> bool;
}

/// Limiter that admits everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn check(&self, _key: &str) -> bool {
        true
    }
}
