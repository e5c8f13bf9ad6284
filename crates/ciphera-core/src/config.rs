//! Configuration consumed by the revocation core.
//!
//! All durations are encoded as integer milliseconds when (de)serialized, so a
//! JSON config looks like:
//!
//! ```json
//! { "propagation_deadline": 60000, "reconciliation_interval": 30000 }
//! ```
//!
//! Missing fields take the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Config file is not valid JSON for [`CoreConfig`].
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    /// A value violates a protocol constraint.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Delays between successive push attempts.
///
/// `n` delays allow `n + 1` attempts: the first attempt is immediate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackoffSchedule(#[serde(with = "crate::serde_duration::vec")] Vec<Duration>);

impl BackoffSchedule {
    /// Builds a schedule from explicit delays.
    pub fn new(delays: Vec<Duration>) -> Self {
        Self(delays)
    }

    /// `retries` doubling delays starting at `initial`, each clamped to `max`.
    pub fn exponential(initial: Duration, max: Duration, retries: usize) -> Self {
        let mut delays = Vec::with_capacity(retries);
        let mut next = initial;
        for _ in 0..retries {
            delays.push(next.min(max));
            next = next.saturating_mul(2);
        }
        Self(delays)
    }

    /// Maximum number of push attempts.
    pub fn max_attempts(&self) -> usize {
        self.0.len() + 1
    }

    /// Delay to wait after failed attempt `attempt` (0-based), if another is allowed.
    pub fn delay_after(&self, attempt: usize) -> Option<Duration> {
        self.0.get(attempt).copied()
    }

    /// Sum of all delays.
    pub fn total(&self) -> Duration {
        self.0.iter().copied().sum()
    }

    /// Borrows the delays.
    pub fn delays(&self) -> &[Duration] {
        &self.0
    }
}

impl Default for BackoffSchedule {
    /// 1s, 2s, 4s, 8s: five attempts, the last one starting 15s after the first.
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1), Duration::from_secs(8), 4)
    }
}

/// Core configuration surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// SLA within which a revoke must reach every reachable node.
    #[serde(with = "crate::serde_duration")]
    pub propagation_deadline: Duration,
    /// Period of pull reconciliation; at most half the deadline.
    #[serde(with = "crate::serde_duration")]
    pub reconciliation_interval: Duration,
    /// Period between heartbeats.
    #[serde(with = "crate::serde_duration")]
    pub heartbeat_interval: Duration,
    /// Consecutive misses before a node is marked unreachable.
    pub max_missed_heartbeats: u32,
    /// Session inactivity limit.
    #[serde(with = "crate::serde_duration")]
    pub idle_timeout: Duration,
    /// Session lifetime limit.
    #[serde(with = "crate::serde_duration")]
    pub absolute_timeout: Duration,
    /// Push retry schedule.
    pub retry_backoff_schedule: BackoffSchedule,
    /// Timeout for a single push, pull or heartbeat request.
    #[serde(with = "crate::serde_duration")]
    pub push_timeout: Duration,
    /// Lifetime of newly issued credentials.
    #[serde(with = "crate::serde_duration")]
    pub credential_ttl: Duration,
    /// How long terminal sessions are kept before the sweep purges them.
    #[serde(with = "crate::serde_duration")]
    pub session_retention: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            propagation_deadline: Duration::from_secs(60),
            reconciliation_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(5),
            max_missed_heartbeats: 3,
            idle_timeout: Duration::from_secs(15 * 60),
            absolute_timeout: Duration::from_secs(60 * 60),
            retry_backoff_schedule: BackoffSchedule::default(),
            push_timeout: Duration::from_secs(5),
            credential_ttl: Duration::from_secs(365 * 24 * 60 * 60),
            session_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl CoreConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks protocol constraints between fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.propagation_deadline.is_zero() {
            return Err(ConfigError::Invalid(
                "propagation_deadline must be positive".to_string(),
            ));
        }
        if self.reconciliation_interval.is_zero()
            || self.reconciliation_interval > self.propagation_deadline / 2
        {
            return Err(ConfigError::Invalid(format!(
                "reconciliation_interval {:?} must be positive and at most half of propagation_deadline {:?}",
                self.reconciliation_interval, self.propagation_deadline
            )));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "heartbeat_interval must be positive".to_string(),
            ));
        }
        if self.max_missed_heartbeats == 0 {
            return Err(ConfigError::Invalid(
                "max_missed_heartbeats must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout > self.absolute_timeout {
            return Err(ConfigError::Invalid(
                "idle_timeout must not exceed absolute_timeout".to_string(),
            ));
        }
        if self.retry_backoff_schedule.delays().is_empty() {
            return Err(ConfigError::Invalid(
                "retry_backoff_schedule must allow at least one retry".to_string(),
            ));
        }
        if self.push_timeout.is_zero() {
            return Err(ConfigError::Invalid("push_timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Worst-case convergence bound for a reachable node.
    pub fn convergence_bound(&self) -> Duration {
        self.propagation_deadline + self.reconciliation_interval
    }
}
