//! Configuration for the idempotency guard.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding the retention period, in hours.
pub const IDEMPOTENCY_TTL_HOURS_ENV: &str = "MFI_IDEMPOTENCY_TTL_HOURS";

/// Default header carrying the client key.
pub const DEFAULT_IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Environment abstraction so configuration can be tested without mutating
/// the process environment.
pub trait IdempotencyEnv {
    /// Fetch a string value by name.
    fn string(&self, name: &str) -> Option<String>;
}

/// Environment access backed by the real process environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultIdempotencyEnv;

impl IdempotencyEnv for DefaultIdempotencyEnv {
    fn string(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// What the guard does when the store cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log and run the request unguarded.
    #[default]
    FailOpen,
    /// Reject the request with `503 Service Unavailable`.
    FailClosed,
}

/// How the guard protects a first-seen key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardMode {
    /// Check, run the handler, then store. Two concurrent first requests
    /// with the same key may both run the handler; only one response is
    /// kept.
    #[default]
    Replay,
    /// Atomically reserve the key before running the handler, reject
    /// concurrent duplicates with `409`, commit or release afterwards.
    /// This deviates from the replay behaviour and is opt-in.
    Reserve,
}

/// Error returned when parsing a policy or mode name fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSettingError {
    setting: &'static str,
    value: String,
}

impl fmt::Display for UnknownSettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} value: {:?}", self.setting, self.value)
    }
}

impl std::error::Error for UnknownSettingError {}

impl FromStr for FailurePolicy {
    type Err = UnknownSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "fail-open" | "fail_open" => Ok(Self::FailOpen),
            "closed" | "fail-closed" | "fail_closed" => Ok(Self::FailClosed),
            _ => Err(UnknownSettingError {
                setting: "idempotency failure policy",
                value: s.to_owned(),
            }),
        }
    }
}

impl FromStr for GuardMode {
    type Err = UnknownSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replay" => Ok(Self::Replay),
            "reserve" => Ok(Self::Reserve),
            _ => Err(UnknownSettingError {
                setting: "idempotency mode",
                value: s.to_owned(),
            }),
        }
    }
}

/// Guard configuration: header name, retention, failure policy and mode.
///
/// # Example
///
/// ```
/// # use mfi_backend::domain::idempotency::{FailurePolicy, GuardMode, IdempotencyConfig};
/// # use std::time::Duration;
/// let config = IdempotencyConfig::default();
/// assert_eq!(config.header_name(), "Idempotency-Key");
/// assert_eq!(config.ttl(), Duration::from_secs(24 * 3600));
/// assert_eq!(config.failure_policy(), FailurePolicy::FailOpen);
/// assert_eq!(config.mode(), GuardMode::Replay);
/// ```
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    header_name: String,
    ttl: Duration,
    failure_policy: FailurePolicy,
    mode: GuardMode,
}

impl IdempotencyConfig {
    const DEFAULT_TTL_HOURS: u64 = 24;
    const MIN_TTL_HOURS: u64 = 1;
    /// Ten years.
    const MAX_TTL_HOURS: u64 = 24 * 365 * 10;

    /// Load the retention period from the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(&DefaultIdempotencyEnv)
    }

    /// Load the retention period from a custom environment source.
    ///
    /// Reads `MFI_IDEMPOTENCY_TTL_HOURS`; unparsable values fall back to the
    /// default and everything is clamped to `1..=87600` hours.
    pub fn from_env_with(env: &impl IdempotencyEnv) -> Self {
        let hours = env
            .string(IDEMPOTENCY_TTL_HOURS_ENV)
            .and_then(|raw| raw.trim().parse::<u64>().ok());
        Self::default().with_ttl_hours(hours.unwrap_or(Self::DEFAULT_TTL_HOURS))
    }

    /// Set the retention period in whole hours, clamped to the allowed range.
    #[must_use]
    pub fn with_ttl_hours(self, hours: u64) -> Self {
        let hours = hours.clamp(Self::MIN_TTL_HOURS, Self::MAX_TTL_HOURS);
        self.with_ttl(Duration::from_secs(hours.saturating_mul(3600)))
    }

    /// Set an explicit retention period (no clamping; used by tests).
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Use a different header for the key. Blank names are ignored.
    #[must_use]
    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.header_name = name.trim().to_owned();
        }
        self
    }

    /// Choose the store-failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Choose the guard mode.
    #[must_use]
    pub fn with_mode(mut self, mode: GuardMode) -> Self {
        self.mode = mode;
        self
    }

    /// Header carrying the key.
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Retention period for stored records.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store-failure policy.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Guard mode.
    pub fn mode(&self) -> GuardMode {
        self.mode
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            header_name: DEFAULT_IDEMPOTENCY_HEADER.to_owned(),
            ttl: Duration::from_secs(Self::DEFAULT_TTL_HOURS * 3600),
            failure_policy: FailurePolicy::default(),
            mode: GuardMode::default(),
        }
    }
}
