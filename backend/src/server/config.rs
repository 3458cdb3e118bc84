//! Server settings loaded via OrthoConfig and the derived server
//! configuration.

use std::net::SocketAddr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use mfi_backend::domain::idempotency::{IdempotencyConfig, UnknownSettingError};
use mfi_backend::domain::idempotency_sweeper::DEFAULT_SWEEP_INTERVAL;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Raw settings layered from CLI arguments, `MFI_*` environment variables
/// and an optional config file.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "MFI")]
pub struct ServerSettings {
    /// Socket address to listen on.
    pub bind_addr: Option<String>,
    /// PostgreSQL URL for the Diesel idempotency store.
    pub database_url: Option<String>,
    /// Redis URL for the expiring-key idempotency store.
    pub redis_url: Option<String>,
    /// Header carrying the idempotency key.
    pub idempotency_header: Option<String>,
    /// Retention period for stored responses, in hours.
    pub idempotency_ttl_hours: Option<u64>,
    /// `open` or `closed`.
    pub idempotency_failure_policy: Option<String>,
    /// `replay` or `reserve`.
    pub idempotency_mode: Option<String>,
    /// Seconds between expiry sweeps.
    pub idempotency_sweep_secs: Option<u64>,
}

/// Where idempotency records live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Redis(String),
    Postgres(String),
    Memory,
}

/// Errors turning settings into a [`ServerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bind address {value:?}: {source}")]
    BindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error(transparent)]
    Setting(#[from] UnknownSettingError),
}

impl From<ConfigError> for std::io::Error {
    fn from(error: ConfigError) -> Self {
        Self::new(std::io::ErrorKind::InvalidInput, error)
    }
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|raw| raw.trim())
        .filter(|raw| !raw.is_empty())
        .map(str::to_owned)
}

impl ServerSettings {
    /// Parsed listen address, defaulting to `0.0.0.0:8080`.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let value = non_blank(self.bind_addr.as_ref()).unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
        value
            .parse()
            .map_err(|source| ConfigError::BindAddr { value, source })
    }

    /// Redis first, then PostgreSQL, then the in-process store.
    pub fn store_backend(&self) -> StoreBackend {
        if let Some(url) = non_blank(self.redis_url.as_ref()) {
            StoreBackend::Redis(url)
        } else if let Some(url) = non_blank(self.database_url.as_ref()) {
            StoreBackend::Postgres(url)
        } else {
            StoreBackend::Memory
        }
    }

    /// Guard configuration with every unset field at its default.
    pub fn idempotency_config(&self) -> Result<IdempotencyConfig, ConfigError> {
        let mut config = IdempotencyConfig::default();
        if let Some(header) = &self.idempotency_header {
            config = config.with_header_name(header.as_str());
        }
        if let Some(hours) = self.idempotency_ttl_hours {
            config = config.with_ttl_hours(hours);
        }
        if let Some(policy) = non_blank(self.idempotency_failure_policy.as_ref()) {
            config = config.with_failure_policy(policy.parse()?);
        }
        if let Some(mode) = non_blank(self.idempotency_mode.as_ref()) {
            config = config.with_mode(mode.parse()?);
        }
        Ok(config)
    }

    /// Pause between expiry sweeps.
    pub fn sweep_interval(&self) -> Duration {
        self.idempotency_sweep_secs
            .filter(|secs| *secs > 0)
            .map_or(DEFAULT_SWEEP_INTERVAL, Duration::from_secs)
    }
}

/// Validated configuration used to build the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) store: StoreBackend,
    pub(crate) idempotency: IdempotencyConfig,
    pub(crate) sweep_interval: Duration,
}

impl TryFrom<&ServerSettings> for ServerConfig {
    type Error = ConfigError;

    fn try_from(settings: &ServerSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            bind_addr: settings.bind_addr()?,
            store: settings.store_backend(),
            idempotency: settings.idempotency_config()?,
            sweep_interval: settings.sweep_interval(),
        })
    }
}
