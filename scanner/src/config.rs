//! Configuration for the admission desk.
//!
//! Loads configuration from environment variables (and a `.env` file, if
//! present) with defaults for everything except the redemption service URL.

use crate::admission::AdmissionPolicy;
use crate::decode_source::{DEFAULT_MAX_SCANS_PER_SECOND, DecodeSourceOptions};
use crate::ledger::DEFAULT_LEDGER_CAPACITY;
use crate::payload::MissingNoncePolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Event name used when `ADMISSION_EVENT_NAME` is not set
pub const DEFAULT_EVENT_NAME: &str = "Tech Conference 2024";

/// Invalid configuration value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be used
    #[error("Invalid value for {key} ('{value}'): {reason}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// A required variable is missing
    #[error("Missing required variable {0}")]
    Missing(&'static str),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Desk behaviour
    pub admission: AdmissionConfig,
    /// Redemption backend
    pub redemption: RedemptionServiceConfig,
    /// Prometheus exporter listen address; no exporter when unset
    pub metrics_addr: Option<SocketAddr>,
}

/// Desk behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Event name stamped on every record
    pub event_name: String,
    /// Cool-down after each outcome in milliseconds (default: 3000)
    pub cooldown_ms: u64,
    /// Redemption call timeout in milliseconds (default: 10000)
    pub redeem_timeout_ms: u64,
    /// History length (default: 50)
    pub ledger_capacity: usize,
    /// QR payloads without nonce: `pass-through` (default) or `reject`
    pub missing_nonce: MissingNoncePolicy,
    /// Decode loop sampling rate (default: 25)
    pub max_scans_per_second: u32,
}

/// Redemption backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionServiceConfig {
    /// Base URL, e.g. `https://tickets.example.com`
    pub url: Option<String>,
    /// Bearer token sent with every call
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// TCP connect timeout in milliseconds (default: 3000)
    pub connect_timeout_ms: u64,
}

impl Config {
    /// Load configuration from `.env` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that do not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that do not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let max_scans_per_second: u32 = parse_positive(
            &get,
            "ADMISSION_MAX_SCANS_PER_SECOND",
            DEFAULT_MAX_SCANS_PER_SECOND,
        )?;
        let ledger_capacity: usize =
            parse_positive(&get, "ADMISSION_LEDGER_CAPACITY", DEFAULT_LEDGER_CAPACITY)?;

        let metrics_addr = get("ADMISSION_METRICS_ADDR")
            .map(|value| {
                value.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                    key: "ADMISSION_METRICS_ADDR",
                    value,
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            admission: AdmissionConfig {
                event_name: get("ADMISSION_EVENT_NAME")
                    .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string()),
                cooldown_ms: parse_positive(&get, "ADMISSION_COOLDOWN_MS", 3000)?,
                redeem_timeout_ms: parse_positive(&get, "ADMISSION_REDEEM_TIMEOUT_MS", 10_000)?,
                ledger_capacity,
                missing_nonce: parse_or(
                    &get,
                    "ADMISSION_MISSING_NONCE",
                    MissingNoncePolicy::default(),
                )?,
                max_scans_per_second,
            },
            redemption: RedemptionServiceConfig {
                url: get("REDEMPTION_SERVICE_URL"),
                token: get("REDEMPTION_SERVICE_TOKEN"),
                connect_timeout_ms: parse_or(&get, "REDEMPTION_CONNECT_TIMEOUT_MS", 3000)?,
            },
            metrics_addr,
        })
    }

    /// Redemption service base URL
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if `REDEMPTION_SERVICE_URL` is unset.
    pub fn redemption_url(&self) -> Result<&str, ConfigError> {
        self.redemption
            .url
            .as_deref()
            .ok_or(ConfigError::Missing("REDEMPTION_SERVICE_URL"))
    }

    /// Timing and validation rules for the reducer
    #[must_use]
    pub const fn policy(&self) -> AdmissionPolicy {
        AdmissionPolicy {
            cooldown: Duration::from_millis(self.admission.cooldown_ms),
            redeem_timeout: Duration::from_millis(self.admission.redeem_timeout_ms),
            missing_nonce: self.admission.missing_nonce,
        }
    }

    /// Sampling options for the decode source
    #[must_use]
    pub const fn decode_options(&self) -> DecodeSourceOptions {
        DecodeSourceOptions {
            max_scans_per_second: self.admission.max_scans_per_second,
        }
    }

    /// Connect timeout for the redemption client
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.redemption.connect_timeout_ms)
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

/// Like [`parse_or`], but zero is rejected
fn parse_positive<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}
