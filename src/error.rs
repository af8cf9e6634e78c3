// SPDX-License-Identifier: MPL-2.0

//! Error kinds raised by the monitors.
//!
//! None of these are fatal: every error stays local to the tick that
//! produced it and ends up as a degraded display value.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain a network measurement.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe of {target} timed out after {timeout_ms} ms")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("probe command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("could not parse probe output: {0}")]
    Parse(String),
}

/// One geolocation or weather provider failed. Advances the fallback chain.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} unreachable: {reason}")]
    Unreachable { provider: String, reason: String },

    #[error("{provider} answered HTTP {status}")]
    Status { provider: String, status: u16 },

    #[error("{provider} returned an unreadable body: {reason}")]
    Decode { provider: String, reason: String },

    #[error("{provider} returned no usable location")]
    MissingLocation { provider: String },
}

impl ProviderError {
    /// Classify a transport error from `reqwest`.
    pub fn from_reqwest(provider: &str, err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Status {
                provider: provider.to_owned(),
                status: status.as_u16(),
            };
        }
        if err.is_decode() {
            return Self::Decode {
                provider: provider.to_owned(),
                reason: err.to_string(),
            };
        }
        Self::Unreachable {
            provider: provider.to_owned(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("all {tried} providers failed")]
    AllProvidersExhausted { tried: usize },
}

#[derive(Debug, Error)]
#[error("unknown timezone '{0}'")]
pub struct TimezoneUnresolved(pub String);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no configuration directory available on this system")]
    NoConfigDir,
}
