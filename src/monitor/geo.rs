// SPDX-License-Identifier: MPL-2.0

//! Public-IP geolocation.
//!
//! Providers are tried in configured order. The chain only stops at a
//! provider that yields an IP *and* a city or region; a bare IP is kept as
//! a partial result and the next provider is asked.

use std::ops::ControlFlow;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{GeoFormat, GeoProviderConfig};
use crate::error::ProviderError;

pub const UNKNOWN: &str = "unknown";

/// What one provider told us, with blank fields dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeoCandidate {
    pub ip: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl GeoCandidate {
    pub fn new(
        ip: Option<String>,
        city: Option<String>,
        region: Option<String>,
        country: Option<String>,
        timezone: Option<String>,
    ) -> Self {
        Self {
            ip: non_blank(ip),
            city: non_blank(city),
            region: non_blank(region),
            country: non_blank(country),
            timezone: non_blank(timezone),
        }
    }

    /// An IP plus a city or region.
    pub fn is_located(&self) -> bool {
        self.ip.is_some() && (self.city.is_some() || self.region.is_some())
    }
}

#[derive(Deserialize)]
struct IpapiCoBody {
    ip: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country_name: Option<String>,
    timezone: Option<String>,
    #[serde(default)]
    error: bool,
    reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiComBody {
    status: Option<String>,
    message: Option<String>,
    query: Option<String>,
    city: Option<String>,
    region_name: Option<String>,
    country: Option<String>,
    timezone: Option<String>,
}

#[derive(Deserialize)]
struct IpinfoBody {
    ip: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    timezone: Option<String>,
}

#[derive(Deserialize)]
struct IpOnlyBody {
    ip: Option<String>,
}

/// Map a provider's JSON body onto a [`GeoCandidate`]. Any field may be
/// absent.
pub fn parse_geo(format: GeoFormat, body: serde_json::Value) -> Result<GeoCandidate, String> {
    let candidate = match format {
        GeoFormat::IpapiCo => {
            let b: IpapiCoBody = serde_json::from_value(body).map_err(|e| e.to_string())?;
            if b.error {
                return Err(b.reason.unwrap_or_else(|| String::from("provider reported an error")));
            }
            GeoCandidate::new(b.ip, b.city, b.region, b.country_name, b.timezone)
        }
        GeoFormat::IpApiCom => {
            let b: IpApiComBody = serde_json::from_value(body).map_err(|e| e.to_string())?;
            if b.status.as_deref() == Some("fail") {
                return Err(b.message.unwrap_or_else(|| String::from("lookup failed")));
            }
            GeoCandidate::new(b.query, b.city, b.region_name, b.country, b.timezone)
        }
        GeoFormat::Ipinfo => {
            let b: IpinfoBody = serde_json::from_value(body).map_err(|e| e.to_string())?;
            GeoCandidate::new(b.ip, b.city, b.region, b.country, b.timezone)
        }
        GeoFormat::IpOnly => {
            let b: IpOnlyBody = serde_json::from_value(body).map_err(|e| e.to_string())?;
            GeoCandidate::new(b.ip, None, None, None, None)
        }
    };
    Ok(candidate)
}

/// Query one provider.
pub async fn fetch_geo(
    client: &reqwest::Client,
    provider: &GeoProviderConfig,
) -> Result<GeoCandidate, ProviderError> {
    let name = provider.name.as_str();
    let body: serde_json::Value = client
        .get(&provider.url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| ProviderError::from_reqwest(name, &e))?
        .json()
        .await
        .map_err(|e| ProviderError::from_reqwest(name, &e))?;

    let candidate = parse_geo(provider.format, body).map_err(|reason| ProviderError::Decode {
        provider: name.to_owned(),
        reason,
    })?;
    if candidate.ip.is_none() {
        return Err(ProviderError::MissingLocation {
            provider: name.to_owned(),
        });
    }
    Ok(candidate)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Located,
    IpOnly,
    Failed(String),
}

/// Diagnostics for one provider tried by the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: String,
    pub outcome: AttemptOutcome,
}

/// Outcome of running the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainResult {
    /// The located candidate, or the first IP-only one if nothing located.
    pub candidate: Option<GeoCandidate>,
    pub attempts: Vec<ProviderAttempt>,
}

impl ChainResult {
    pub fn is_located(&self) -> bool {
        self.candidate.as_ref().is_some_and(GeoCandidate::is_located)
    }

    pub fn all_failed(&self) -> bool {
        self.candidate.is_none()
    }
}

/// Ordered fallback over provider results, independent of how they are
/// fetched. Feed results with [`offer`](Self::offer) until it breaks.
#[derive(Debug, Default)]
pub struct FallbackChain {
    attempts: Vec<ProviderAttempt>,
    partial: Option<GeoCandidate>,
    located: Option<GeoCandidate>,
}

impl FallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(
        &mut self,
        provider: &str,
        result: Result<GeoCandidate, ProviderError>,
    ) -> ControlFlow<()> {
        let outcome = match result {
            Ok(candidate) if candidate.is_located() => {
                self.located = Some(candidate);
                AttemptOutcome::Located
            }
            Ok(candidate) => {
                debug!("{provider} returned an IP without a location, trying next provider");
                if self.partial.is_none() && candidate.ip.is_some() {
                    self.partial = Some(candidate);
                }
                AttemptOutcome::IpOnly
            }
            Err(e) => {
                debug!("{e}");
                AttemptOutcome::Failed(e.to_string())
            }
        };
        let done = outcome == AttemptOutcome::Located;
        self.attempts.push(ProviderAttempt {
            provider: provider.to_owned(),
            outcome,
        });
        if done {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    pub fn finish(self) -> ChainResult {
        ChainResult {
            candidate: self.located.or(self.partial),
            attempts: self.attempts,
        }
    }
}

/// Run the chain over lazily produced results, stopping at the first
/// located one. Later items of `results` are never pulled.
pub fn select_location<I>(results: I) -> ChainResult
where
    I: IntoIterator<Item = (String, Result<GeoCandidate, ProviderError>)>,
{
    let mut chain = FallbackChain::new();
    for (provider, result) in results {
        if chain.offer(&provider, result).is_break() {
            break;
        }
    }
    chain.finish()
}

/// Best-effort location. Missing values read "unknown"; the timezone is
/// left empty when no provider supplied one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationSnapshot {
    pub ip: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub timezone: String,
}

impl LocationSnapshot {
    pub fn unknown() -> Self {
        Self::from_candidate(None)
    }

    pub fn from_candidate(candidate: Option<GeoCandidate>) -> Self {
        let c = candidate.unwrap_or_default();
        let unknown = || String::from(UNKNOWN);
        Self {
            ip: c.ip.unwrap_or_else(unknown),
            city: c.city.unwrap_or_else(unknown),
            region: c.region.unwrap_or_else(unknown),
            country: c.country.unwrap_or_else(unknown),
            timezone: c.timezone.unwrap_or_default(),
        }
    }

    /// City if known, else region.
    pub fn place(&self) -> Option<&str> {
        [self.city.as_str(), self.region.as_str()]
            .into_iter()
            .find(|v| *v != UNKNOWN)
    }
}
