// SPDX-License-Identifier: MPL-2.0

//! Geo/weather resolution: where are we, what is the weather there, and
//! what time is it locally.

use std::future::Future;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::geo::{self, FallbackChain, LocationSnapshot, ProviderAttempt};
use super::timezone;
use super::weather::{self, WeatherReading, WeatherSnapshot};
use crate::config::Config;
use crate::error::ResolveError;

/// Everything one geo/weather refresh produces.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoWeatherReport {
    pub location: LocationSnapshot,
    pub weather: WeatherSnapshot,
    /// The displayed city came from the default-location table.
    pub is_default_location: bool,
    /// Geolocation providers tried, in order.
    pub attempts: Vec<ProviderAttempt>,
}

/// Something that can produce a fresh [`GeoWeatherReport`]. Never fails;
/// unreachable providers show up as unknown fields.
pub trait GeoWeatherSource: Send + Sync {
    fn refresh(&self) -> impl Future<Output = GeoWeatherReport> + Send;
}

pub struct Resolver {
    client: reqwest::Client,
    config: Config,
}

impl Resolver {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .user_agent(concat!("netweather-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    /// Walk the geolocation providers in order.
    pub async fn locate(&self) -> (LocationSnapshot, Vec<ProviderAttempt>) {
        let mut chain = FallbackChain::new();
        for provider in &self.config.geo_providers {
            let result = geo::fetch_geo(&self.client, provider).await;
            if chain.offer(&provider.name, result).is_break() {
                break;
            }
        }
        let result = chain.finish();
        if result.all_failed() {
            warn!(
                "{}",
                ResolveError::AllProvidersExhausted {
                    tried: result.attempts.len()
                }
            );
        }
        (LocationSnapshot::from_candidate(result.candidate), result.attempts)
    }

    async fn current_weather(&self, city: &str) -> Option<WeatherReading> {
        for provider in &self.config.weather_providers {
            match weather::fetch_weather(&self.client, provider, city, &self.config.weather_api_key).await {
                Ok(reading) => return Some(reading),
                Err(e) => debug!("weather: {e}"),
            }
        }
        warn!(
            "weather for {city}: {}",
            ResolveError::AllProvidersExhausted {
                tried: self.config.weather_providers.len()
            }
        );
        None
    }

    /// Full refresh with the clock read at `now`.
    pub async fn resolve_at(&self, now: DateTime<Utc>) -> GeoWeatherReport {
        let (location, attempts) = self.locate().await;

        let (city, timezone, is_default_location) = match location.place() {
            Some(place) => (place.to_owned(), location.timezone.clone(), false),
            None => {
                let fallback = self.config.default_location_for(&location.country);
                info!(
                    "no city for {} ({}), showing {}",
                    location.ip, location.country, fallback.city
                );
                let timezone = if location.timezone.is_empty() {
                    fallback.timezone.clone()
                } else {
                    location.timezone.clone()
                };
                (fallback.city.clone(), timezone, true)
            }
        };

        let local = timezone::local_time(&timezone, &self.config.default_timezone, now);
        let local_time = local.format(self.config.display.use_24hour_time);

        let weather = match self.current_weather(&city).await {
            Some(reading) => WeatherSnapshot {
                temperature: Some(reading.temperature),
                feels_like: reading.feels_like,
                humidity: reading.humidity,
                icon: reading.icon(local.is_daytime()),
                description: reading.description,
                location: city,
                local_time,
                timezone: local.timezone,
            },
            None => WeatherSnapshot {
                location: city,
                local_time,
                timezone: local.timezone,
                ..WeatherSnapshot::default()
            },
        };

        GeoWeatherReport {
            location,
            weather,
            is_default_location,
            attempts,
        }
    }

    pub async fn resolve(&self) -> GeoWeatherReport {
        self.resolve_at(Utc::now()).await
    }
}

impl GeoWeatherSource for Resolver {
    async fn refresh(&self) -> GeoWeatherReport {
        self.resolve().await
    }
}
