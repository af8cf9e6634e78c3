// SPDX-License-Identifier: MPL-2.0

//! Weather lookup by city name.
//!
//! Two providers are supported: wttr.in (no key) and OpenWeatherMap (key
//! required). Both are mapped onto OpenWeatherMap icon codes (`01d`..`50n`)
//! so the renderer deals with a single vocabulary.
//!
//! Timezone metadata in weather responses is ignored; the local clock is
//! always derived from the geolocation result.

use serde::{Deserialize, Serialize};

use crate::config::{WeatherKind, WeatherProviderConfig};
use crate::error::ProviderError;

// wttr.in `format=j1` response structures. Numbers arrive as strings.
#[derive(Debug, Deserialize)]
struct WttrResponse {
    #[serde(default)]
    current_condition: Vec<WttrCondition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WttrCondition {
    #[serde(rename = "temp_C")]
    temp_c: Option<String>,
    #[serde(rename = "FeelsLikeC")]
    feels_like_c: Option<String>,
    humidity: Option<String>,
    weather_code: Option<String>,
    #[serde(default)]
    weather_desc: Vec<WttrValue>,
}

#[derive(Debug, Deserialize)]
struct WttrValue {
    value: String,
}

// OpenWeatherMap API response structures
#[derive(Debug, Deserialize)]
struct OpenWeatherResponse {
    main: MainWeather,
    #[serde(default)]
    weather: Vec<WeatherCondition>,
}

#[derive(Debug, Deserialize)]
struct MainWeather {
    temp: f32,
    feels_like: Option<f32>,
    humidity: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    description: String,
    icon: String,
}

/// Conditions reported by a provider, before they are tied to a place.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    pub temperature: f32,
    pub feels_like: Option<f32>,
    pub humidity: Option<u8>,
    pub description: String,
    /// Two-digit condition code, e.g. `"10"` for rain.
    pub condition: String,
    /// Day/night marker when the provider supplies one.
    pub daytime: Option<bool>,
}

impl WeatherReading {
    /// Full icon code, using `daytime` when the provider left it open.
    pub fn icon(&self, daytime: bool) -> String {
        let day = self.daytime.unwrap_or(daytime);
        format!("{}{}", self.condition, if day { 'd' } else { 'n' })
    }
}

/// Weather as displayed for a location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSnapshot {
    pub temperature: Option<f32>,
    pub feels_like: Option<f32>,
    pub humidity: Option<u8>,
    pub description: String,
    pub icon: String,
    /// The city that was queried, not the provider's nearest-area name.
    pub location: String,
    pub local_time: String,
    pub timezone: String,
}

impl Default for WeatherSnapshot {
    fn default() -> Self {
        Self {
            temperature: None,
            feels_like: None,
            humidity: None,
            description: String::from("--"),
            icon: String::from("03d"),
            location: String::from("unknown"),
            local_time: String::from("--"),
            timezone: String::new(),
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Map a wttr.in (WorldWeatherOnline) weather code to an OpenWeatherMap
/// condition code.
pub fn wttr_condition(code: u16) -> &'static str {
    match code {
        113 => "01",
        116 => "02",
        119 => "03",
        122 => "04",
        143 | 248 | 260 => "50",
        176 | 263 | 266 | 293 | 296 | 353 => "09",
        299 | 302 | 305 | 308 | 356 | 359 | 281 | 284 | 311 | 314 => "10",
        200 | 386 | 389 | 392 | 395 => "11",
        179 | 182 | 185 | 227 | 230 | 317 | 320 | 323 | 326 | 329 | 332 | 335 | 338 | 350
        | 362 | 365 | 368 | 371 | 374 | 377 => "13",
        _ => "03",
    }
}

fn parse_wttr(body: &str) -> Result<WeatherReading, String> {
    let response: WttrResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let current = response
        .current_condition
        .into_iter()
        .next()
        .ok_or_else(|| String::from("no current_condition"))?;

    let temperature = current
        .temp_c
        .as_deref()
        .and_then(|t| t.trim().parse::<f32>().ok())
        .ok_or_else(|| String::from("missing temp_C"))?;
    let code = current
        .weather_code
        .as_deref()
        .and_then(|c| c.trim().parse::<u16>().ok())
        .unwrap_or(0);

    Ok(WeatherReading {
        temperature,
        feels_like: current.feels_like_c.and_then(|t| t.trim().parse().ok()),
        humidity: current.humidity.and_then(|h| h.trim().parse().ok()),
        description: current
            .weather_desc
            .into_iter()
            .next()
            .map(|d| d.value.trim().to_owned())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| String::from("Unknown")),
        condition: wttr_condition(code).to_owned(),
        daytime: None,
    })
}

fn parse_open_weather(body: &str) -> Result<WeatherReading, String> {
    let response: OpenWeatherResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let first = response.weather.first();

    let description = first
        .map(|w| capitalize(&w.description))
        .unwrap_or_else(|| String::from("Unknown"));
    let icon = first.map(|w| w.icon.as_str()).unwrap_or("03d");
    let condition = icon.get(..2).unwrap_or("03").to_owned();

    Ok(WeatherReading {
        temperature: response.main.temp,
        feels_like: response.main.feels_like,
        humidity: response.main.humidity,
        description,
        condition,
        daytime: match icon.chars().last() {
            Some('d') => Some(true),
            Some('n') => Some(false),
            _ => None,
        },
    })
}

/// `base` with `city` appended as a single, percent-encoded path segment.
fn city_url(base: &str, city: &str) -> Result<reqwest::Url, String> {
    let mut url = reqwest::Url::parse(base).map_err(|e| format!("invalid URL {base}: {e}"))?;
    url.path_segments_mut()
        .map_err(|()| format!("{base} cannot take a path"))?
        .pop_if_empty()
        .push(city);
    Ok(url)
}

/// Fetch current weather for `city` from one provider.
pub async fn fetch_weather(
    client: &reqwest::Client,
    provider: &WeatherProviderConfig,
    city: &str,
    api_key: &str,
) -> Result<WeatherReading, ProviderError> {
    let name = provider.name.as_str();
    let request = match provider.kind {
        WeatherKind::Wttr => client
            .get(city_url(&provider.url, city).map_err(|reason| ProviderError::Unreachable {
                provider: name.to_owned(),
                reason,
            })?)
            .query(&[("format", "j1")]),
        WeatherKind::OpenWeatherMap => {
            // Strip quotes from the key; hand-edited configs sometimes carry them.
            let api_key = api_key.trim().trim_matches('"');
            if api_key.is_empty() {
                return Err(ProviderError::Unreachable {
                    provider: name.to_owned(),
                    reason: String::from("no API key configured"),
                });
            }
            client
                .get(&provider.url)
                .query(&[("q", city), ("appid", api_key), ("units", "metric")])
        }
    };

    let body = request
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| ProviderError::from_reqwest(name, &e))?
        .text()
        .await
        .map_err(|e| ProviderError::from_reqwest(name, &e))?;

    let parsed = match provider.kind {
        WeatherKind::Wttr => parse_wttr(&body),
        WeatherKind::OpenWeatherMap => parse_open_weather(&body),
    };
    parsed.map_err(|reason| ProviderError::Decode {
        provider: name.to_owned(),
        reason,
    })
}

/// Text glyph for an OpenWeatherMap icon code.
///
/// The first two characters are the condition, the last is day (`d`) or
/// night (`n`).
pub fn icon_glyph(icon_code: &str) -> &'static str {
    let condition = icon_code.get(..2).unwrap_or("03");
    let is_day = !icon_code.ends_with('n');
    match condition {
        "01" if is_day => "☀",
        "01" => "☾",
        "02" if is_day => "⛅",
        "02" => "☁☾",
        "03" | "04" => "☁",
        "09" | "10" => "🌧",
        "11" => "⛈",
        "13" => "❄",
        "50" => "🌫",
        _ => "☁",
    }
}
