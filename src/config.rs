// SPDX-License-Identifier: MPL-2.0

//! Monitor configuration.
//!
//! Stored as TOML under the platform config directory
//! (`~/.config/netweather-monitor/config.toml` on Linux). Every field has a
//! default so a partial file, or no file at all, is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest accepted refresh period or debounce window: one week.
const MAX_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;
const MAX_PING_TIMEOUT_MS: u64 = 60_000;
const MAX_HTTP_TIMEOUT_SECS: u64 = 300;

/// How a geolocation provider lays out its JSON body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoFormat {
    /// ipapi.co: `ip`, `city`, `region`, `country_name`, `timezone`
    IpapiCo,
    /// ip-api.com: `query`, `city`, `regionName`, `country`, `timezone`
    IpApiCom,
    /// ipinfo.io: `ip`, `city`, `region`, `country`, `timezone`
    Ipinfo,
    /// ipify and friends: `ip` only
    IpOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoProviderConfig {
    pub name: String,
    pub url: String,
    pub format: GeoFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherKind {
    /// wttr.in `?format=j1`, keyed by city in the path
    Wttr,
    /// OpenWeatherMap current weather, needs `weather_api_key`
    OpenWeatherMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherProviderConfig {
    pub name: String,
    pub url: String,
    pub kind: WeatherKind,
}

/// A city shown when geolocation yields no usable city.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultLocation {
    /// Country names or codes this entry applies to (case-insensitive).
    #[serde(default)]
    pub countries: Vec<String>,
    pub city: String,
    pub timezone: String,
}

impl DefaultLocation {
    pub fn matches(&self, country: &str) -> bool {
        let country = country.trim();
        !country.is_empty()
            && self
                .countries
                .iter()
                .any(|c| c.trim().eq_ignore_ascii_case(country))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Append-only log file. Logs go to stderr when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
    pub head_lines: usize,
    pub tail_lines: usize,
    /// Appended lines between two rotation checks.
    pub check_every_lines: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: None,
            level: String::from("info"),
            head_lines: 200,
            tail_lines: 200,
            check_every_lines: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub show_network: bool,
    pub show_weather: bool,
    pub use_24hour_time: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_network: true,
            show_weather: true,
            use_24hour_time: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network_interval_secs: u64,
    pub geo_weather_interval_secs: u64,
    pub reconnect_debounce_secs: u64,
    /// Host to ping. The default gateway is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_target: Option<String>,
    pub ping_timeout_ms: u64,
    /// Number of probe samples averaged into latency and packet loss.
    pub sample_window: usize,
    pub http_timeout_secs: u64,
    pub weather_api_key: String,
    /// Timezone used for the local clock when the resolved one is unknown.
    pub default_timezone: String,
    pub geo_providers: Vec<GeoProviderConfig>,
    pub weather_providers: Vec<WeatherProviderConfig>,
    pub default_locations: Vec<DefaultLocation>,
    pub fallback_location: DefaultLocation,
    pub log: LogConfig,
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network_interval_secs: 5,
            geo_weather_interval_secs: 600,
            reconnect_debounce_secs: 5,
            ping_target: None,
            ping_timeout_ms: 2000,
            sample_window: 10,
            http_timeout_secs: 8,
            weather_api_key: String::new(),
            default_timezone: String::from("Asia/Shanghai"),
            geo_providers: vec![
                GeoProviderConfig {
                    name: String::from("ipapi.co"),
                    url: String::from("https://ipapi.co/json/"),
                    format: GeoFormat::IpapiCo,
                },
                GeoProviderConfig {
                    name: String::from("ip-api.com"),
                    url: String::from("http://ip-api.com/json/"),
                    format: GeoFormat::IpApiCom,
                },
                GeoProviderConfig {
                    name: String::from("ipinfo.io"),
                    url: String::from("https://ipinfo.io/json"),
                    format: GeoFormat::Ipinfo,
                },
            ],
            weather_providers: vec![
                WeatherProviderConfig {
                    name: String::from("wttr.in"),
                    url: String::from("https://wttr.in"),
                    kind: WeatherKind::Wttr,
                },
                WeatherProviderConfig {
                    name: String::from("openweathermap"),
                    url: String::from("https://api.openweathermap.org/data/2.5/weather"),
                    kind: WeatherKind::OpenWeatherMap,
                },
            ],
            default_locations: vec![DefaultLocation {
                countries: vec![
                    String::from("China"),
                    String::from("中国"),
                    String::from("CN"),
                ],
                city: String::from("Beijing"),
                timezone: String::from("Asia/Shanghai"),
            }],
            fallback_location: DefaultLocation {
                countries: Vec::new(),
                city: String::from("New York"),
                timezone: String::from("America/New_York"),
            },
            log: LogConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Config {
    /// Platform default location of the config file.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("com.github", "netweather", "netweather-monitor")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from `path`, or from the default path when `None`.
    ///
    /// A missing file at the default path yields the defaults; a missing
    /// file that was asked for explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None => {
                let path = Self::default_path()?;
                if path.exists() {
                    Self::read(&path)?
                } else {
                    log::debug!("no config at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("network_interval_secs", self.network_interval_secs),
            ("geo_weather_interval_secs", self.geo_weather_interval_secs),
            ("reconnect_debounce_secs", self.reconnect_debounce_secs),
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("http_timeout_secs", self.http_timeout_secs),
            ("log.check_every_lines", self.log.check_every_lines),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        let bounded = [
            ("network_interval_secs", self.network_interval_secs, MAX_PERIOD_SECS),
            ("geo_weather_interval_secs", self.geo_weather_interval_secs, MAX_PERIOD_SECS),
            ("reconnect_debounce_secs", self.reconnect_debounce_secs, MAX_PERIOD_SECS),
            ("ping_timeout_ms", self.ping_timeout_ms, MAX_PING_TIMEOUT_MS),
            ("http_timeout_secs", self.http_timeout_secs, MAX_HTTP_TIMEOUT_SECS),
        ];
        for (field, value, max) in bounded {
            if value > max {
                return Err(invalid(field, &format!("must be at most {max}")));
            }
        }
        if self.sample_window == 0 {
            return Err(invalid("sample_window", "must be greater than zero"));
        }
        if self.log.head_lines == 0 || self.log.tail_lines == 0 {
            return Err(invalid("log", "head_lines and tail_lines must be greater than zero"));
        }
        if self.geo_providers.is_empty() {
            return Err(invalid("geo_providers", "at least one provider is required"));
        }
        if self.fallback_location.city.trim().is_empty() {
            return Err(invalid("fallback_location.city", "must not be empty"));
        }
        Ok(())
    }

    pub fn network_interval(&self) -> Duration {
        Duration::from_secs(self.network_interval_secs)
    }

    pub fn geo_weather_interval(&self) -> Duration {
        Duration::from_secs(self.geo_weather_interval_secs)
    }

    pub fn reconnect_debounce(&self) -> Duration {
        Duration::from_secs(self.reconnect_debounce_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Pick the default city for a country, falling back to
    /// `fallback_location` for countries not in the table.
    pub fn default_location_for(&self, country: &str) -> &DefaultLocation {
        self.default_locations
            .iter()
            .find(|loc| loc.matches(country))
            .unwrap_or(&self.fallback_location)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}
