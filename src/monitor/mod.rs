// SPDX-License-Identifier: MPL-2.0

//! Monitor module organization

pub mod network;
pub mod geo;
pub mod weather;
pub mod timezone;
pub mod resolver;

pub use network::{MetricSampler, NetworkMonitor, NetworkSnapshot, NetworkStatus};
pub use geo::LocationSnapshot;
pub use weather::WeatherSnapshot;
pub use resolver::{GeoWeatherReport, GeoWeatherSource, Resolver};
