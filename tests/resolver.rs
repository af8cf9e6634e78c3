// SPDX-License-Identifier: MPL-2.0

// Geo/weather resolution against mocked providers.

use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use netweather_monitor::Config;
use netweather_monitor::config::{
    GeoFormat, GeoProviderConfig, WeatherKind, WeatherProviderConfig,
};
use netweather_monitor::monitor::{Resolver, weather};
use netweather_monitor::monitor::geo::AttemptOutcome;

// ── Helpers ─────────────────────────────────────────────────────────

fn config(server: &MockServer) -> Config {
    let uri = server.uri();
    Config {
        geo_providers: vec![
            GeoProviderConfig {
                name: String::from("first"),
                url: format!("{uri}/geo/first"),
                format: GeoFormat::IpapiCo,
            },
            GeoProviderConfig {
                name: String::from("second"),
                url: format!("{uri}/geo/second"),
                format: GeoFormat::IpApiCom,
            },
            GeoProviderConfig {
                name: String::from("third"),
                url: format!("{uri}/geo/third"),
                format: GeoFormat::Ipinfo,
            },
        ],
        weather_providers: vec![
            WeatherProviderConfig {
                name: String::from("wttr"),
                url: format!("{uri}/wttr"),
                kind: WeatherKind::Wttr,
            },
            WeatherProviderConfig {
                name: String::from("owm"),
                url: format!("{uri}/owm"),
                kind: WeatherKind::OpenWeatherMap,
            },
        ],
        http_timeout_secs: 2,
        ..Config::default()
    }
}

/// 2026-07-01 21:05 UTC: 14:05 in Oregon, 17:05 in New York.
fn summer_evening_utc() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 1, 21, 5, 0).unwrap()
}

fn wttr_body(temp: &str, code: &str, desc: &str) -> serde_json::Value {
    json!({
        "current_condition": [{
            "temp_C": temp,
            "FeelsLikeC": temp,
            "humidity": "40",
            "weatherCode": code,
            "weatherDesc": [{"value": desc}]
        }],
        "nearest_area": [{
            "areaName": [{"value": "Chenoweth"}],
            "region": [{"value": "Oregon"}]
        }]
    })
}

async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn ip_only_provider_falls_through_to_located_one() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geo/first"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ip": "34.105.5.167",
            "city": "",
            "timezone": ""
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/geo/second"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "query": "34.105.5.167",
            "city": "The Dalles",
            "regionName": "Oregon",
            "country": "United States",
            "timezone": "America/Los_Angeles"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/geo/third"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/wttr/The(%20| )Dalles$"))
        .and(query_param("format", "j1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wttr_body("31", "113", "Sunny")))
        .mount(&server)
        .await;

    let resolver = Resolver::new(&config(&server)).unwrap();
    let report = resolver.resolve_at(summer_evening_utc()).await;

    assert!(!report.is_default_location);
    assert_eq!(report.location.ip, "34.105.5.167");
    assert_eq!(report.location.city, "The Dalles");
    assert_eq!(report.location.timezone, "America/Los_Angeles");
    assert_eq!(
        report
            .attempts
            .iter()
            .map(|a| a.outcome.clone())
            .collect::<Vec<_>>(),
        vec![AttemptOutcome::IpOnly, AttemptOutcome::Located]
    );

    let weather = &report.weather;
    assert_eq!(weather.location, "The Dalles");
    assert_eq!(weather.temperature, Some(31.0));
    assert_eq!(weather.description, "Sunny");
    assert_eq!(weather.icon, "01d");
    assert_eq!(weather.timezone, "America/Los_Angeles");
    assert_eq!(weather.local_time, "14:05");
}

#[tokio::test]
async fn everything_down_degrades_to_unknown_values() {
    let server = MockServer::start().await;
    for route in ["/geo/first", "/geo/second", "/geo/third"] {
        mount_status(&server, route, 503).await;
    }
    Mock::given(method("GET"))
        .and(path_regex(r"^/wttr/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    // No API key: the second weather provider is skipped without a request.
    Mock::given(method("GET"))
        .and(path("/owm"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = Resolver::new(&config(&server)).unwrap();
    let report = resolver.resolve_at(summer_evening_utc()).await;

    assert!(report.is_default_location);
    assert_eq!(report.location.ip, "unknown");
    assert_eq!(report.location.city, "unknown");
    assert_eq!(report.location.timezone, "");
    assert_eq!(report.attempts.len(), 3);
    assert!(
        report
            .attempts
            .iter()
            .all(|a| matches!(a.outcome, AttemptOutcome::Failed(_)))
    );

    let weather = &report.weather;
    assert_eq!(weather.location, "New York");
    assert_eq!(weather.temperature, None);
    assert_eq!(weather.description, "--");
    assert_eq!(weather.timezone, "America/New_York");
    assert_eq!(weather.local_time, "17:05");
}

#[tokio::test]
async fn ip_only_everywhere_uses_the_country_default_city() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geo/first"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ip": "1.2.3.4",
            "city": "",
            "region": "",
            "country_name": "China",
            "timezone": ""
        })))
        .mount(&server)
        .await;
    mount_status(&server, "/geo/second", 429).await;
    Mock::given(method("GET"))
        .and(path("/geo/third"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ip": "1.2.3.4"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wttr/Beijing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wttr_body("27", "116", "Partly cloudy")))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = Resolver::new(&config(&server)).unwrap();
    let report = resolver.resolve_at(summer_evening_utc()).await;

    assert!(report.is_default_location);
    assert_eq!(report.location.ip, "1.2.3.4");
    assert_eq!(report.location.country, "China");
    assert_eq!(report.weather.location, "Beijing");
    assert_eq!(report.weather.timezone, "Asia/Shanghai");
    // 05:05 the next morning in Beijing.
    assert_eq!(report.weather.local_time, "05:05");
    assert_eq!(report.weather.icon, "02n");
}

#[tokio::test]
async fn open_weather_map_is_the_second_weather_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geo/first"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ip": "34.105.5.167",
            "city": "The Dalles",
            "region": "Oregon",
            "country_name": "United States",
            "timezone": "America/Los_Angeles"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/wttr/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Unknown location"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/owm"))
        .and(query_param("q", "The Dalles"))
        .and(query_param("appid", "secret"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "main": {"temp": 22.4, "feels_like": 21.8, "humidity": 35},
            "weather": [{"description": "few clouds", "icon": "02d"}],
            "name": "Wasco County"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.weather_api_key = String::from("\"secret\"");
    let resolver = Resolver::new(&config).unwrap();
    let report = resolver.resolve_at(summer_evening_utc()).await;

    assert!(!report.is_default_location);
    assert_eq!(report.weather.location, "The Dalles");
    let temperature = report.weather.temperature.unwrap();
    assert!((temperature - 22.4).abs() < 1e-4, "got {temperature}");
    assert_eq!(report.weather.description, "Few clouds");
    assert_eq!(report.weather.icon, "02d");
}

#[tokio::test]
async fn city_with_reserved_characters_stays_one_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wttr/Winston%2FSalem%3Fx%231"))
        .and(query_param("format", "j1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wttr_body("12", "122", "Overcast")))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server);
    let reading = weather::fetch_weather(
        &reqwest::Client::new(),
        &config.weather_providers[0],
        "Winston/Salem?x#1",
        "",
    )
    .await
    .unwrap();

    assert_eq!(reading.description, "Overcast");
    assert_eq!(reading.icon(true), "04d");
}
