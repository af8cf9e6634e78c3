// SPDX-License-Identifier: MPL-2.0

//! Presentation of finished snapshots.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use log::debug;

use crate::config::DisplayConfig;
use crate::monitor::weather::icon_glyph;
use crate::monitor::{GeoWeatherReport, NetworkSnapshot};

/// Receives complete snapshots. Each call replaces what was shown before;
/// the two kinds of snapshot may arrive from different tasks.
pub trait PresentationSink: Send + Sync {
    fn publish_network(&self, snapshot: &NetworkSnapshot);
    fn publish_geo_weather(&self, report: &GeoWeatherReport);
}

pub fn format_network(snapshot: &NetworkSnapshot) -> String {
    let latency = match snapshot.latency_ms {
        Some(ms) => format!("{ms} ms"),
        None => String::from("--"),
    };
    format!(
        "Network ↓: {:.1} KB/s  ↑: {:.1} KB/s  Latency: {}  Loss: {:.1}%  [{}]",
        snapshot.download_kbps,
        snapshot.upload_kbps,
        latency,
        snapshot.packet_loss_pct,
        snapshot.status.label(),
    )
}

pub fn format_geo_weather(report: &GeoWeatherReport) -> String {
    let weather = &report.weather;
    let temperature = match weather.temperature {
        Some(t) => format!("{t:.1}°C"),
        None => String::from("--°C"),
    };
    let mut line = format!(
        "{} {}  {}  {}",
        icon_glyph(&weather.icon),
        temperature,
        weather.description,
        weather.location,
    );
    if report.is_default_location {
        line.push_str(" (default)");
    }
    line.push_str(&format!("  {}", weather.local_time));
    if !weather.timezone.is_empty() {
        line.push_str(&format!(" {}", weather.timezone));
    }
    line.push_str(&format!("  IP {}", report.location.ip));
    line
}

/// Writes one line per snapshot to a terminal (or any writer).
pub struct TerminalSink<W> {
    display: DisplayConfig,
    out: Mutex<W>,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout(display: DisplayConfig) -> Self {
        Self::new(display, io::stdout())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(display: DisplayConfig, out: W) -> Self {
        Self {
            display,
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_line(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            debug!("render: {e}");
        }
    }
}

impl<W: Write + Send> PresentationSink for TerminalSink<W> {
    fn publish_network(&self, snapshot: &NetworkSnapshot) {
        if self.display.show_network {
            self.write_line(&format_network(snapshot));
        }
    }

    fn publish_geo_weather(&self, report: &GeoWeatherReport) {
        if self.display.show_weather {
            self.write_line(&format_geo_weather(report));
        }
    }
}
