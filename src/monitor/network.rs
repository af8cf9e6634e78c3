// SPDX-License-Identifier: MPL-2.0

//! # Network Quality Sampling
//!
//! Produces one [`NetworkSnapshot`] per call:
//!
//! - **Latency / packet loss**: one `ping` to the default gateway (or the
//!   configured target) per sample, averaged over a rolling window.
//! - **Throughput**: deltas of the cumulative interface byte counters from
//!   `sysinfo`, loopback excluded.
//!
//! The two measurements keep separate bookkeeping. Throughput has its own
//! last-reading timestamp; the probe window is advanced on every sample
//! regardless of how long ago the counters were read.

use std::collections::VecDeque;
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::Serialize;
use sysinfo::Networks;

use crate::config::Config;
use crate::error::ProbeError;

const FALLBACK_TARGET: &str = "8.8.8.8";
/// 100 MB/s expressed in KB/s.
const MAX_RATE_KBPS: f64 = 102_400.0;
/// Counter readings closer together than this reuse the previous rates.
const MIN_RATE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Good,
    Fair,
    Poor,
}

impl NetworkStatus {
    /// Above 100 ms or 5% loss is poor, above 50 ms or 2% is fair.
    /// No reply in the whole window is poor.
    pub fn classify(latency_ms: Option<u32>, packet_loss_pct: f64) -> Self {
        match latency_ms {
            None => Self::Poor,
            Some(latency) if latency > 100 || packet_loss_pct > 5.0 => Self::Poor,
            Some(latency) if latency > 50 || packet_loss_pct > 2.0 => Self::Fair,
            Some(_) => Self::Good,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

/// One network measurement. Superseded, never merged, by the next one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSnapshot {
    /// Average round trip over the window; `None` when nothing answered.
    pub latency_ms: Option<u32>,
    pub download_kbps: f64,
    pub upload_kbps: f64,
    pub packet_loss_pct: f64,
    pub status: NetworkStatus,
    /// Whether the most recent probe got a reply.
    pub reachable: bool,
}

impl NetworkSnapshot {
    /// Snapshot published when sampling failed outright.
    pub fn unavailable() -> Self {
        Self {
            latency_ms: None,
            download_kbps: 0.0,
            upload_kbps: 0.0,
            packet_loss_pct: 0.0,
            status: NetworkStatus::Poor,
            reachable: false,
        }
    }
}

/// Something that can take a fresh network measurement.
pub trait MetricSampler: Send {
    fn sample(&mut self) -> impl Future<Output = Result<NetworkSnapshot, ProbeError>> + Send;
}

/// Result of one ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    Reply { latency_ms: u32 },
    Lost,
}

/// Rolling window of probe outcomes.
#[derive(Debug, Clone)]
pub struct ProbeWindow {
    capacity: usize,
    samples: VecDeque<PingOutcome>,
}

impl ProbeWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, outcome: PingOutcome) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(outcome);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average_latency(&self) -> Option<u32> {
        let replies: Vec<u64> = self
            .samples
            .iter()
            .filter_map(|s| match s {
                PingOutcome::Reply { latency_ms } => Some(u64::from(*latency_ms)),
                PingOutcome::Lost => None,
            })
            .collect();
        if replies.is_empty() {
            return None;
        }
        let avg = replies.iter().sum::<u64>() / replies.len() as u64;
        Some(u32::try_from(avg).unwrap_or(u32::MAX))
    }

    pub fn packet_loss_pct(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let lost = self
            .samples
            .iter()
            .filter(|s| matches!(s, PingOutcome::Lost))
            .count();
        lost as f64 / self.samples.len() as f64 * 100.0
    }
}

/// Cumulative byte counters at one point in time.
#[derive(Debug, Clone, Copy)]
struct CounterReading {
    received: u64,
    transmitted: u64,
    at: Instant,
}

/// KB/s between two cumulative counter values.
///
/// A counter that went backwards was reset, so the current value is the
/// delta. Rates are capped at 100 MB/s.
pub fn rate_kbps(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs < 0.1 {
        return 0.0;
    }
    let delta = if current >= previous {
        current - previous
    } else {
        current
    };
    (delta as f64 / elapsed_secs / 1024.0).min(MAX_RATE_KBPS)
}

/// Interpret `ping` output from Linux, macOS or Windows (English or Chinese).
pub fn parse_ping_output(stdout: &str) -> Result<PingOutcome, ProbeError> {
    const LOST_MARKERS: &[&str] = &[
        "Destination host unreachable",
        "Destination Host Unreachable",
        "Request timed out",
        "General failure",
        "could not find host",
        "100% loss",
        "100% packet loss",
        " 0 received",
        "请求超时",
        "无法访问目标主机",
    ];
    if LOST_MARKERS.iter().any(|m| stdout.contains(m)) {
        return Ok(PingOutcome::Lost);
    }

    for line in stdout.lines() {
        for marker in ["time=", "time<", "时间=", "时间<"] {
            let Some((_, rest)) = line.split_once(marker) else {
                continue;
            };
            let number: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if let Ok(ms) = number.parse::<f64>() {
                // "time<1ms" is reported as 1.
                let latency_ms = (ms.round() as u32).max(1);
                return Ok(PingOutcome::Reply { latency_ms });
            }
        }
    }

    if stdout.contains("bytes=") && stdout.contains("TTL=") {
        return Ok(PingOutcome::Reply { latency_ms: 1 });
    }

    Err(ProbeError::Parse(
        stdout.lines().next().unwrap_or_default().to_owned(),
    ))
}

/// Default gateway from the text of `/proc/net/route`.
///
/// Addresses in that file are little-endian hex.
pub fn parse_proc_net_route(table: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (destination, gateway) = (fields.get(1)?, fields.get(2)?);
        if *destination != "00000000" {
            return None;
        }
        let raw = u32::from_str_radix(gateway, 16).ok()?;
        let addr = Ipv4Addr::from(raw.to_le_bytes());
        (!addr.is_unspecified()).then_some(addr)
    })
}

#[cfg(target_os = "linux")]
async fn default_gateway() -> Option<String> {
    let table = tokio::fs::read_to_string("/proc/net/route").await.ok()?;
    parse_proc_net_route(&table).map(|addr| addr.to_string())
}

#[cfg(windows)]
async fn default_gateway() -> Option<String> {
    let mut cmd = tokio::process::Command::new("powershell");
    cmd.args([
        "-NoProfile",
        "-NonInteractive",
        "-Command",
        "(Get-NetRoute -DestinationPrefix '0.0.0.0/0' | Select-Object -First 1).NextHop",
    ]);
    cmd.creation_flags(CREATE_NO_WINDOW);
    let output = cmd.output().await.ok()?;
    let ip = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    ip.parse::<Ipv4Addr>().ok().map(|_| ip)
}

#[cfg(not(any(target_os = "linux", windows)))]
async fn default_gateway() -> Option<String> {
    None
}

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

fn ping_command(target: &str, timeout: Duration) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("ping");
    #[cfg(windows)]
    {
        let wait_ms = timeout.as_millis().to_string();
        cmd.args(["-n", "1", "-w", wait_ms.as_str(), target]);
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(target_os = "macos")]
    {
        let wait_ms = timeout.as_millis().to_string();
        cmd.args(["-c", "1", "-W", wait_ms.as_str(), target]);
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        let wait_secs = timeout.as_secs().max(1).to_string();
        cmd.args(["-c", "1", "-W", wait_secs.as_str(), target]);
    }
    cmd.kill_on_drop(true);
    cmd
}

/// Send one ping to `target`.
pub async fn ping(target: &str, timeout: Duration) -> Result<PingOutcome, ProbeError> {
    let command = format!("ping {target}");
    // Give ping its own deadline first; ours only catches a hung process.
    let output = tokio::time::timeout(timeout + Duration::from_secs(1), ping_command(target, timeout).output())
        .await
        .map_err(|_| ProbeError::Timeout {
            target: target.to_owned(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })?
        .map_err(|e| ProbeError::CommandFailed {
            command: command.clone(),
            reason: e.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!("ping output: {}", stdout.trim());
    match parse_ping_output(&stdout) {
        Ok(outcome) => Ok(outcome),
        // Non-zero exit without a recognisable reply means nothing came back.
        Err(_) if !output.status.success() && !stdout.trim().is_empty() => Ok(PingOutcome::Lost),
        Err(_) if !output.status.success() => Err(ProbeError::CommandFailed {
            command,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        }),
        Err(e) => Err(e),
    }
}

/// Samples latency, packet loss and throughput of this machine.
pub struct NetworkMonitor {
    networks: Networks,
    last_reading: Option<CounterReading>,
    download_kbps: f64,
    upload_kbps: f64,
    window: ProbeWindow,
    configured_target: Option<String>,
    gateway: Option<String>,
    timeout: Duration,
}

impl NetworkMonitor {
    pub fn new(configured_target: Option<String>, window: usize, timeout: Duration) -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            last_reading: None,
            download_kbps: 0.0,
            upload_kbps: 0.0,
            window: ProbeWindow::new(window),
            configured_target,
            gateway: None,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ping_target.clone(), config.sample_window, config.ping_timeout())
    }

    fn read_counters(&mut self) -> CounterReading {
        self.networks.refresh();
        let mut received = 0u64;
        let mut transmitted = 0u64;
        for (name, data) in &self.networks {
            if name == "lo" || name.starts_with("Loopback") {
                continue;
            }
            received = received.saturating_add(data.total_received());
            transmitted = transmitted.saturating_add(data.total_transmitted());
        }
        CounterReading {
            received,
            transmitted,
            at: Instant::now(),
        }
    }

    fn update_throughput(&mut self) {
        let current = self.read_counters();
        match self.last_reading {
            None => {
                // First reading only establishes the baseline.
                self.last_reading = Some(current);
            }
            Some(previous) => {
                let elapsed = current.at.duration_since(previous.at);
                if elapsed < MIN_RATE_INTERVAL {
                    return;
                }
                let secs = elapsed.as_secs_f64();
                self.download_kbps = rate_kbps(previous.received, current.received, secs);
                self.upload_kbps = rate_kbps(previous.transmitted, current.transmitted, secs);
                self.last_reading = Some(current);
            }
        }
    }

    async fn probe_target(&mut self) -> String {
        if let Some(target) = &self.configured_target {
            return target.clone();
        }
        if self.gateway.is_none() {
            self.gateway = default_gateway().await;
            match &self.gateway {
                Some(gateway) => debug!("probing default gateway {gateway}"),
                None => debug!("no default gateway found, probing {FALLBACK_TARGET}"),
            }
        }
        self.gateway
            .clone()
            .unwrap_or_else(|| String::from(FALLBACK_TARGET))
    }

    /// One probe, pushed into the window. A probe that could not run at all
    /// counts as lost.
    async fn probe(&mut self) -> PingOutcome {
        let target = self.probe_target().await;
        let outcome = ping(&target, self.timeout).await.unwrap_or_else(|e| {
            warn!("{e}");
            PingOutcome::Lost
        });
        if outcome == PingOutcome::Lost {
            // The machine may have moved to another network.
            self.gateway = None;
        }
        self.window.push(outcome);
        outcome
    }
}

impl MetricSampler for NetworkMonitor {
    async fn sample(&mut self) -> Result<NetworkSnapshot, ProbeError> {
        self.update_throughput();
        let outcome = self.probe().await;

        let latency_ms = self.window.average_latency();
        let packet_loss_pct = self.window.packet_loss_pct();
        Ok(NetworkSnapshot {
            latency_ms,
            download_kbps: self.download_kbps,
            upload_kbps: self.upload_kbps,
            packet_loss_pct,
            status: NetworkStatus::classify(latency_ms, packet_loss_pct),
            reachable: matches!(outcome, PingOutcome::Reply { .. }),
        })
    }
}
