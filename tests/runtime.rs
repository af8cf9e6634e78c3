// SPDX-License-Identifier: MPL-2.0

// Event loop timing on a paused clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use netweather_monitor::error::ProbeError;
use netweather_monitor::monitor::{
    GeoWeatherReport, GeoWeatherSource, LocationSnapshot, MetricSampler, NetworkSnapshot,
    NetworkStatus, WeatherSnapshot,
};
use netweather_monitor::render::PresentationSink;
use netweather_monitor::runtime::{Runtime, run_once};
use netweather_monitor::scheduler::Scheduler;

// ── Fakes ───────────────────────────────────────────────────────────

/// Replays a reachability script, repeating the last entry.
struct ScriptedSampler {
    script: Vec<bool>,
    next: usize,
}

impl ScriptedSampler {
    fn new(script: &[bool]) -> Self {
        Self {
            script: script.to_vec(),
            next: 0,
        }
    }
}

impl MetricSampler for ScriptedSampler {
    async fn sample(&mut self) -> Result<NetworkSnapshot, ProbeError> {
        let reachable = self.script[self.next.min(self.script.len() - 1)];
        self.next += 1;
        if !reachable {
            return Err(ProbeError::Timeout {
                target: String::from("192.168.1.1"),
                timeout_ms: 2000,
            });
        }
        Ok(NetworkSnapshot {
            latency_ms: Some(3),
            download_kbps: 10.0,
            upload_kbps: 2.0,
            packet_loss_pct: 0.0,
            status: NetworkStatus::Good,
            reachable,
        })
    }
}

/// Records when each refresh started; each one takes `delay`.
struct SlowSource {
    start: Instant,
    delay: Duration,
    started: Mutex<Vec<Duration>>,
}

impl SlowSource {
    fn new(start: Instant, delay: Duration) -> Self {
        Self {
            start,
            delay,
            started: Mutex::new(Vec::new()),
        }
    }

    fn started(&self) -> Vec<Duration> {
        self.started.lock().unwrap().clone()
    }
}

impl GeoWeatherSource for SlowSource {
    async fn refresh(&self) -> GeoWeatherReport {
        self.started.lock().unwrap().push(self.start.elapsed());
        tokio::time::sleep(self.delay).await;
        GeoWeatherReport {
            location: LocationSnapshot::unknown(),
            weather: WeatherSnapshot::default(),
            is_default_location: true,
            attempts: Vec::new(),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    network: Mutex<Vec<NetworkSnapshot>>,
    geo_weather: Mutex<usize>,
}

impl PresentationSink for RecordingSink {
    fn publish_network(&self, snapshot: &NetworkSnapshot) {
        self.network.lock().unwrap().push(snapshot.clone());
    }

    fn publish_geo_weather(&self, _report: &GeoWeatherReport) {
        *self.geo_weather.lock().unwrap() += 1;
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

async fn run_for(
    scheduler: Scheduler,
    sampler: ScriptedSampler,
    source: Arc<SlowSource>,
    sink: Arc<RecordingSink>,
    duration: Duration,
) {
    let cancel = CancellationToken::new();
    let runtime = Runtime::new(scheduler, sampler, source, sink);
    let handle = tokio::spawn(runtime.run(cancel.clone()));
    tokio::time::sleep(duration).await;
    cancel.cancel();
    handle.await.unwrap();
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn reconnect_refreshes_geo_weather_after_the_debounce() {
    let start = Instant::now();
    let source = Arc::new(SlowSource::new(start, Duration::ZERO));
    let sink = Arc::new(RecordingSink::default());

    // Up at 0s, down at 5s, back at 10s.
    run_for(
        Scheduler::new(secs(5), secs(600), secs(5), start),
        ScriptedSampler::new(&[true, false, true]),
        Arc::clone(&source),
        Arc::clone(&sink),
        secs(31),
    )
    .await;

    assert_eq!(source.started(), vec![secs(0), secs(15)]);
    assert_eq!(*sink.geo_weather.lock().unwrap(), 2);

    let network = sink.network.lock().unwrap();
    assert_eq!(network.len(), 7);
    assert!(!network[1].reachable);
    assert_eq!(network[1].latency_ms, None);
    assert!(network[2].reachable);
}

#[tokio::test(start_paused = true)]
async fn slow_geo_weather_never_delays_network_sampling() {
    let start = Instant::now();
    let source = Arc::new(SlowSource::new(start, secs(25)));
    let sink = Arc::new(RecordingSink::default());

    run_for(
        Scheduler::new(secs(5), secs(10), secs(5), start),
        ScriptedSampler::new(&[true]),
        Arc::clone(&source),
        Arc::clone(&sink),
        secs(31),
    )
    .await;

    // Ticks at 10s and 20s find the worker busy and are skipped.
    assert_eq!(source.started(), vec![secs(0), secs(30)]);
    assert_eq!(*sink.geo_weather.lock().unwrap(), 1);
    assert_eq!(sink.network.lock().unwrap().len(), 7);
}

#[tokio::test(start_paused = true)]
async fn reconnect_during_a_slow_refresh_runs_once_it_finishes() {
    let start = Instant::now();
    let source = Arc::new(SlowSource::new(start, secs(20)));
    let sink = Arc::new(RecordingSink::default());

    // Back online at 10s; the debounce settles at 15s while the lookup
    // started at 0s is still running until 20s.
    run_for(
        Scheduler::new(secs(5), secs(600), secs(5), start),
        ScriptedSampler::new(&[true, false, true]),
        Arc::clone(&source),
        Arc::clone(&sink),
        secs(120),
    )
    .await;

    assert_eq!(source.started(), vec![secs(0), secs(20)]);
    assert_eq!(*sink.geo_weather.lock().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn steady_connectivity_never_triggers_extra_refreshes() {
    let start = Instant::now();
    let source = Arc::new(SlowSource::new(start, Duration::ZERO));
    let sink = Arc::new(RecordingSink::default());

    run_for(
        Scheduler::new(secs(5), secs(600), secs(5), start),
        ScriptedSampler::new(&[true]),
        Arc::clone(&source),
        Arc::clone(&sink),
        secs(61),
    )
    .await;

    assert_eq!(source.started(), vec![secs(0)]);
    assert_eq!(sink.network.lock().unwrap().len(), 13);
}

#[tokio::test(start_paused = true)]
async fn run_once_publishes_one_of_each() {
    let source = SlowSource::new(Instant::now(), secs(1));
    let sink = RecordingSink::default();
    let mut sampler = ScriptedSampler::new(&[false]);

    run_once(&mut sampler, &source, &sink).await;

    let network = sink.network.lock().unwrap();
    assert_eq!(network.len(), 1);
    assert_eq!(network[0], NetworkSnapshot::unavailable());
    assert_eq!(*sink.geo_weather.lock().unwrap(), 1);
}
