// SPDX-License-Identifier: MPL-2.0

//! Event loop driving the [`Scheduler`].
//!
//! The loop never awaits a sample or a lookup itself. Each due action is
//! spawned as its own task, guarded by a per-kind lock: when the previous
//! run of that kind still holds the lock the tick is skipped, and the other
//! kind is unaffected. A slow geo/weather lookup never delays network
//! sampling and vice versa.
//!
//! The one exception to skipping is a reconnect refresh. It is held until
//! the running lookup finishes, since that lookup most likely started while
//! offline.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::monitor::{GeoWeatherSource, MetricSampler, NetworkSnapshot};
use crate::render::PresentationSink;
use crate::scheduler::{Action, RefreshReason, Scheduler};

/// Observations fed back into the loop by the tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Connectivity changed; `true` means the network came back.
    Connectivity(bool),
}

/// Sampler plus the last reachability it reported.
struct NetworkProbe<M> {
    sampler: M,
    reachable: Option<bool>,
}

impl<M: MetricSampler> NetworkProbe<M> {
    async fn run<P: PresentationSink>(
        &mut self,
        sink: &P,
        events: &mpsc::Sender<Event>,
        cancel: &CancellationToken,
    ) {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = self.sampler.sample() => result,
        };
        let snapshot = result.unwrap_or_else(|e| {
            warn!("network sample failed: {e}");
            NetworkSnapshot::unavailable()
        });
        sink.publish_network(&snapshot);

        // The first observation is only a baseline.
        let previous = self.reachable.replace(snapshot.reachable);
        if previous.is_some_and(|was| was != snapshot.reachable) {
            let _ = events.send(Event::Connectivity(snapshot.reachable)).await;
        }
    }
}

async fn refresh_geo_weather<G, P>(
    source: &G,
    sink: &P,
    reason: RefreshReason,
    cancel: &CancellationToken,
) where
    G: GeoWeatherSource,
    P: PresentationSink,
{
    debug!("geo/weather refresh ({reason:?})");
    let report = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        report = source.refresh() => report,
    };
    debug!("geo/weather attempts: {:?}", report.attempts);
    sink.publish_geo_weather(&report);
}

/// Geo/weather lookups run one at a time. A reconnect refresh that arrives
/// while one is in flight is held and started as soon as it finishes.
struct GeoWeatherSlot<G> {
    source: Arc<G>,
    busy: Arc<Mutex<()>>,
    deferred: bool,
}

impl<G: GeoWeatherSource + 'static> GeoWeatherSlot<G> {
    fn new(source: Arc<G>) -> Self {
        Self {
            source,
            busy: Arc::new(Mutex::new(())),
            deferred: false,
        }
    }

    fn dispatch<P: PresentationSink + 'static>(
        &mut self,
        reason: RefreshReason,
        tasks: &mut JoinSet<()>,
        sink: &Arc<P>,
        cancel: &CancellationToken,
    ) {
        let Ok(guard) = Arc::clone(&self.busy).try_lock_owned() else {
            if reason == RefreshReason::Reconnected {
                debug!("geo/weather refresh still running, reconnect refresh deferred");
                self.deferred = true;
            } else {
                debug!("geo/weather refresh still running, skipping tick");
            }
            return;
        };
        self.deferred = false;
        let source = Arc::clone(&self.source);
        let sink = Arc::clone(sink);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            refresh_geo_weather(source.as_ref(), sink.as_ref(), reason, &cancel).await;
            drop(guard);
        });
    }

    /// Start a held reconnect refresh if the slot has freed up.
    fn resume<P: PresentationSink + 'static>(
        &mut self,
        tasks: &mut JoinSet<()>,
        sink: &Arc<P>,
        cancel: &CancellationToken,
    ) {
        if self.deferred {
            self.dispatch(RefreshReason::Reconnected, tasks, sink, cancel);
        }
    }
}

pub struct Runtime<M, G, P> {
    scheduler: Scheduler,
    sampler: M,
    source: Arc<G>,
    sink: Arc<P>,
}

impl<M, G, P> Runtime<M, G, P>
where
    M: MetricSampler + 'static,
    G: GeoWeatherSource + 'static,
    P: PresentationSink + 'static,
{
    pub fn new(scheduler: Scheduler, sampler: M, source: Arc<G>, sink: Arc<P>) -> Self {
        Self {
            scheduler,
            sampler,
            source,
            sink,
        }
    }

    pub fn from_config(config: &Config, sampler: M, source: Arc<G>, sink: Arc<P>) -> Self {
        Self::new(
            Scheduler::from_config(config, Instant::now()),
            sampler,
            source,
            sink,
        )
    }

    /// Run until `cancel` fires. Both refreshes run immediately on start.
    pub async fn run(self, cancel: CancellationToken) {
        let Self {
            mut scheduler,
            sampler,
            source,
            sink,
        } = self;

        let network = Arc::new(Mutex::new(NetworkProbe {
            sampler,
            reachable: None,
        }));
        let mut geo_weather = GeoWeatherSlot::new(source);
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let mut tasks = JoinSet::new();

        info!("monitor started");
        loop {
            let deadline = scheduler.next_deadline();
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                Some(event) = events_rx.recv() => match event {
                    Event::Connectivity(online) => {
                        scheduler.on_connectivity_change(online, Instant::now());
                        if !online {
                            geo_weather.deferred = false;
                        }
                    }
                },

                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        warn!("refresh task failed: {e}");
                    }
                    geo_weather.resume(&mut tasks, &sink, &cancel);
                }

                () = sleep_until(deadline) => {
                    for action in scheduler.poll(Instant::now()) {
                        match action {
                            Action::SampleNetwork => {
                                let Ok(mut probe) = Arc::clone(&network).try_lock_owned() else {
                                    debug!("network sample still running, skipping tick");
                                    continue;
                                };
                                let sink = Arc::clone(&sink);
                                let events = events_tx.clone();
                                let cancel = cancel.clone();
                                tasks.spawn(async move {
                                    probe.run(sink.as_ref(), &events, &cancel).await;
                                });
                            }
                            Action::RefreshGeoWeather(reason) => {
                                geo_weather.dispatch(reason, &mut tasks, &sink, &cancel);
                            }
                        }
                    }
                }
            }
        }

        // Tasks finishing now must not wait on a loop that has stopped.
        drop(events_rx);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("refresh task failed: {e}");
            }
        }
        info!("monitor stopped");
    }
}

/// One network sample and one geo/weather refresh, run concurrently.
pub async fn run_once<M, G, P>(sampler: &mut M, source: &G, sink: &P)
where
    M: MetricSampler,
    G: GeoWeatherSource,
    P: PresentationSink,
{
    let (network, report) = tokio::join!(sampler.sample(), source.refresh());
    let snapshot = network.unwrap_or_else(|e| {
        warn!("network sample failed: {e}");
        NetworkSnapshot::unavailable()
    });
    sink.publish_network(&snapshot);
    sink.publish_geo_weather(&report);
}
