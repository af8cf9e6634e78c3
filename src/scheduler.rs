// SPDX-License-Identifier: MPL-2.0

//! Refresh scheduling.
//!
//! Each refresh action owns its own timing state:
//!
//! - network sampling: [`Cadence`] with a short period
//! - geo/weather lookup: [`Cadence`] with a long period
//! - reconnect refresh: [`Debounce`], cancel-and-replace on every online event
//! - log rotation: [`LineCadence`], counted in appended lines rather than time
//!
//! Nothing here performs I/O. The runtime asks [`Scheduler::poll`] which
//! actions are due and sleeps until [`Scheduler::next_deadline`].

use std::time::Duration;

use log::{debug, info};
use tokio::time::Instant;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// The periodic geo/weather timer elapsed.
    Scheduled,
    /// Connectivity came back and the debounce window went quiet.
    Reconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SampleNetwork,
    RefreshGeoWeather(RefreshReason),
}

/// A periodic action and the time it last ran.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    last_run: Option<Instant>,
    next_due: Instant,
}

impl Cadence {
    /// A cadence that is due immediately at `start`.
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            last_run: None,
            next_due: start,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn last_run(&self) -> Option<Instant> {
        self.last_run
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Record a run at `now`. The next run is one period later, so a late
    /// tick never causes a burst of catch-up runs.
    pub fn mark_run(&mut self, now: Instant) {
        self.last_run = Some(now);
        self.next_due = now + self.period;
    }

    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
        if let Some(last) = self.last_run {
            self.next_due = last + period;
        }
    }
}

/// Coalesces a burst of trigger events into one delayed action.
///
/// Every [`trigger`](Self::trigger) replaces the pending deadline, so only
/// the last event of a burst fires, one quiet window after it arrived.
#[derive(Debug, Clone)]
pub struct Debounce {
    window: Duration,
    pending: Option<Instant>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn trigger(&mut self, now: Instant) {
        if self.pending.is_some() {
            debug!("debounce: replacing pending deadline");
        }
        self.pending = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending
    }

    /// Consume the pending deadline if it has passed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(deadline) if now >= deadline => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

/// Counts appended lines and reports when a rotation check is due.
#[derive(Debug, Clone)]
pub struct LineCadence {
    every: u64,
    since_check: u64,
}

impl LineCadence {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            since_check: 0,
        }
    }

    /// Add `lines` appended lines; true when a check is due.
    pub fn record(&mut self, lines: u64) -> bool {
        self.since_check += lines;
        if self.since_check >= self.every {
            self.since_check = 0;
            true
        } else {
            false
        }
    }
}

/// Timing state for the network and geo/weather refreshes.
#[derive(Debug, Clone)]
pub struct Scheduler {
    network: Cadence,
    geo_weather: Cadence,
    reconnect: Debounce,
    online: Option<bool>,
}

impl Scheduler {
    pub fn new(
        network_period: Duration,
        geo_weather_period: Duration,
        reconnect_window: Duration,
        start: Instant,
    ) -> Self {
        Self {
            network: Cadence::new(network_period, start),
            geo_weather: Cadence::new(geo_weather_period, start),
            reconnect: Debounce::new(reconnect_window),
            online: None,
        }
    }

    pub fn from_config(config: &Config, start: Instant) -> Self {
        Self::new(
            config.network_interval(),
            config.geo_weather_interval(),
            config.reconnect_debounce(),
            start,
        )
    }

    pub fn network(&self) -> &Cadence {
        &self.network
    }

    pub fn geo_weather(&self) -> &Cadence {
        &self.geo_weather
    }

    pub fn pending_reconnect(&self) -> Option<Instant> {
        self.reconnect.deadline()
    }

    pub fn is_online(&self) -> Option<bool> {
        self.online
    }

    pub fn set_network_period(&mut self, period: Duration) {
        self.network.set_period(period);
    }

    pub fn set_geo_weather_period(&mut self, period: Duration) {
        self.geo_weather.set_period(period);
    }

    /// Mark a network sample as started if one is due.
    pub fn tick_network(&mut self, now: Instant) -> bool {
        if self.network.is_due(now) {
            self.network.mark_run(now);
            true
        } else {
            false
        }
    }

    /// Mark a geo/weather refresh as started if one is due, either from the
    /// periodic timer or from a settled reconnect.
    pub fn tick_geo_weather(&mut self, now: Instant) -> Option<RefreshReason> {
        let reason = if self.reconnect.fire(now) {
            RefreshReason::Reconnected
        } else if self.geo_weather.is_due(now) {
            RefreshReason::Scheduled
        } else {
            return None;
        };
        self.geo_weather.mark_run(now);
        Some(reason)
    }

    /// Feed a connectivity observation.
    ///
    /// Online events arm the reconnect refresh, replacing any pending one.
    /// Going offline drops a pending refresh since it would only fail.
    pub fn on_connectivity_change(&mut self, is_online: bool, now: Instant) {
        let previous = self.online.replace(is_online);
        if is_online {
            if previous != Some(true) {
                info!("connectivity restored");
            }
            self.reconnect.trigger(now);
        } else {
            if previous != Some(false) {
                info!("connectivity lost");
            }
            self.reconnect.cancel();
        }
    }

    /// Collect every action due at `now`, marking each as run.
    pub fn poll(&mut self, now: Instant) -> Vec<Action> {
        let mut due = Vec::new();
        if self.tick_network(now) {
            due.push(Action::SampleNetwork);
        }
        if let Some(reason) = self.tick_geo_weather(now) {
            due.push(Action::RefreshGeoWeather(reason));
        }
        due
    }

    /// The earliest instant at which [`poll`](Self::poll) has work.
    pub fn next_deadline(&self) -> Instant {
        let periodic = self.network.next_due().min(self.geo_weather.next_due());
        match self.reconnect.deadline() {
            Some(deadline) => periodic.min(deadline),
            None => periodic,
        }
    }
}
