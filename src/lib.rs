// SPDX-License-Identifier: MPL-2.0

//! Network quality and public-IP weather monitor.
//!
//! A fast loop samples latency, packet loss and throughput; a slow loop
//! geolocates the public IP and fetches weather and local time for it.
//! Regaining connectivity triggers an early, debounced geo/weather refresh.

pub mod config;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod render;
pub mod runtime;
pub mod scheduler;

pub use config::Config;
