// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic heartbeat so the server can watch device health.
//!
//! Waits out an initial settle delay (the transport is usually still
//! connecting), then publishes a snapshot every period.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::bus::Bus;
use crate::hal::SystemMonitor;
use crate::mem::Pools;

/// Uplink topic for heartbeats.
pub const TOPIC_HEARTBEAT: &str = "telemetry/heartbeat";

/// Delay before the first heartbeat, letting the transport settle.
pub const INITIAL_DELAY: Duration = Duration::from_secs(5);

/// One heartbeat snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub device_id: String,
    pub wifi_rssi: i32,
    pub ip: String,
    pub temperature: f32,
    pub free_heap_internal: usize,
    pub free_heap_total: usize,
    pub uptime_s: u64,
}

/// Collect one snapshot from the monitor and the heap accounting.
pub fn snapshot(monitor: &Arc<dyn SystemMonitor>, pools: &Arc<Pools>, uptime: Duration) -> Heartbeat {
    Heartbeat {
        device_id: monitor.mac(),
        wifi_rssi: monitor.rssi(),
        ip: monitor.ip(),
        temperature: monitor.temperature_c(),
        free_heap_internal: pools.free_internal(),
        free_heap_total: pools.free_total(),
        uptime_s: uptime.as_secs(),
    }
}

/// Spawn the heartbeat task (core 1, priority 2 on the device).
pub fn start(
    monitor: Arc<dyn SystemMonitor>,
    pools: Arc<Pools>,
    bus: Arc<Bus>,
    period: Duration,
    booted_at: Instant,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(INITIAL_DELAY) => {}
        }

        loop {
            let beat = snapshot(&monitor, &pools, booted_at.elapsed());
            match serde_json::to_string(&beat) {
                Ok(payload) => bus.publish_up(TOPIC_HEARTBEAT, &payload),
                Err(e) => tracing::warn!(err = %e, "heartbeat serialisation failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(period) => {}
            }
        }
    });
}

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;
