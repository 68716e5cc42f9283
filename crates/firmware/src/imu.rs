// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shake detection from the accelerometer.
//!
//! A 10 Hz polling task feeds samples through a threshold detector; a shake
//! publishes once on the `motion` uplink and then holds off for a ten-sample
//! cooldown so one physical gesture is one event.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::bus::Bus;
use crate::hal::Accelerometer;

/// Uplink topic for motion events.
pub const TOPIC_MOTION: &str = "motion";

/// Shake threshold, ≈1.5 g in m/s².
pub const SHAKE_THRESHOLD: f32 = 14.7;

/// Samples to swallow after a shake fires.
pub const COOLDOWN_SAMPLES: u32 = 10;

/// Accelerometer poll period.
pub const POLL_PERIOD: Duration = Duration::from_millis(100);

/// Vector magnitude of one accelerometer sample.
pub fn magnitude(sample: [f32; 3]) -> f32 {
    let [x, y, z] = sample;
    (x * x + y * y + z * z).sqrt()
}

/// Threshold detector with a per-event cooldown.
#[derive(Debug, Default)]
pub struct ShakeDetector {
    cooldown: u32,
}

impl ShakeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample magnitude; `true` when a shake event should fire.
    pub fn feed(&mut self, magnitude: f32) -> bool {
        if self.cooldown > 0 {
            self.cooldown -= 1;
            return false;
        }
        if magnitude > SHAKE_THRESHOLD {
            self.cooldown = COOLDOWN_SAMPLES;
            return true;
        }
        false
    }
}

/// Spawn the polling task (either core, priority 5 on the device).
///
/// Sensor init failure logs and ends the task; there are no retries.
pub fn start(accel: Arc<dyn Accelerometer>, bus: Arc<Bus>, cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = accel.init() {
            tracing::error!(err = %e, "imu init failed, task exiting");
            return;
        }

        let mut detector = ShakeDetector::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(POLL_PERIOD) => {}
            }

            match accel.read() {
                Ok(sample) => {
                    let mag = magnitude(sample);
                    if detector.feed(mag) {
                        tracing::debug!(magnitude = mag, "shake detected");
                        let payload =
                            serde_json::json!({ "type": "shake", "magnitude": mag }).to_string();
                        bus.publish_up(TOPIC_MOTION, &payload);
                    }
                }
                Err(e) => tracing::debug!(err = %e, "accelerometer read failed"),
            }
        }
    });
}

#[cfg(test)]
#[path = "imu_tests.rs"]
mod tests;
