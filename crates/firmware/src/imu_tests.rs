// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{magnitude, start, ShakeDetector, COOLDOWN_SAMPLES};
use crate::bus::Bus;
use crate::hal::sim::SimAccel;
use crate::hal::Accelerometer;

#[test]
fn magnitude_of_rest_is_one_g() {
    let mag = magnitude([0.0, 0.0, 9.81]);
    assert!((mag - 9.81).abs() < 0.001);
}

#[test]
fn magnitude_combines_axes() {
    let mag = magnitude([3.0, 4.0, 12.0]);
    assert!((mag - 13.0).abs() < 0.001);
}

#[test]
fn detector_fires_above_threshold() {
    let mut det = ShakeDetector::new();
    assert!(!det.feed(9.81));
    assert!(det.feed(16.0));
}

#[test]
fn detector_swallows_cooldown_samples() {
    let mut det = ShakeDetector::new();
    assert!(det.feed(16.0));

    // Ten further above-threshold samples are swallowed.
    for _ in 0..COOLDOWN_SAMPLES {
        assert!(!det.feed(16.0));
    }
    // The eleventh fires again.
    assert!(det.feed(16.0));
}

#[test]
fn cooldown_expires_even_when_quiet() {
    let mut det = ShakeDetector::new();
    assert!(det.feed(20.0));
    for _ in 0..COOLDOWN_SAMPLES {
        assert!(!det.feed(9.81));
    }
    assert!(det.feed(15.0));
}

#[tokio::test(start_paused = true)]
async fn task_publishes_exactly_one_event_per_gesture() -> anyhow::Result<()> {
    let (handle, mut uplink) = crate::transport::ws::connected_handle();
    let bus = Arc::new(Bus::new(handle));
    let accel = Arc::new(SimAccel::new());
    let cancel = CancellationToken::new();

    // One burst above threshold, then continued rattling inside the cooldown.
    for _ in 0..5 {
        accel.push_sample([0.0, 0.0, 16.0]);
    }

    start(Arc::clone(&accel) as Arc<dyn Accelerometer>, bus, cancel.clone());

    // Let a dozen poll periods elapse on the paused clock.
    for _ in 0..12 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let frame = uplink.try_recv()?;
    let parsed: serde_json::Value = serde_json::from_str(&frame)?;
    assert_eq!(parsed["topic"], "motion");
    assert_eq!(parsed["payload"]["type"], "shake");
    let mag = parsed["payload"]["magnitude"].as_f64().unwrap_or(0.0);
    assert!(mag > 14.7);

    assert!(uplink.try_recv().is_err(), "cooldown holds back the rest of the burst");
    cancel.cancel();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn init_failure_ends_task_silently() -> anyhow::Result<()> {
    let (handle, mut uplink) = crate::transport::ws::connected_handle();
    let bus = Arc::new(Bus::new(handle));
    let accel = Arc::new(SimAccel::new());
    accel.set_fail_init(true);
    accel.push_sample([0.0, 0.0, 20.0]);

    start(Arc::clone(&accel) as Arc<dyn Accelerometer>, bus, CancellationToken::new());
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(uplink.try_recv().is_err(), "a dead sensor publishes nothing");
    Ok(())
}
