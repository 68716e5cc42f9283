// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot orchestrator.
//!
//! The start-up order is a contract, not a convenience: the Wi-Fi driver
//! permanently fragments fast SRAM when it comes up, so every large
//! contiguous internal allocation (display frame slice, I²S DMA ring, PCM
//! capture buffer) must be reserved first. Reordering these steps bricks
//! the audio path on real hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;

use crate::audio::Audio;
use crate::bus::Bus;
use crate::config::Config;
use crate::hal::{Backlight, Hal};
use crate::mem::{PoolBuf, Pools, Region};
use crate::transport::{Transport, TransportHandle};
use crate::ui::Ui;
use crate::{imu, provision, telemetry};

/// Single-buffered display frame slice (ten panel lines of RGB565),
/// reserved from fast SRAM before anything else runs.
pub const DISPLAY_FRAME_BYTES: usize = 466 * 10 * 2;

/// UI timer period; drives animations, fades, and particle frames.
pub const UI_TICK: Duration = Duration::from_millis(33);

/// Screen-sleep check period.
const SLEEP_CHECK: Duration = Duration::from_millis(500);

/// Downlink topics subscribed during boot.
pub const TOPIC_LAYOUT: &str = "ui/layout";
pub const TOPIC_UPDATE: &str = "ui/update";

/// Local topics fired by `local://` action URIs.
pub const TOPIC_RECORD_START: &str = "audio/cmd/record_start";
pub const TOPIC_RECORD_STOP: &str = "audio/cmd/record_stop";

/// First screen, shown while the network comes up.
const LOADING_LAYOUT: &str = r##"[
  {"type":"label","id":"boot_status","text":"Connecting...","font_size":20,"text_color":"#FFFFFF",
   "anim":{"type":"breathe","duration":800}}
]"##;

/// Screen shown while the provisioning portal is up.
const PROVISION_LAYOUT: &str = r##"[
  {"type":"label","text":"Setup required","font_size":24,"text_color":"#FFFFFF"},
  {"type":"label","text":"Join the device hotspot to configure Wi-Fi","font_size":16,"text_color":"#AAAAAA"}
]"##;

/// How a completed `run` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Provisioning captured credentials; the caller soft-restarts.
    Restart,
    /// Normal shutdown.
    Shutdown,
}

/// A fully started device runtime. Dropping it does not stop the tasks;
/// cancel the token for that.
pub struct Runtime {
    pub bus: Arc<Bus>,
    pub ui: Arc<Ui>,
    pub audio: Arc<Audio>,
    pub pools: Arc<Pools>,
    pub link: TransportHandle,
    pub cancel: CancellationToken,
    pub booted_at: Instant,
    /// Held for the life of the process, like the panel driver holds it.
    _display_frame: PoolBuf,
}

/// Result of one boot attempt.
pub enum Started {
    Running(Box<Runtime>),
    /// The provisioning branch ran to completion instead.
    Reprovisioned,
}

/// Boot and block until shutdown or a provisioning restart.
pub async fn run(config: &Config, hal: Hal) -> anyhow::Result<BootOutcome> {
    let cancel = CancellationToken::new();
    match start(config, hal, cancel.clone()).await? {
        Started::Reprovisioned => Ok(BootOutcome::Restart),
        Started::Running(_runtime) => {
            tokio::signal::ctrl_c().await.context("signal wait")?;
            cancel.cancel();
            Ok(BootOutcome::Shutdown)
        }
    }
}

/// The ordered start-up sequence. Extracted from [`run`] so the test
/// harness can drive a booted runtime in-process.
pub async fn start(config: &Config, hal: Hal, cancel: CancellationToken) -> anyhow::Result<Started> {
    let booted_at = Instant::now();

    // 1. Display and SPI DMA: the frame slice comes out of pristine fast
    //    SRAM and is never returned.
    let pools = Pools::new(config.internal_heap, config.psram_heap);
    let display_frame = pools
        .alloc(Region::Internal, DISPLAY_FRAME_BYTES, "display_frame")
        .context("display frame slice: fast sram exhausted at boot")?;

    // 2. Layout engine up, first loading screen on.
    let (transport, uplink) = Transport::channel();
    let link = uplink.clone();
    let bus = Arc::new(Bus::new(uplink));
    let recording = Arc::new(AtomicBool::new(false));
    let ui = Ui::new(Arc::clone(&bus), Arc::clone(&pools), Arc::clone(&recording));
    ui.init();
    ui.render(LOADING_LAYOUT);
    spawn_ui_timer(Arc::clone(&ui), booted_at, cancel.clone());

    // 3. Provisioning branch: no credentials, no cloud. The portal blocks
    //    until the form lands, then the caller restarts us.
    let provisioned = hal.kv.get("ssid").map(|s| !s.is_empty()).unwrap_or(false);
    if !provisioned {
        tracing::info!("no credentials, entering provisioning");
        ui.render(PROVISION_LAYOUT);
        provision::run_portal(config.portal_port, Arc::clone(&hal.kv), cancel.clone()).await?;
        return Ok(Started::Reprovisioned);
    }

    // 4. Bus is ready for subscribers (it existed earlier so the engine
    //    could bind to it, but nothing routes before this point).

    // 5. Audio before Wi-Fi: the I²S DMA ring and the PCM capture buffer
    //    need contiguous fast SRAM.
    let audio = Audio::start(
        Arc::clone(&hal.codec),
        Arc::clone(&bus),
        Arc::clone(&pools),
        Arc::clone(&recording),
        cancel.clone(),
    )?;

    // 6. Downlink and local subscriptions, before any frame can arrive.
    {
        let ui = Arc::clone(&ui);
        bus.subscribe(TOPIC_LAYOUT, move |payload| ui.render(payload));
    }
    {
        let ui = Arc::clone(&ui);
        bus.subscribe(TOPIC_UPDATE, move |payload| ui.update(payload));
    }
    {
        let audio = Arc::clone(&audio);
        bus.subscribe(TOPIC_RECORD_START, move |_| audio.record_start());
    }
    {
        let audio = Arc::clone(&audio);
        bus.subscribe(TOPIC_RECORD_STOP, move |_| audio.record_stop());
    }

    // 7. Wi-Fi station up. Large contiguous fast-SRAM allocations are
    //    expected to fail from here on.
    let ssid = hal.kv.get("ssid").unwrap_or_default();
    let password = hal.kv.get("password").unwrap_or_default();
    hal.wifi.connect(&ssid, &password).context("wifi sta connect")?;
    pools.note_wifi_started();

    // 8. Cloud link and sensor tasks.
    let ws_url = config
        .ws_url
        .clone()
        .or_else(|| hal.kv.get("ws_url"))
        .filter(|u| !u.is_empty())
        .context("no server URL configured or provisioned")?;
    {
        let bus = Arc::clone(&bus);
        transport.start(ws_url, move |text| bus.route_down(text), cancel.clone());
    }
    imu::start(Arc::clone(&hal.accel), Arc::clone(&bus), cancel.clone());
    telemetry::start(
        Arc::clone(&hal.monitor),
        Arc::clone(&pools),
        Arc::clone(&bus),
        config.telemetry_period(),
        booted_at,
        cancel.clone(),
    );

    // 9. Screen-sleep timer.
    spawn_screen_sleep(
        Arc::clone(&ui),
        Arc::clone(&hal.backlight),
        config.screen_sleep(),
        booted_at,
        cancel.clone(),
    );

    tracing::info!(elapsed_ms = booted_at.elapsed().as_millis() as u64, "boot complete");
    Ok(Started::Running(Box::new(Runtime {
        bus,
        ui,
        audio,
        pools,
        link,
        cancel,
        booted_at,
        _display_frame: display_frame,
    })))
}

/// UI timer task (core 0, priority 5 on the device). Owns the scene clock.
fn spawn_ui_timer(ui: Arc<Ui>, booted_at: Instant, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(UI_TICK) => {}
            }
            ui.tick(booted_at.elapsed().as_millis() as u64);
        }
    });
}

/// Backlight duty: off after the inactivity window, restored on input.
fn spawn_screen_sleep(
    ui: Arc<Ui>,
    backlight: Arc<dyn Backlight>,
    timeout: Duration,
    booted_at: Instant,
    cancel: CancellationToken,
) {
    let activity = ui.activity();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(SLEEP_CHECK) => {}
            }
            let now_ms = booted_at.elapsed().as_millis() as u64;
            let idle_ms = now_ms.saturating_sub(activity.load(Ordering::Acquire));
            if idle_ms >= timeout.as_millis() as u64 {
                backlight.set_percent(0);
            } else {
                backlight.set_percent(100);
            }
        }
    });
}
