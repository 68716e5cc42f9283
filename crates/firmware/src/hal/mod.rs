// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hardware seams consumed by the core.
//!
//! Panel init, codec I/O, the Wi-Fi stack, flash storage, and sensor queries
//! are external collaborators; the core only sees these traits. The binary
//! and the test suite inject the in-process simulators from [`sim`].

pub mod sim;

use std::sync::Arc;

/// Sample format the codec pair is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecSpec {
    pub sample_rate: u32,
    pub bits_per_sample: u8,
    pub speaker_channels: u8,
    pub mic_channels: u8,
}

/// Speaker and microphone codec pair behind the I²S driver.
///
/// `read` and `write` are blocking calls; the audio component runs them on
/// its own capture thread, never on the async runtime.
pub trait AudioCodec: Send + Sync {
    /// Open both devices. Called once during boot, while fast SRAM is still
    /// contiguous enough for the driver's DMA descriptors.
    fn open(&self, spec: CodecSpec) -> anyhow::Result<()>;

    /// Speaker output gain, 0-100.
    fn set_speaker_gain(&self, percent: u8);

    /// Microphone input gain, 0-100.
    fn set_mic_gain(&self, percent: u8);

    /// Blocking read of captured PCM into `buf`. Returns bytes read.
    fn read(&self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Blocking write of raw PCM to the speaker.
    fn write(&self, pcm: &[u8]) -> std::io::Result<()>;
}

/// Six-axis IMU, accelerometer part only.
pub trait Accelerometer: Send + Sync {
    fn init(&self) -> anyhow::Result<()>;

    /// One accelerometer sample in m/s² per axis.
    fn read(&self) -> anyhow::Result<[f32; 3]>;
}

/// Read-only system facts sourced from the SoC and the network stack.
pub trait SystemMonitor: Send + Sync {
    /// Device MAC as a hex string; doubles as the device identity.
    fn mac(&self) -> String;

    /// Current Wi-Fi RSSI in dBm.
    fn rssi(&self) -> i32;

    /// Current IPv4 address in dotted form.
    fn ip(&self) -> String;

    /// Chip temperature in °C.
    fn temperature_c(&self) -> f32;
}

/// Display backlight control.
pub trait Backlight: Send + Sync {
    fn set_percent(&self, percent: u8);
}

/// Persistent key-value namespace in flash.
///
/// Keys in use: `ssid`, `password`, `ws_url`. A non-empty `ssid` marks the
/// device provisioned.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Wi-Fi station control.
pub trait WifiControl: Send + Sync {
    /// Connect as a station and block until an address is acquired.
    fn connect(&self, ssid: &str, password: &str) -> anyhow::Result<()>;
}

/// The full set of hardware collaborators, injected into boot.
#[derive(Clone)]
pub struct Hal {
    pub codec: Arc<dyn AudioCodec>,
    pub accel: Arc<dyn Accelerometer>,
    pub monitor: Arc<dyn SystemMonitor>,
    pub backlight: Arc<dyn Backlight>,
    pub kv: Arc<dyn KvStore>,
    pub wifi: Arc<dyn WifiControl>,
}
