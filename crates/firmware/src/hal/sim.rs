// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process hardware simulators.
//!
//! Each simulator implements one seam from the parent module with just
//! enough behaviour for the runtime and the test suite: the codec paces
//! reads at roughly the real capture rate, the accelerometer replays
//! injected samples, and the key-value store optionally persists to a JSON
//! file so provisioning survives a soft restart.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    Accelerometer, AudioCodec, Backlight, CodecSpec, Hal, KvStore, SystemMonitor, WifiControl,
};
use crate::config::Config;

/// Build a fully simulated [`Hal`] from the runtime configuration.
pub fn simulated(config: &Config) -> Hal {
    let kv: Arc<dyn KvStore> = match config.kv_path {
        Some(ref path) => Arc::new(FileKv::open(path.clone())),
        None => Arc::new(MemKv::default()),
    };
    Hal {
        codec: Arc::new(SimCodec::new()),
        accel: Arc::new(SimAccel::new()),
        monitor: Arc::new(SimMonitor::new()),
        backlight: Arc::new(SimBacklight::new()),
        kv,
        wifi: Arc::new(SimWifi::new()),
    }
}

// -- Codec --------------------------------------------------------------------

/// Loopback codec: reads drain an injected capture queue (silence when
/// empty), writes accumulate for inspection. Reads are paced at roughly the
/// real-time rate of the opened spec so capture loops behave.
pub struct SimCodec {
    spec: Mutex<Option<CodecSpec>>,
    capture: Mutex<VecDeque<u8>>,
    played: Mutex<Vec<u8>>,
    speaker_gain: AtomicU8,
    mic_gain: AtomicU8,
    fail_reads: AtomicBool,
}

impl SimCodec {
    pub fn new() -> Self {
        Self {
            spec: Mutex::new(None),
            capture: Mutex::new(VecDeque::new()),
            played: Mutex::new(Vec::new()),
            speaker_gain: AtomicU8::new(0),
            mic_gain: AtomicU8::new(0),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Queue PCM bytes to be returned by subsequent reads.
    pub fn push_capture(&self, pcm: &[u8]) {
        self.capture.lock().extend(pcm.iter().copied());
    }

    /// Everything written to the speaker so far.
    pub fn played(&self) -> Vec<u8> {
        self.played.lock().clone()
    }

    pub fn speaker_gain(&self) -> u8 {
        self.speaker_gain.load(Ordering::Relaxed)
    }

    pub fn mic_gain(&self) -> u8 {
        self.mic_gain.load(Ordering::Relaxed)
    }

    /// Make every subsequent read fail, exercising the error backoff path.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    fn pace(&self, bytes: usize) {
        let spec = *self.spec.lock();
        if let Some(spec) = spec {
            let rate = spec.sample_rate as u64
                * u64::from(spec.mic_channels)
                * u64::from(spec.bits_per_sample / 8);
            if rate > 0 {
                std::thread::sleep(Duration::from_micros(bytes as u64 * 1_000_000 / rate));
            }
        }
    }
}

impl Default for SimCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioCodec for SimCodec {
    fn open(&self, spec: CodecSpec) -> anyhow::Result<()> {
        *self.spec.lock() = Some(spec);
        Ok(())
    }

    fn set_speaker_gain(&self, percent: u8) {
        self.speaker_gain.store(percent, Ordering::Relaxed);
    }

    fn set_mic_gain(&self, percent: u8) {
        self.mic_gain.store(percent, Ordering::Relaxed);
    }

    fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(std::io::Error::other("codec read fault"));
        }
        self.pace(buf.len());
        let mut queue = self.capture.lock();
        for slot in buf.iter_mut() {
            *slot = queue.pop_front().unwrap_or(0);
        }
        Ok(buf.len())
    }

    fn write(&self, pcm: &[u8]) -> std::io::Result<()> {
        self.played.lock().extend_from_slice(pcm);
        Ok(())
    }
}

// -- Accelerometer ------------------------------------------------------------

/// Replays injected samples; at rest it reports 1 g straight down.
pub struct SimAccel {
    samples: Mutex<VecDeque<[f32; 3]>>,
    fail_init: AtomicBool,
}

impl SimAccel {
    pub fn new() -> Self {
        Self { samples: Mutex::new(VecDeque::new()), fail_init: AtomicBool::new(false) }
    }

    pub fn push_sample(&self, sample: [f32; 3]) {
        self.samples.lock().push_back(sample);
    }

    pub fn set_fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::Relaxed);
    }
}

impl Default for SimAccel {
    fn default() -> Self {
        Self::new()
    }
}

impl Accelerometer for SimAccel {
    fn init(&self) -> anyhow::Result<()> {
        if self.fail_init.load(Ordering::Relaxed) {
            anyhow::bail!("imu not responding");
        }
        Ok(())
    }

    fn read(&self) -> anyhow::Result<[f32; 3]> {
        Ok(self.samples.lock().pop_front().unwrap_or([0.0, 0.0, 9.81]))
    }
}

// -- System monitor -----------------------------------------------------------

pub struct SimMonitor {
    mac: String,
    ip: Mutex<String>,
    rssi: AtomicI32,
}

impl SimMonitor {
    pub fn new() -> Self {
        Self {
            mac: "AA:BB:CC:DD:EE:FF".to_owned(),
            ip: Mutex::new("192.168.4.2".to_owned()),
            rssi: AtomicI32::new(-54),
        }
    }

    pub fn set_rssi(&self, dbm: i32) {
        self.rssi.store(dbm, Ordering::Relaxed);
    }
}

impl Default for SimMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMonitor for SimMonitor {
    fn mac(&self) -> String {
        self.mac.clone()
    }

    fn rssi(&self) -> i32 {
        self.rssi.load(Ordering::Relaxed)
    }

    fn ip(&self) -> String {
        self.ip.lock().clone()
    }

    fn temperature_c(&self) -> f32 {
        41.5
    }
}

// -- Backlight ----------------------------------------------------------------

pub struct SimBacklight {
    percent: AtomicU8,
}

impl SimBacklight {
    pub fn new() -> Self {
        Self { percent: AtomicU8::new(100) }
    }

    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }
}

impl Default for SimBacklight {
    fn default() -> Self {
        Self::new()
    }
}

impl Backlight for SimBacklight {
    fn set_percent(&self, percent: u8) {
        self.percent.store(percent, Ordering::Relaxed);
    }
}

// -- Key-value store ----------------------------------------------------------

/// Volatile key-value store.
#[derive(Default)]
pub struct MemKv {
    map: Mutex<HashMap<String, String>>,
}

impl MemKv {
    /// A store pre-seeded with credentials, for provisioned-device tests.
    pub fn provisioned(ssid: &str, password: &str, ws_url: &str) -> Self {
        let kv = Self::default();
        let mut map = kv.map.lock();
        map.insert("ssid".to_owned(), ssid.to_owned());
        map.insert("password".to_owned(), password.to_owned());
        map.insert("ws_url".to_owned(), ws_url.to_owned());
        drop(map);
        kv
    }
}

impl KvStore for MemKv {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.map.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// JSON-file-backed key-value store so provisioning survives a restart.
pub struct FileKv {
    path: PathBuf,
    map: Mutex<HashMap<String, String>>,
}

impl FileKv {
    pub fn open(path: PathBuf) -> Self {
        let map = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { path, map: Mutex::new(map) }
    }
}

impl KvStore for FileKv {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut map = self.map.lock();
        map.insert(key.to_owned(), value.to_owned());
        let text = serde_json::to_string_pretty(&*map)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

// -- Wi-Fi --------------------------------------------------------------------

pub struct SimWifi {
    connected: AtomicBool,
}

impl SimWifi {
    pub fn new() -> Self {
        Self { connected: AtomicBool::new(false) }
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Default for SimWifi {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiControl for SimWifi {
    fn connect(&self, ssid: &str, _password: &str) -> anyhow::Result<()> {
        tracing::info!(ssid, "wifi sta connected");
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
#[path = "sim_tests.rs"]
mod tests;
