// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Full-duplex audio pipeline.
//!
//! Downlink: `audio/play` payloads are Base64 PCM, decoded into a
//! short-lived fast-SRAM scratch buffer (the codec DMA reads it directly)
//! and written to the speaker.
//!
//! Uplink: a dedicated capture thread reads 1024-byte PCM chunks into a
//! fast-SRAM buffer allocated once at start-up, Base64-encodes them on the
//! default heap, and publishes `{"state":"stream","data":…}` frames on
//! `audio/record`. The thread models the firmware's pinned capture task
//! (core 1, priority 2, stack in PSRAM): everything it touches beyond the
//! PCM buffer is bulk heap.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio_util::sync::CancellationToken;

use crate::bus::Bus;
use crate::hal::{AudioCodec, CodecSpec};
use crate::mem::{PoolBuf, Pools, Region};

pub const SAMPLE_RATE: u32 = 22_050;
pub const BITS_PER_SAMPLE: u8 = 16;

/// One capture chunk, sized for the codec's DMA granularity.
pub const PCM_CHUNK_BYTES: usize = 1024;

/// I²S DMA ring reserved at start-up, before Wi-Fi fragments fast SRAM.
pub const I2S_DMA_BYTES: usize = 4 * 1024;

/// Uplink topic for capture frames and record-state transitions.
pub const TOPIC_RECORD: &str = "audio/record";

/// Downlink topic carrying Base64 PCM for the speaker.
pub const TOPIC_PLAY: &str = "audio/play";

const SPEAKER_GAIN: u8 = 70;
const MIC_GAIN: u8 = 80;

/// Capture thread sleep while the recording flag is clear.
const IDLE_SLEEP: Duration = Duration::from_millis(50);

/// Backoff after a codec read error.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// The audio component. Owns the codec session and the recording flag.
pub struct Audio {
    bus: Arc<Bus>,
    recording: Arc<AtomicBool>,
    /// I²S DMA ring; allocated once, never freed.
    _i2s_dma: PoolBuf,
}

impl Audio {
    /// Open the codec pair, reserve the DMA buffers, subscribe the play
    /// handler, and start the capture thread.
    ///
    /// `recording` is shared with the layout engine, whose particle timers
    /// throttle on it. Fast-SRAM refusal here is fatal: boot ordering
    /// guarantees the pool is still contiguous, so a failure means the
    /// ordering contract is broken.
    pub fn start(
        codec: Arc<dyn AudioCodec>,
        bus: Arc<Bus>,
        pools: Arc<Pools>,
        recording: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Arc<Self>> {
        codec.open(CodecSpec {
            sample_rate: SAMPLE_RATE,
            bits_per_sample: BITS_PER_SAMPLE,
            speaker_channels: 1,
            mic_channels: 2,
        })?;
        codec.set_speaker_gain(SPEAKER_GAIN);
        codec.set_mic_gain(MIC_GAIN);

        let i2s_dma = pools
            .alloc(Region::Internal, I2S_DMA_BYTES, "i2s_dma")
            .context("i2s dma ring: fast sram exhausted during boot")?;
        let pcm = pools
            .alloc(Region::Internal, PCM_CHUNK_BYTES, "pcm_capture")
            .context("pcm capture buffer: fast sram exhausted during boot")?;

        {
            let codec = Arc::clone(&codec);
            let pools = Arc::clone(&pools);
            bus.subscribe(TOPIC_PLAY, move |payload| play(&codec, &pools, payload));
        }

        {
            let codec = Arc::clone(&codec);
            let bus = Arc::clone(&bus);
            let recording = Arc::clone(&recording);
            std::thread::Builder::new()
                .name("audio_capture".to_owned())
                .stack_size(24 * 1024)
                .spawn(move || capture_loop(&codec, &bus, &recording, pcm, &cancel))
                .context("spawn audio capture thread")?;
        }

        Ok(Arc::new(Self { bus, recording, _i2s_dma: i2s_dma }))
    }

    /// Arm capture. Publishes `{"state":"start"}` on the false→true edge.
    pub fn record_start(&self) {
        if !self.recording.swap(true, Ordering::AcqRel) {
            self.bus.publish_up(TOPIC_RECORD, r#"{"state":"start"}"#);
        } else {
            tracing::debug!("record_start while already recording");
        }
    }

    /// Disarm capture. Publishes `{"state":"stop"}` on the true→false edge.
    pub fn record_stop(&self) {
        if self.recording.swap(false, Ordering::AcqRel) {
            self.bus.publish_up(TOPIC_RECORD, r#"{"state":"stop"}"#);
        } else {
            tracing::debug!("record_stop while not recording");
        }
    }

    /// Whether capture is armed. The particle throttle polls this.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// The shared flag itself, for components that poll every frame.
    pub fn recording_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.recording)
    }
}

/// Decode one `audio/play` payload and hand it to the speaker.
///
/// The scratch buffer must be fast SRAM: the codec DMA consumes it in
/// place. Refusal (or undecodable payload) drops the frame with a log.
fn play(codec: &Arc<dyn AudioCodec>, pools: &Arc<Pools>, payload: &str) {
    let estimate = base64::decoded_len_estimate(payload.len());
    let Some(mut scratch) = pools.alloc(Region::Internal, estimate, "play_scratch") else {
        tracing::warn!(estimate, "play scratch refused, frame dropped");
        return;
    };
    match BASE64.decode_slice(payload.as_bytes(), &mut scratch) {
        Ok(len) => {
            if let Err(e) = codec.write(&scratch[..len]) {
                tracing::warn!(err = %e, "speaker write failed");
            }
        }
        Err(e) => tracing::warn!(err = %e, "audio/play payload is not base64, dropped"),
    }
}

fn capture_loop(
    codec: &Arc<dyn AudioCodec>,
    bus: &Arc<Bus>,
    recording: &AtomicBool,
    mut pcm: PoolBuf,
    cancel: &CancellationToken,
) {
    // Base64 and frame-assembly buffers live on the default heap and are
    // reused across chunks.
    let mut b64 = String::with_capacity(1500);
    let mut frame = String::with_capacity(2048);

    while !cancel.is_cancelled() {
        if !recording.load(Ordering::Acquire) {
            std::thread::sleep(IDLE_SLEEP);
            continue;
        }

        match codec.read(&mut pcm) {
            Ok(0) => {}
            Ok(n) => {
                b64.clear();
                BASE64.encode_string(&pcm[..n], &mut b64);
                frame.clear();
                let _ = write!(frame, "{{\"state\":\"stream\",\"data\":\"{b64}\"}}");
                bus.publish_up(TOPIC_RECORD, &frame);
            }
            Err(e) => {
                tracing::debug!(err = %e, "codec read error, backing off");
                std::thread::sleep(ERROR_BACKOFF);
            }
        }
    }
}

#[cfg(test)]
#[path = "audio_tests.rs"]
mod tests;
