// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centre-emitter particle effect drawn into an owned RGB565 canvas.
//!
//! The canvas is a PSRAM allocation capped at 200×200 so one widget can
//! never claim more than ~80 KiB. Ticks are skipped entirely while audio
//! capture is running; the encoder needs the cycles more than the sparkles.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::style::Color;
use crate::mem::{PoolBuf, Pools, Region};

/// Canvas side cap in pixels.
pub const MAX_CANVAS: i64 = 200;

/// Live particle cap per widget.
pub const MAX_PARTICLES: usize = 30;

/// Frame period of the particle timer.
pub const TICK_MS: u64 = 33;

/// Downward acceleration in px per tick².
const GRAVITY: f32 = 0.06;

/// Per-tick alpha decay; particles live ~40 frames.
const ALPHA_DECAY: f32 = 0.025;

struct Particle {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    alpha: f32,
}

/// Owned state of one particle widget.
pub struct ParticleState {
    canvas: PoolBuf,
    w: u16,
    h: u16,
    color: Color,
    particles: Vec<Particle>,
    rng: SmallRng,
    next_due_ms: u64,
    /// Frames drawn since creation; observability for the throttle.
    pub frames: u64,
}

impl ParticleState {
    /// Allocate the canvas and set up the emitter. `None` when PSRAM cannot
    /// serve the canvas; the caller keeps the widget without the effect.
    pub fn create(
        pools: &std::sync::Arc<Pools>,
        canvas_w: i64,
        canvas_h: i64,
        color: Color,
        seed: u64,
    ) -> Option<Box<Self>> {
        let w = canvas_w.clamp(1, MAX_CANVAS) as u16;
        let h = canvas_h.clamp(1, MAX_CANVAS) as u16;
        if i64::from(w) != canvas_w || i64::from(h) != canvas_h {
            tracing::debug!(canvas_w, canvas_h, w, h, "particle canvas clamped");
        }

        let canvas = pools.alloc(Region::Psram, usize::from(w) * usize::from(h) * 2, "particle_canvas")?;
        Some(Box::new(Self {
            canvas,
            w,
            h,
            color,
            particles: Vec::with_capacity(MAX_PARTICLES),
            rng: SmallRng::seed_from_u64(seed),
            next_due_ms: 0,
            frames: 0,
        }))
    }

    pub fn canvas_size(&self) -> (u16, u16) {
        (self.w, self.h)
    }

    /// Advance one timer period if due. While `recording` is set the tick
    /// returns before touching the canvas.
    pub fn tick(&mut self, now_ms: u64, recording: bool) {
        if recording {
            return;
        }
        if now_ms < self.next_due_ms {
            return;
        }
        self.next_due_ms = now_ms + TICK_MS;

        self.emit();
        self.step();
        self.draw();
        self.frames += 1;
    }

    fn emit(&mut self) {
        if self.particles.len() >= MAX_PARTICLES {
            return;
        }
        self.particles.push(Particle {
            x: f32::from(self.w) / 2.0,
            y: f32::from(self.h) / 2.0,
            vx: self.rng.random_range(-1.5..1.5),
            vy: self.rng.random_range(-2.5..-0.3),
            alpha: 1.0,
        });
    }

    fn step(&mut self) {
        for p in &mut self.particles {
            p.vy += GRAVITY;
            p.x += p.vx;
            p.y += p.vy;
            p.alpha -= ALPHA_DECAY;
        }
        let (w, h) = (f32::from(self.w), f32::from(self.h));
        self.particles.retain(|p| p.alpha > 0.0 && p.x >= 0.0 && p.x < w && p.y >= 0.0 && p.y < h);
    }

    fn draw(&mut self) {
        self.canvas.fill(0);
        let w = usize::from(self.w);
        for i in 0..self.particles.len() {
            let (x, y, alpha) = {
                let p = &self.particles[i];
                (p.x as usize, p.y as usize, p.alpha)
            };
            let faded = self.color.mix(Color(0), 255 - (alpha * 255.0) as u8);
            let px = faded.to_rgb565().to_le_bytes();
            let offset = (y * w + x) * 2;
            if offset + 1 < self.canvas.len() {
                self.canvas[offset] = px[0];
                self.canvas[offset + 1] = px[1];
            }
        }
    }

    /// Live particle count, for tests.
    pub fn live(&self) -> usize {
        self.particles.len()
    }
}

#[cfg(test)]
#[path = "particle_tests.rs"]
mod tests;
