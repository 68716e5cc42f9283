// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Animation runtime for scene-graph nodes.
//!
//! Animations are advanced by the UI timer tick; each [`Active`] writes its
//! current value into the owning node's style or data. Spin is capped at two
//! concurrent instances process-wide; the slot guard decrements the counter
//! when its animation (or node) is dropped.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;

use super::node::{Node, NodeData, NodeKind};
use super::style::{Color, LongMode, Style};

/// Process-wide cap on concurrent spin animations.
pub const MAX_SPIN: u8 = 2;

// -- Spin slots ----------------------------------------------------------------

/// Shared counter of running spin animations.
#[derive(Clone)]
pub struct SpinSlots(Arc<AtomicU8>);

impl SpinSlots {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(0)))
    }

    /// Claim a slot, or `None` when both are taken.
    pub fn acquire(&self) -> Option<SpinSlot> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                if v < MAX_SPIN {
                    Some(v + 1)
                } else {
                    None
                }
            })
            .ok()
            .map(|_| SpinSlot(Arc::clone(&self.0)))
    }

    pub fn count(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    /// Force the counter to zero. Called after a full tree clear; the tree
    /// drop has already returned every slot, so this is a backstop.
    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}

impl Default for SpinSlots {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for one claimed spin slot, held inside the animation state.
pub struct SpinSlot(Arc<AtomicU8>);

impl Drop for SpinSlot {
    fn drop(&mut self) {
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            Some(v.saturating_sub(1))
        });
    }
}

// -- Descriptors ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Infinite,
    Count(u32),
}

/// Colour-pulse state owned by the animation, released with the node.
pub struct ColorPulse {
    pub color_a: Color,
    pub color_b: Color,
}

pub enum AnimKind {
    Blink,
    Breathe { min_opa: u8, max_opa: u8 },
    Spin { ccw: bool, _slot: SpinSlot },
    SlideIn { dx: i32, dy: i32 },
    Shake { amp: i32 },
    ColorPulse(Box<ColorPulse>),
    /// Animated value transition for bar/slider updates.
    ValueTween { from: i32, to: i32 },
}

/// One running animation on a node.
pub struct Active {
    pub kind: AnimKind,
    pub duration_ms: u64,
    pub repeat: Repeat,
    pub start_ms: u64,
}

// -- Easing --------------------------------------------------------------------

pub(crate) fn ease_out(t: f32) -> f32 {
    1.0 - (1.0 - t) * (1.0 - t)
}

fn ease_in_out(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Triangle wave over one playback cycle: 0→1 in the first half, back to 0
/// in the second, eased on both legs.
fn playback(p: f32) -> f32 {
    if p < 0.5 {
        ease_in_out(p * 2.0)
    } else {
        ease_in_out((1.0 - p) * 2.0)
    }
}

impl Active {
    /// Full cycle length; opacity and colour playbacks run there and back.
    fn cycle_ms(&self) -> u64 {
        match self.kind {
            AnimKind::Blink | AnimKind::Breathe { .. } | AnimKind::ColorPulse(_) => {
                self.duration_ms * 2
            }
            _ => self.duration_ms,
        }
    }

    /// Advance to `now_ms`, writing the current value into the node.
    /// Returns `false` once the animation has finished and should be
    /// removed.
    pub fn apply(&mut self, now_ms: u64, style: &mut Style, data: &mut NodeData) -> bool {
        let cycle = self.cycle_ms().max(1);
        let elapsed = now_ms.saturating_sub(self.start_ms);

        let finished = match self.repeat {
            Repeat::Infinite => false,
            Repeat::Count(n) => elapsed >= cycle * u64::from(n),
        };

        // Phase within the current cycle, 0..1.
        let p = if finished { 1.0 } else { (elapsed % cycle) as f32 / cycle as f32 };

        match self.kind {
            AnimKind::Blink => {
                style.opa = if finished { 255 } else { (255.0 * (1.0 - playback(p))) as u8 };
            }
            AnimKind::Breathe { min_opa, max_opa } => {
                let span = f32::from(max_opa) - f32::from(min_opa);
                style.opa = if finished {
                    max_opa
                } else {
                    (f32::from(max_opa) - span * playback(p)) as u8
                };
            }
            AnimKind::Spin { ccw, .. } => {
                let angle = if finished { 0 } else { (3600.0 * p) as i32 };
                if let NodeData::Image { ref mut rotation_cd, .. } = *data {
                    *rotation_cd = if ccw { -angle } else { angle };
                }
            }
            AnimKind::SlideIn { dx, dy } => {
                let q = if finished { 1.0 } else { ease_out(p) };
                style.translate_x = (dx as f32 * (1.0 - q)) as i32;
                style.translate_y = (dy as f32 * (1.0 - q)) as i32;
            }
            AnimKind::Shake { amp } => {
                style.translate_x = if finished {
                    0
                } else {
                    // Two full oscillations per play, eased at the edges.
                    let envelope = playback(p);
                    (amp as f32
                        * envelope
                        * (ease_in_out(p) * 4.0 * std::f32::consts::PI).sin())
                        as i32
                };
            }
            AnimKind::ColorPulse(ref pulse) => {
                let t = if finished { 0 } else { (255.0 * playback(p)) as u8 };
                style.bg_color = Some(pulse.color_a.mix(pulse.color_b, t));
            }
            AnimKind::ValueTween { from, to } => {
                let q = if finished { 1.0 } else { ease_out(p) };
                let value = from + ((to - from) as f32 * q) as i32;
                match *data {
                    NodeData::Bar { value: ref mut v, .. }
                    | NodeData::Slider { value: ref mut v, .. } => *v = value,
                    _ => {}
                }
            }
        }

        !finished
    }
}

// -- Descriptor parsing --------------------------------------------------------

fn default_duration_ms(ty: &str) -> u64 {
    match ty {
        "blink" => 500,
        "breathe" => 1000,
        "spin" => 1000,
        "slide_in" => 300,
        "shake" => 400,
        "color_pulse" => 1000,
        _ => 1000,
    }
}

fn default_repeat(ty: &str) -> Repeat {
    match ty {
        "slide_in" | "shake" => Repeat::Count(1),
        _ => Repeat::Infinite,
    }
}

fn parse_repeat(obj: &serde_json::Map<String, Value>, ty: &str) -> Repeat {
    match obj.get("repeat").and_then(Value::as_i64) {
        None => default_repeat(ty),
        Some(n) if n < 0 => Repeat::Infinite,
        Some(0) => match ty {
            // Documented quirk: zero means infinite for these two types.
            "breathe" | "color_pulse" => {
                tracing::warn!(ty, "repeat:0 treated as infinite (deprecated, use repeat:-1)");
                Repeat::Infinite
            }
            _ => Repeat::Count(0),
        },
        Some(n) => Repeat::Count(n as u32),
    }
}

/// Off-screen travel distance for slide-in, the screen diameter.
const SLIDE_DISTANCE: i32 = super::SCREEN_W;

/// Start the animation described by `desc` on `node`.
///
/// Rejections (spin on a non-image, spin slots exhausted, unknown type) log
/// and leave the node un-animated.
pub fn start(node: &mut Node, desc: &Value, slots: &SpinSlots, now_ms: u64) {
    let Some(obj) = desc.as_object() else {
        tracing::warn!("anim descriptor is not an object, ignored");
        return;
    };
    let Some(ty) = obj.get("type").and_then(Value::as_str) else {
        tracing::warn!("anim descriptor missing type, ignored");
        return;
    };

    if ty == "marquee" {
        match node.data {
            NodeData::Label { ref mut long_mode, .. } => *long_mode = LongMode::Marquee,
            _ => tracing::warn!(kind = node.kind.as_str(), "marquee on a non-label, ignored"),
        }
        return;
    }

    let duration_ms = obj
        .get("duration")
        .and_then(Value::as_u64)
        .unwrap_or_else(|| default_duration_ms(ty));
    let repeat = parse_repeat(obj, ty);

    let kind = match ty {
        "blink" => AnimKind::Blink,
        "breathe" => {
            let min_opa = obj.get("min_opa").and_then(Value::as_u64).unwrap_or(80).min(255) as u8;
            let max_opa = obj.get("max_opa").and_then(Value::as_u64).unwrap_or(255).min(255) as u8;
            AnimKind::Breathe { min_opa, max_opa }
        }
        "spin" => {
            if node.kind != NodeKind::Image {
                tracing::warn!(kind = node.kind.as_str(), "spin requested on a non-image, rejected");
                return;
            }
            let Some(slot) = slots.acquire() else {
                tracing::warn!(cap = MAX_SPIN, "spin slots exhausted, request denied");
                return;
            };
            let ccw = obj.get("direction").and_then(Value::as_str) == Some("ccw");
            AnimKind::Spin { ccw, _slot: slot }
        }
        "slide_in" => {
            let (dx, dy) = match obj.get("from").and_then(Value::as_str).unwrap_or("left") {
                "right" => (SLIDE_DISTANCE, 0),
                "top" => (0, -SLIDE_DISTANCE),
                "bottom" => (0, SLIDE_DISTANCE),
                _ => (-SLIDE_DISTANCE, 0),
            };
            AnimKind::SlideIn { dx, dy }
        }
        "shake" => {
            let amp = obj.get("amp").and_then(Value::as_i64).unwrap_or(8) as i32;
            AnimKind::Shake { amp }
        }
        "color_pulse" => {
            let color = |key: &str, fallback: Color| {
                obj.get(key).and_then(Value::as_str).and_then(Color::parse).unwrap_or(fallback)
            };
            let color_a = color("color_a", node.style.bg_color.unwrap_or(Color(0)));
            let color_b = color("color_b", Color::WHITE);
            AnimKind::ColorPulse(Box::new(ColorPulse { color_a, color_b }))
        }
        other => {
            tracing::warn!(ty = other, "unknown animation type, ignored");
            return;
        }
    };

    node.anims.push(Active { kind, duration_ms, repeat, start_ms: now_ms });
}

#[cfg(test)]
#[path = "anim_tests.rs"]
mod tests;
