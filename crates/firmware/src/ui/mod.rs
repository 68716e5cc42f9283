// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-driven layout engine.
//!
//! `ui/layout` frames re-materialise the whole scene graph; `ui/update`
//! frames mutate one addressed node. The graph is a strict tree hanging off
//! a root view inset by the screen's safe margin, and every mutation happens
//! under one recursive blocking lock; render, update, input dispatch, and
//! the timer tick all take it.
//!
//! Nothing here draws pixels; the display driver consumes the retained tree.

pub mod action;
pub mod anim;
pub mod node;
pub mod particle;
pub mod style;

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use base64::Engine as _;
use parking_lot::ReentrantMutex;
use serde_json::{Map, Value};

use crate::bus::Bus;
use crate::mem::{Pools, Region};

use action::EventCode;
use anim::SpinSlots;
use node::{ActionBindings, ImageData, Node, NodeData, NodeKind, NodeUid};
use style::{Color, FlexAlign, FlexFlow, LongMode, Style};

pub const SCREEN_W: i32 = 466;
pub const SCREEN_H: i32 = 466;

/// Safe margin on all sides of the circular panel.
pub const SAFE_PAD: i32 = 40;

/// Registry capacity; excess IDs are not addressable by `update`.
pub const ID_REGISTRY_CAP: usize = 64;

/// Longest registrable widget ID in bytes.
pub const MAX_ID_LEN: usize = 31;

/// Root fade-in length after a full render.
pub const FADE_MS: u64 = 200;

const ROOT_UID: NodeUid = 0;

/// The layout engine. One instance per device, shared across tasks.
pub struct Ui {
    inner: ReentrantMutex<RefCell<UiCore>>,
    bus: Arc<Bus>,
    /// Clock value of the last user input, read by the screen-sleep timer.
    activity_ms: Arc<AtomicU64>,
}

struct UiCore {
    root: Node,
    registry: Vec<(String, NodeUid)>,
    spin: SpinSlots,
    next_uid: NodeUid,
    pools: Arc<Pools>,
    recording: Arc<AtomicBool>,
    clock_ms: u64,
    fade_start_ms: Option<u64>,
}

impl Ui {
    pub fn new(bus: Arc<Bus>, pools: Arc<Pools>, recording: Arc<AtomicBool>) -> Arc<Self> {
        let core = UiCore {
            root: Node::new(ROOT_UID, NodeKind::Container),
            registry: Vec::new(),
            spin: SpinSlots::new(),
            next_uid: ROOT_UID + 1,
            pools,
            recording,
            clock_ms: 0,
            fade_start_ms: None,
        };
        Arc::new(Self {
            inner: ReentrantMutex::new(RefCell::new(core)),
            bus,
            activity_ms: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Establish the root view: safe-margin inset, flex column centred,
    /// transparent, scrollbars off. Clears the registry and spin slots.
    pub fn init(&self) {
        let guard = self.inner.lock();
        let mut core = guard.borrow_mut();
        core.root = Node::new(ROOT_UID, NodeKind::Container);
        apply_root_defaults(&mut core.root.style);
        core.registry.clear();
        core.spin.reset();
        core.fade_start_ms = None;
    }

    /// Full re-materialisation of the scene graph from a layout tree.
    ///
    /// Parse failure aborts without mutating the current scene.
    pub fn render(&self, json_text: &str) {
        let value: Value = match serde_json::from_str(json_text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(err = %e, "layout parse failed, scene unchanged");
                return;
            }
        };
        let guard = self.inner.lock();
        let mut core = guard.borrow_mut();
        core.rebuild(&value);
        tracing::debug!(
            nodes = core.root.subtree_len() - 1,
            ids = core.registry.len(),
            "layout rendered"
        );
    }

    /// Incremental mutation of one node addressed by `id`.
    pub fn update(&self, json_text: &str) {
        let value: Value = match serde_json::from_str(json_text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(err = %e, "update parse failed, ignored");
                return;
            }
        };
        let Some(obj) = value.as_object() else {
            tracing::warn!("update payload is not an object, ignored");
            return;
        };
        let Some(id) = obj.get("id").and_then(Value::as_str) else {
            tracing::warn!("update without an id, ignored");
            return;
        };

        let guard = self.inner.lock();
        let mut core = guard.borrow_mut();
        core.apply_update(id, obj);
    }

    /// Linear registry scan.
    pub fn find_by_id(&self, id: &str) -> Option<NodeUid> {
        let guard = self.inner.lock();
        let core = guard.borrow();
        core.lookup(id)
    }

    /// Run `f` against the retained node registered under `id`.
    pub fn with_node<R>(&self, id: &str, f: impl FnOnce(&Node) -> R) -> Option<R> {
        let guard = self.inner.lock();
        let core = guard.borrow();
        let uid = core.lookup(id)?;
        core.root.find(uid).map(f)
    }

    /// Deliver an input event to the widget registered under `id`.
    ///
    /// The touch driver calls this from the UI task; tests call it directly.
    /// Resulting publications run after the scene borrow is released.
    pub fn pointer(&self, id: &str, code: EventCode) {
        let dispatches = {
            let guard = self.inner.lock();
            let mut core = guard.borrow_mut();
            let clock = core.clock_ms;
            self.activity_ms.store(clock, Ordering::Release);

            let Some(uid) = core.lookup(id) else {
                tracing::debug!(id, "pointer event for unknown widget, ignored");
                return;
            };
            let Some(target) = core.root.find(uid) else {
                tracing::warn!(id, "registry entry without a node");
                return;
            };

            let mut out = Vec::new();
            if let Some(ref bindings) = target.actions {
                if code == EventCode::Release {
                    if let NodeData::Slider { value, .. } = target.data {
                        if let Some(d) = action::resolve_change(bindings, id, value) {
                            out.push(d);
                        }
                    }
                }
                if let Some(d) = action::resolve(bindings, code, id) {
                    out.push(d);
                }
            }
            out
        };

        for d in dispatches {
            if d.local {
                self.bus.publish_local(&d.topic, &d.payload);
            } else {
                self.bus.publish_up(&d.topic, &d.payload);
            }
        }
    }

    /// Advance the scene clock: root fade, animations, particle timers.
    /// Driven by the UI timer task at roughly the particle frame period.
    pub fn tick(&self, now_ms: u64) {
        let guard = self.inner.lock();
        let mut core = guard.borrow_mut();
        core.clock_ms = now_ms;

        if let Some(start) = core.fade_start_ms {
            let elapsed = now_ms.saturating_sub(start);
            if elapsed >= FADE_MS {
                core.root.style.opa = 255;
                core.fade_start_ms = None;
            } else {
                let p = elapsed as f32 / FADE_MS as f32;
                core.root.style.opa = (255.0 * anim::ease_out(p)) as u8;
            }
        }

        let recording = core.recording.load(Ordering::Relaxed);
        let UiCore { ref mut root, .. } = *core;
        tick_node(root, now_ms, recording);
    }

    /// Clock value of the last pointer event.
    pub fn activity(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.activity_ms)
    }

    /// Current root opacity, driven by the post-render fade.
    pub fn root_opacity(&self) -> u8 {
        let guard = self.inner.lock();
        let core = guard.borrow();
        core.root.style.opa
    }

    /// Running spin animations, for the concurrency cap tests.
    pub fn spin_count(&self) -> u8 {
        let guard = self.inner.lock();
        let core = guard.borrow();
        core.spin.count()
    }

    /// Registered IDs in the current scene generation.
    pub fn registry_len(&self) -> usize {
        let guard = self.inner.lock();
        let core = guard.borrow();
        core.registry.len()
    }

    /// Retained nodes excluding the root.
    pub fn node_count(&self) -> usize {
        let guard = self.inner.lock();
        let core = guard.borrow();
        core.root.subtree_len() - 1
    }
}

fn apply_root_defaults(style: &mut Style) {
    *style = Style::new();
    style.resolved_w = Some(SCREEN_W - 2 * SAFE_PAD);
    style.resolved_h = Some(SCREEN_H - 2 * SAFE_PAD);
    style.flex = Some(FlexFlow::Column);
    style.justify = FlexAlign::Center;
    style.align_items = FlexAlign::Center;
    style.bg_opa = Some(0);
    style.scrollable = false;
}

fn tick_node(node: &mut Node, now_ms: u64, recording: bool) {
    let Node { ref mut style, ref mut data, ref mut anims, ref mut children, .. } = *node;
    anims.retain_mut(|a| a.apply(now_ms, style, data));
    if let NodeData::Particle(Some(ref mut state)) = *data {
        state.tick(now_ms, recording);
    }
    for child in children {
        tick_node(child, now_ms, recording);
    }
}

impl UiCore {
    fn lookup(&self, id: &str) -> Option<NodeUid> {
        self.registry.iter().find(|(rid, _)| rid == id).map(|&(_, uid)| uid)
    }

    fn alloc_uid(&mut self) -> NodeUid {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }

    /// Tear down the current subtree and build the new one.
    fn rebuild(&mut self, value: &Value) {
        // Dropping the children releases every owned buffer and spin slot.
        self.root.style.opa = 0;
        self.root.children.clear();
        self.root.anims.clear();
        self.registry.clear();
        self.spin.reset();

        apply_root_defaults(&mut self.root.style);
        self.root.style.opa = 0;

        let mut children = Vec::new();
        match *value {
            Value::Array(ref items) => {
                let (pw, ph) = self.root_content();
                for item in items {
                    if let Some(child) = self.build(item, pw, ph) {
                        children.push(child);
                    }
                }
            }
            Value::Object(ref obj) if obj.get("children").is_some() => {
                // Root-level styles and flex settings apply to the root view.
                style::apply_common(&mut self.root.style, obj, SCREEN_W, SCREEN_H);
                style::apply_flex(&mut self.root.style, obj);
                self.root.style.opa = 0;
                let (pw, ph) = self.root_content();
                if let Some(kids) = obj.get("children").and_then(Value::as_array) {
                    for kid in kids {
                        if let Some(child) = self.build(kid, pw, ph) {
                            children.push(child);
                        }
                    }
                }
            }
            Value::Object(_) => {
                let (pw, ph) = self.root_content();
                if let Some(child) = self.build(value, pw, ph) {
                    children.push(child);
                }
            }
            _ => tracing::warn!("layout root must be an object or array"),
        }
        self.root.children = children;
        self.fade_start_ms = Some(self.clock_ms);
    }

    fn root_content(&self) -> (i32, i32) {
        (self.root.style.content_w(SCREEN_W), self.root.style.content_h(SCREEN_H))
    }

    /// Construct one widget subtree. Returns `None` (and logs) for nodes the
    /// engine cannot build; siblings are unaffected.
    fn build(&mut self, value: &Value, parent_w: i32, parent_h: i32) -> Option<Node> {
        let Some(obj) = value.as_object() else {
            tracing::warn!("layout node is not an object, skipped");
            return None;
        };
        let Some(ty) = obj.get("type").and_then(Value::as_str) else {
            tracing::warn!("layout node missing type, skipped");
            return None;
        };
        let Some(kind) = NodeKind::parse(ty) else {
            tracing::warn!(ty, "unknown widget type, skipped");
            return None;
        };

        let uid = self.alloc_uid();
        let mut node = Node::new(uid, kind);

        match kind {
            NodeKind::Container => {
                style::apply_flex(&mut node.style, obj);
            }
            NodeKind::Label => {
                node.data = label_data(obj);
            }
            NodeKind::Button => {
                // Inline child label inheriting text, text_color, font_size.
                let mut label = Node::new(self.alloc_uid(), NodeKind::Label);
                label.data = label_data(obj);
                label.style.text_color =
                    obj.get("text_color").and_then(Value::as_str).and_then(Color::parse);
                label.style.font_size =
                    obj.get("font_size").and_then(Value::as_i64).map(style::font_preset);
                node.children.push(label);
            }
            NodeKind::Image => {
                node.data = NodeData::Image { data: self.decode_image(obj), rotation_cd: 0 };
            }
            NodeKind::Bar => {
                let (min, max, value) = range_of(obj);
                node.data = NodeData::Bar {
                    min,
                    max,
                    value,
                    indic_color: obj
                        .get("indic_color")
                        .and_then(Value::as_str)
                        .and_then(Color::parse),
                };
            }
            NodeKind::Slider => {
                let (min, max, value) = range_of(obj);
                node.data = NodeData::Slider { min, max, value };
            }
            NodeKind::Particle => {
                let canvas_w = obj.get("canvas_w").and_then(Value::as_i64).unwrap_or(200);
                let canvas_h = obj.get("canvas_h").and_then(Value::as_i64).unwrap_or(200);
                let color = obj
                    .get("color")
                    .and_then(Value::as_str)
                    .and_then(Color::parse)
                    .unwrap_or(Color::WHITE);
                let state =
                    particle::ParticleState::create(&self.pools, canvas_w, canvas_h, color, uid);
                if state.is_none() {
                    tracing::warn!("particle canvas allocation failed, widget has no effect");
                }
                node.data = NodeData::Particle(state);
            }
        }

        style::apply_common(&mut node.style, obj, parent_w, parent_h);

        if let Some(id) = obj.get("id").and_then(Value::as_str) {
            if id.len() > MAX_ID_LEN {
                tracing::warn!(id, "id longer than {MAX_ID_LEN} bytes, not registered");
            } else {
                node.id = Some(id.to_owned());
                if self.registry.len() < ID_REGISTRY_CAP {
                    self.registry.push((id.to_owned(), uid));
                } else {
                    tracing::warn!(id, "id registry full, widget not addressable");
                }
            }
        }

        node.actions = ActionBindings::parse(obj);
        // Buttons are interactive even with no explicit URI: a bare click
        // reports on the canonical uplink topic.
        if node.actions.is_none() && kind == NodeKind::Button {
            node.actions = Some(Box::default());
        }

        if let Some(desc) = obj.get("anim") {
            anim::start(&mut node, desc, &self.spin, self.clock_ms);
        }

        if let Some(kids) = obj.get("children").and_then(Value::as_array) {
            let (cw, ch) = (node.style.content_w(parent_w), node.style.content_h(parent_h));
            for kid in kids {
                if let Some(child) = self.build(kid, cw, ch) {
                    node.children.push(child);
                }
            }
        }

        Some(node)
    }

    /// Decode a Base64 RGB565 image into a PSRAM buffer.
    ///
    /// Any failure (missing dimensions, bad Base64, size mismatch, pool
    /// refusal) leaves the widget without pixels.
    fn decode_image(&mut self, obj: &Map<String, Value>) -> Option<ImageData> {
        let Some(src) = obj.get("src").and_then(Value::as_str) else {
            tracing::warn!("image without src, widget has no pixels");
            return None;
        };
        let dims = obj
            .get("img_w")
            .and_then(Value::as_u64)
            .zip(obj.get("img_h").and_then(Value::as_u64));
        let Some((w, h)) = dims else {
            tracing::warn!("image without img_w/img_h, widget has no pixels");
            return None;
        };
        let (w, h) = (w as u16, h as u16);
        let expected = usize::from(w) * usize::from(h) * 2;

        let decoded = match base64::engine::general_purpose::STANDARD.decode(src) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(err = %e, "image base64 decode failed");
                return None;
            }
        };
        if decoded.len() != expected {
            tracing::warn!(got = decoded.len(), expected, "image size mismatch, pixels dropped");
            return None;
        }

        let mut pixels = self.pools.alloc(Region::Psram, expected, "image_pixels").or_else(|| {
            tracing::warn!(expected, "image buffer allocation failed, widget has no pixels");
            None
        })?;
        pixels.copy_from_slice(&decoded);
        Some(ImageData { pixels, w, h })
    }

    /// Apply one `ui/update` object to the node registered under `id`.
    fn apply_update(&mut self, id: &str, obj: &Map<String, Value>) {
        let Some(uid) = self.lookup(id) else {
            tracing::debug!(id, "update target not in registry, no-op");
            return;
        };
        let UiCore { ref mut root, ref spin, clock_ms, .. } = *self;
        let Some(node) = root.find_mut(uid) else {
            tracing::warn!(id, "registry entry without a node");
            return;
        };

        if let Some(text) = obj.get("text").and_then(Value::as_str) {
            set_text(node, text);
        }
        if let Some(hidden) = obj.get("hidden").and_then(Value::as_bool) {
            node.style.hidden = hidden;
        }
        if let Some(color) = obj.get("bg_color").and_then(Value::as_str) {
            match Color::parse(color) {
                Some(c) => {
                    node.style.bg_color = Some(c);
                    node.style.bg_opa = Some(255);
                }
                None => tracing::warn!(id, color, "unparseable bg_color in update"),
            }
        }
        if let Some(target) = obj.get("value").and_then(Value::as_i64) {
            set_value_animated(node, target as i32, clock_ms);
        }
        if let Some(color) = obj.get("indic_color").and_then(Value::as_str) {
            match (Color::parse(color), &mut node.data) {
                (Some(c), NodeData::Bar { ref mut indic_color, .. }) => *indic_color = Some(c),
                (Some(_), _) => tracing::warn!(id, "indic_color update on a non-bar"),
                (None, _) => tracing::warn!(id, color, "unparseable indic_color in update"),
            }
        }
        if let Some(opa) = obj.get("opa").and_then(Value::as_u64) {
            node.style.opa = opa.min(255) as u8;
        }
        if let Some(desc) = obj.get("anim") {
            anim::start(node, desc, spin, clock_ms);
        }
    }
}

fn label_data(obj: &Map<String, Value>) -> NodeData {
    let text = obj.get("text").and_then(Value::as_str).unwrap_or("").to_owned();
    let long_mode = obj
        .get("long_mode")
        .and_then(Value::as_str)
        .and_then(LongMode::parse)
        .unwrap_or_default();
    NodeData::Label { text, long_mode }
}

fn range_of(obj: &Map<String, Value>) -> (i32, i32, i32) {
    let min = obj.get("min").and_then(Value::as_i64).unwrap_or(0) as i32;
    let max = obj.get("max").and_then(Value::as_i64).unwrap_or(100) as i32;
    let value = obj.get("value").and_then(Value::as_i64).unwrap_or(min as i64) as i32;
    (min, max, value.clamp(min, max))
}

/// `text` applies to a label directly, or to a button's inline child label.
fn set_text(node: &mut Node, text: &str) {
    if let NodeData::Label { text: ref mut t, .. } = node.data {
        *t = text.to_owned();
        return;
    }
    if let Some(child) = node.children.first_mut() {
        if let NodeData::Label { text: ref mut t, .. } = child.data {
            *t = text.to_owned();
            return;
        }
    }
    tracing::warn!(kind = node.kind.as_str(), "text update on a node without a label");
}

/// Bar and slider value updates run through a short animated transition.
fn set_value_animated(node: &mut Node, target: i32, now_ms: u64) {
    let (from, clamped) = match node.data {
        NodeData::Bar { min, max, value, .. } | NodeData::Slider { min, max, value } => {
            (value, target.clamp(min, max))
        }
        _ => {
            tracing::warn!(kind = node.kind.as_str(), "value update on a non-range widget");
            return;
        }
    };
    // Replace any transition still in flight.
    node.anims.retain(|a| !matches!(a.kind, anim::AnimKind::ValueTween { .. }));
    node.anims.push(anim::Active {
        kind: anim::AnimKind::ValueTween { from, to: clamped },
        duration_ms: 200,
        repeat: anim::Repeat::Count(1),
        start_ms: now_ms,
    });
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
