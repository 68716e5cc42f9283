// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Style attributes shared by every widget type.
//!
//! All keys are optional; unknown values log and leave the attribute
//! untouched so a malformed style never stops a layout build.

use serde_json::{Map, Value};

/// 24-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xFF_FF_FF);

    /// Parse `#RRGGBB`.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 {
            return None;
        }
        u32::from_str_radix(hex, 16).ok().map(Color)
    }

    pub fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn b(self) -> u8 {
        self.0 as u8
    }

    /// Pack to RGB565 for pixel buffers.
    pub fn to_rgb565(self) -> u16 {
        let r = u16::from(self.r() >> 3);
        let g = u16::from(self.g() >> 2);
        let b = u16::from(self.b() >> 3);
        (r << 11) | (g << 5) | b
    }

    /// Mix `self` toward `other` by `t` (0 = self, 255 = other).
    pub fn mix(self, other: Color, t: u8) -> Color {
        let t = u32::from(t);
        let lerp = |a: u8, b: u8| (u32::from(a) * (255 - t) + u32::from(b) * t) / 255;
        let r = lerp(self.r(), other.r());
        let g = lerp(self.g(), other.g());
        let b = lerp(self.b(), other.b());
        Color((r << 16) | (g << 8) | b)
    }
}

/// One dimension of a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Px(i32),
    Pct(u8),
    /// 100% of the parent content box.
    Full,
    /// Shrink to fit children.
    Content,
}

impl Size {
    pub fn parse(v: &Value) -> Option<Self> {
        if let Some(n) = v.as_i64() {
            return Some(Self::Px(n as i32));
        }
        let s = v.as_str()?;
        match s {
            "full" => Some(Self::Full),
            "content" => Some(Self::Content),
            _ => {
                let pct = s.strip_suffix('%')?;
                pct.parse::<u8>().ok().map(Self::Pct)
            }
        }
    }

    /// Resolve against the parent content dimension. `Content` stays
    /// unresolved; the display driver's layout pass sizes it.
    pub fn resolve(self, parent: i32) -> Option<i32> {
        match self {
            Self::Px(n) => Some(n),
            Self::Pct(p) => Some(parent * i32::from(p) / 100),
            Self::Full => Some(parent),
            Self::Content => None,
        }
    }
}

/// Absolute anchor within the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Center,
    TopMid,
    TopLeft,
    TopRight,
    BottomMid,
    BottomLeft,
    BottomRight,
    LeftMid,
    RightMid,
}

impl Align {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "center" => Some(Self::Center),
            "top_mid" => Some(Self::TopMid),
            "top_left" => Some(Self::TopLeft),
            "top_right" => Some(Self::TopRight),
            "bottom_mid" => Some(Self::BottomMid),
            "bottom_left" => Some(Self::BottomLeft),
            "bottom_right" => Some(Self::BottomRight),
            "left_mid" => Some(Self::LeftMid),
            "right_mid" => Some(Self::RightMid),
            _ => None,
        }
    }
}

/// Flex flow of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlexFlow {
    Row,
    #[default]
    Column,
    RowWrap,
    ColumnWrap,
}

impl FlexFlow {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "row" => Some(Self::Row),
            "column" => Some(Self::Column),
            "row_wrap" => Some(Self::RowWrap),
            "column_wrap" => Some(Self::ColumnWrap),
            _ => None,
        }
    }
}

/// Main/cross axis placement of flex children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlexAlign {
    Start,
    End,
    #[default]
    Center,
    SpaceEvenly,
    SpaceAround,
    SpaceBetween,
}

impl FlexAlign {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "end" => Some(Self::End),
            "center" => Some(Self::Center),
            "space_evenly" => Some(Self::SpaceEvenly),
            "space_around" => Some(Self::SpaceAround),
            "space_between" => Some(Self::SpaceBetween),
            _ => None,
        }
    }
}

/// Label overflow behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LongMode {
    #[default]
    Wrap,
    Scroll,
    Dot,
    Marquee,
}

impl LongMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wrap" => Some(Self::Wrap),
            "scroll" => Some(Self::Scroll),
            "dot" => Some(Self::Dot),
            "marquee" => Some(Self::Marquee),
            _ => None,
        }
    }
}

/// Font presets baked into the firmware, in pixels.
pub const FONT_PRESETS: [u8; 5] = [14, 16, 20, 24, 26];

/// Map a requested size to the nearest preset that does not exceed it.
/// Requests below the smallest preset clamp up to it.
pub fn font_preset(requested: i64) -> u8 {
    let mut chosen = FONT_PRESETS[0];
    for &preset in &FONT_PRESETS {
        if i64::from(preset) <= requested {
            chosen = preset;
        }
    }
    chosen
}

/// Retained style state of one node.
#[derive(Debug, Clone, Default)]
pub struct Style {
    pub w: Option<Size>,
    pub h: Option<Size>,
    /// Pixel sizes resolved against the parent at build time.
    pub resolved_w: Option<i32>,
    pub resolved_h: Option<i32>,
    pub align: Option<Align>,
    pub align_x: i32,
    pub align_y: i32,
    pub bg_color: Option<Color>,
    pub bg_opa: Option<u8>,
    pub pad: Option<i32>,
    pub radius: Option<i32>,
    pub gap: Option<i32>,
    pub border_w: Option<i32>,
    pub border_color: Option<Color>,
    pub text_color: Option<Color>,
    pub font_size: Option<u8>,
    pub shadow_w: Option<i32>,
    pub shadow_color: Option<Color>,
    pub opa: u8,
    pub hidden: bool,
    // Flex container state.
    pub flex: Option<FlexFlow>,
    pub justify: FlexAlign,
    pub align_items: FlexAlign,
    pub scrollable: bool,
    // Channels written by animations.
    pub translate_x: i32,
    pub translate_y: i32,
}

impl Style {
    pub fn new() -> Self {
        Self { opa: 255, ..Self::default() }
    }

    /// Width of the content box this node offers its children.
    pub fn content_w(&self, fallback: i32) -> i32 {
        let w = self.resolved_w.unwrap_or(fallback);
        w - 2 * self.pad.unwrap_or(0)
    }

    pub fn content_h(&self, fallback: i32) -> i32 {
        let h = self.resolved_h.unwrap_or(fallback);
        h - 2 * self.pad.unwrap_or(0)
    }
}

fn color_of(obj: &Map<String, Value>, key: &str) -> Option<Color> {
    let s = obj.get(key)?.as_str()?;
    let parsed = Color::parse(s);
    if parsed.is_none() {
        tracing::warn!(key, value = s, "unparseable colour, ignored");
    }
    parsed
}

fn i32_of(obj: &Map<String, Value>, key: &str) -> Option<i32> {
    obj.get(key)?.as_i64().map(|n| n as i32)
}

/// Apply the common style set from `obj` onto `style`. `parent_w`/`parent_h`
/// are the parent's content box, used to resolve relative sizes.
pub fn apply_common(style: &mut Style, obj: &Map<String, Value>, parent_w: i32, parent_h: i32) {
    if let Some(v) = obj.get("w") {
        match Size::parse(v) {
            Some(size) => {
                style.w = Some(size);
                style.resolved_w = size.resolve(parent_w);
            }
            None => tracing::warn!(value = %v, "unparseable width, ignored"),
        }
    }
    if let Some(v) = obj.get("h") {
        match Size::parse(v) {
            Some(size) => {
                style.h = Some(size);
                style.resolved_h = size.resolve(parent_h);
            }
            None => tracing::warn!(value = %v, "unparseable height, ignored"),
        }
    }

    if let Some(s) = obj.get("align").and_then(Value::as_str) {
        match Align::parse(s) {
            Some(align) => {
                style.align = Some(align);
                style.align_x = i32_of(obj, "x").unwrap_or(0);
                style.align_y = i32_of(obj, "y").unwrap_or(0);
            }
            None => tracing::warn!(value = s, "unknown align, ignored"),
        }
    }

    if let Some(c) = color_of(obj, "bg_color") {
        style.bg_color = Some(c);
    }
    if let Some(n) = obj.get("bg_opa").and_then(Value::as_u64) {
        style.bg_opa = Some(n.min(255) as u8);
    }
    if let Some(n) = i32_of(obj, "pad") {
        style.pad = Some(n);
    }
    if let Some(n) = i32_of(obj, "radius") {
        style.radius = Some(n);
    }
    if let Some(n) = i32_of(obj, "gap") {
        style.gap = Some(n);
    }
    if let Some(n) = i32_of(obj, "border_w") {
        style.border_w = Some(n);
    }
    if let Some(c) = color_of(obj, "border_color") {
        style.border_color = Some(c);
    }
    if let Some(c) = color_of(obj, "text_color") {
        style.text_color = Some(c);
    }
    if let Some(n) = obj.get("font_size").and_then(Value::as_i64) {
        style.font_size = Some(font_preset(n));
    }
    if let Some(n) = i32_of(obj, "shadow_w") {
        style.shadow_w = Some(n);
    }
    if let Some(c) = color_of(obj, "shadow_color") {
        style.shadow_color = Some(c);
    }
    if let Some(n) = obj.get("opa").and_then(Value::as_u64) {
        style.opa = n.min(255) as u8;
    }
    if let Some(b) = obj.get("hidden").and_then(Value::as_bool) {
        style.hidden = b;
    }
}

/// Apply flex container keys (`flex`, `justify`, `align_items`,
/// `scrollable`) from `obj` onto `style`.
pub fn apply_flex(style: &mut Style, obj: &Map<String, Value>) {
    if let Some(s) = obj.get("flex").and_then(Value::as_str) {
        match FlexFlow::parse(s) {
            Some(flow) => style.flex = Some(flow),
            None => tracing::warn!(value = s, "unknown flex flow, ignored"),
        }
    }
    if let Some(s) = obj.get("justify").and_then(Value::as_str) {
        match FlexAlign::parse(s) {
            Some(a) => style.justify = a,
            None => tracing::warn!(value = s, "unknown justify, ignored"),
        }
    }
    if let Some(s) = obj.get("align_items").and_then(Value::as_str) {
        match FlexAlign::parse(s) {
            Some(a) => style.align_items = a,
            None => tracing::warn!(value = s, "unknown align_items, ignored"),
        }
    }
    if let Some(b) = obj.get("scrollable").and_then(Value::as_bool) {
        style.scrollable = b;
    }
}

#[cfg(test)]
#[path = "style_tests.rs"]
mod tests;
