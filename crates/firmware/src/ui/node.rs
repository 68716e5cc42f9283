// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retained scene-graph nodes.
//!
//! The scene graph is a strict tree. Everything a node owns (decoded image
//! pixels, action bindings, particle canvases, animation state) is dropped
//! with the node, so "released exactly once on deletion" falls out of
//! ownership rather than manual hooks.

use serde_json::{Map, Value};

use super::anim::Active;
use super::particle::ParticleState;
use super::style::{LongMode, Style};
use crate::mem::PoolBuf;

/// Stable identity of a retained node within one scene graph generation.
pub type NodeUid = u64;

/// Atomic widget types the server may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Container,
    Label,
    Button,
    Image,
    Bar,
    Slider,
    Particle,
}

impl NodeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "container" => Some(Self::Container),
            "label" => Some(Self::Label),
            "button" => Some(Self::Button),
            "image" => Some(Self::Image),
            "bar" => Some(Self::Bar),
            "slider" => Some(Self::Slider),
            "particle" => Some(Self::Particle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Label => "label",
            Self::Button => "button",
            Self::Image => "image",
            Self::Bar => "bar",
            Self::Slider => "slider",
            Self::Particle => "particle",
        }
    }
}

/// Action URIs bound to an interactive node.
#[derive(Debug, Clone, Default)]
pub struct ActionBindings {
    pub on_click: Option<String>,
    pub on_press: Option<String>,
    pub on_release: Option<String>,
    /// Slider value-report URI, consulted on release.
    pub on_change: Option<String>,
}

impl ActionBindings {
    /// Extract bindings from a node object. `None` when no action key is
    /// present, so non-interactive nodes carry no binding allocation.
    pub fn parse(obj: &Map<String, Value>) -> Option<Box<Self>> {
        let uri = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_owned);
        let bindings = Self {
            on_click: uri("on_click"),
            on_press: uri("on_press"),
            on_release: uri("on_release"),
            on_change: uri("on_change"),
        };
        if bindings.on_click.is_none()
            && bindings.on_press.is_none()
            && bindings.on_release.is_none()
            && bindings.on_change.is_none()
        {
            return None;
        }
        Some(Box::new(bindings))
    }
}

/// Decoded image pixels owned by an image node.
#[derive(Debug)]
pub struct ImageData {
    /// Raw RGB565, `w * h * 2` bytes, PSRAM.
    pub pixels: PoolBuf,
    pub w: u16,
    pub h: u16,
}

/// Kind-specific retained state.
pub enum NodeData {
    None,
    Label {
        text: String,
        long_mode: LongMode,
    },
    Image {
        /// Absent when decode or allocation failed; the widget still exists.
        data: Option<ImageData>,
        /// Current rotation in centi-degrees, around the centre pivot.
        rotation_cd: i32,
    },
    Bar {
        min: i32,
        max: i32,
        value: i32,
        indic_color: Option<super::style::Color>,
    },
    Slider {
        min: i32,
        max: i32,
        value: i32,
    },
    Particle(Option<Box<ParticleState>>),
}

/// One retained widget.
pub struct Node {
    pub uid: NodeUid,
    pub id: Option<String>,
    pub kind: NodeKind,
    pub style: Style,
    pub data: NodeData,
    pub actions: Option<Box<ActionBindings>>,
    pub anims: Vec<Active>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(uid: NodeUid, kind: NodeKind) -> Self {
        Self {
            uid,
            id: None,
            kind,
            style: Style::new(),
            data: NodeData::None,
            actions: None,
            anims: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Depth-first lookup by uid.
    pub fn find(&self, uid: NodeUid) -> Option<&Node> {
        if self.uid == uid {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(uid))
    }

    pub fn find_mut(&mut self, uid: NodeUid) -> Option<&mut Node> {
        if self.uid == uid {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(uid))
    }

    /// Label text of this node, or of its first child for the button
    /// convention.
    pub fn text(&self) -> Option<&str> {
        if let NodeData::Label { ref text, .. } = self.data {
            return Some(text);
        }
        self.children.first().and_then(|c| match c.data {
            NodeData::Label { ref text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Total node count of this subtree, including self.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }
}
