// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action-URI routing for interactive widgets.
//!
//! A binding's URI names where its event goes: `local://topic` stays on the
//! device, `server://topic` goes up the wire under that topic, and anything
//! else (including the empty click default) goes up as a `ui/click` with
//! the widget's ID.

use super::node::ActionBindings;

/// Canonical uplink topic for unrouted click events.
pub const CLICK_TOPIC: &str = "ui/click";

/// Input event delivered to a widget. Press-lost is reported as `Release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCode {
    Click,
    Press,
    Release,
}

/// A resolved event publication, executed by the engine after the scene
/// borrow is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Local bus fan-out instead of uplink.
    pub local: bool,
    pub topic: String,
    pub payload: String,
}

/// Route one URI with a prepared payload.
pub fn route(uri: &str, payload: String) -> Dispatch {
    if let Some(topic) = uri.strip_prefix("local://") {
        Dispatch { local: true, topic: topic.to_owned(), payload }
    } else if let Some(topic) = uri.strip_prefix("server://") {
        Dispatch { local: false, topic: topic.to_owned(), payload }
    } else {
        Dispatch { local: false, topic: CLICK_TOPIC.to_owned(), payload }
    }
}

/// Resolve the dispatch for `code` on a widget with `bindings`.
///
/// Click falls back to an empty URI (canonical `ui/click` uplink); press and
/// release only fire when their URI is present.
pub fn resolve(bindings: &ActionBindings, code: EventCode, widget_id: &str) -> Option<Dispatch> {
    let payload = format!("{{\"id\":\"{widget_id}\"}}");
    match code {
        EventCode::Click => {
            let uri = bindings.on_click.as_deref().unwrap_or("");
            Some(route(uri, payload))
        }
        EventCode::Press => bindings.on_press.as_deref().map(|uri| route(uri, payload)),
        EventCode::Release => bindings.on_release.as_deref().map(|uri| route(uri, payload)),
    }
}

/// Resolve the slider value-report dispatch, fired on release when an
/// `on_change` URI is bound.
pub fn resolve_change(bindings: &ActionBindings, widget_id: &str, value: i32) -> Option<Dispatch> {
    let uri = bindings.on_change.as_deref()?;
    let payload = format!("{{\"id\":\"{widget_id}\",\"value\":{value}}}");
    Some(route(uri, payload))
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
