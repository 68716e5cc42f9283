// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic-routed publish/subscribe bus.
//!
//! One mechanism carries three flows: downlink frames from the transport are
//! demultiplexed by topic, uplink publishes are wrapped in the wire envelope
//! and handed to the transport, and local events fan out in-process without
//! touching the wire.
//!
//! Payloads cross the bus as strings; parsing beyond the outer envelope is
//! the subscriber's business. The bus does not own payload memory past a
//! dispatch call; callbacks copy what they keep.
//!
//! Subscription happens during boot, before routing begins; there is no
//! unsubscribe and the table is not safe to mutate from inside a callback.

use serde::Deserialize;
use serde_json::Value;

use parking_lot::RwLock;

use crate::transport::TransportHandle;

/// Fixed capacity of the subscription table.
pub const MAX_SUBSCRIPTIONS: usize = 15;

type Callback = Box<dyn Fn(&str) + Send + Sync>;

struct Subscription {
    topic: String,
    callback: Callback,
}

/// The outer wrapper on every wire message.
#[derive(Debug, Deserialize)]
struct Envelope {
    topic: String,
    payload: Value,
}

/// Process-wide message bus.
pub struct Bus {
    subs: RwLock<Vec<Subscription>>,
    uplink: TransportHandle,
}

impl Bus {
    pub fn new(uplink: TransportHandle) -> Self {
        Self { subs: RwLock::new(Vec::new()), uplink }
    }

    /// Register `callback` for `topic`. Silently dropped (with an error log)
    /// once the table is full. Subscribers to the same topic are delivered
    /// in registration order.
    pub fn subscribe(&self, topic: &str, callback: impl Fn(&str) + Send + Sync + 'static) {
        let mut subs = self.subs.write();
        if subs.len() >= MAX_SUBSCRIPTIONS {
            tracing::error!(topic, "subscription table full, subscriber dropped");
            return;
        }
        subs.push(Subscription { topic: topic.to_owned(), callback: Box::new(callback) });
    }

    /// Demultiplex one complete downlink frame.
    ///
    /// The outer envelope is parsed here; the payload reaches subscribers as
    /// a string: the literal value when the payload is a JSON string,
    /// compact re-serialisation otherwise.
    pub fn route_down(&self, raw_text: &str) {
        let envelope: Envelope = match serde_json::from_str(raw_text) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(err = %e, "malformed downlink frame, ignored");
                return;
            }
        };

        let payload = match envelope.payload {
            Value::String(s) => s,
            other => match serde_json::to_string(&other) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(err = %e, topic = %envelope.topic, "payload not serialisable, ignored");
                    return;
                }
            },
        };

        self.dispatch(&envelope.topic, &payload);
    }

    /// Wrap `payload` in the wire envelope and queue it for the server.
    ///
    /// A payload that parses as JSON is embedded structurally; anything else
    /// is embedded as a JSON string. Non-blocking: dropped while offline.
    pub fn publish_up(&self, topic: &str, payload: &str) {
        let value = serde_json::from_str::<Value>(payload)
            .unwrap_or_else(|_| Value::String(payload.to_owned()));
        let frame = serde_json::json!({ "topic": topic, "payload": value });
        match serde_json::to_string(&frame) {
            Ok(text) => self.uplink.send(&text),
            Err(e) => tracing::warn!(err = %e, topic, "uplink frame serialisation failed"),
        }
    }

    /// Fan `payload` out to local subscribers of `topic`. No serialisation,
    /// no transport.
    pub fn publish_local(&self, topic: &str, payload: &str) {
        self.dispatch(topic, payload);
    }

    fn dispatch(&self, topic: &str, payload: &str) {
        let subs = self.subs.read();
        let mut delivered = 0usize;
        for sub in subs.iter().filter(|s| s.topic == topic) {
            (sub.callback)(payload);
            delivered += 1;
        }
        if delivered == 0 {
            tracing::debug!(topic, "no subscriber for topic");
        }
    }

    /// Number of registered subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subs.read().len()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
