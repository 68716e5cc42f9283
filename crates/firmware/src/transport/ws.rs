// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound WebSocket client task.
//!
//! One connection to the SDUI server, restarted on a fixed timer after any
//! failure. Sends are strictly non-blocking: while the link is anything but
//! `Connected` the text is dropped with a debug log and no error surfaces.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::reassembly::{Chunk, Reassembler};

/// Delay between a disconnect and the next connection attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Connection state of the transport link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Connecting = 0,
    Connected = 1,
    Disconnected = 2,
}

impl LinkState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Connected,
            _ => Self::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Cheap cloneable handle for outbound sends and link-state queries.
///
/// Created before the connection task starts (the link reads as
/// `Disconnected` until then), so the bus can exist before the network does.
#[derive(Clone)]
pub struct TransportHandle {
    tx: mpsc::UnboundedSender<String>,
    state: Arc<AtomicU8>,
}

impl TransportHandle {
    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Queue `text` for the server. Dropped silently unless connected.
    pub fn send(&self, text: &str) {
        if self.state() != LinkState::Connected {
            tracing::debug!(len = text.len(), "link down, send dropped");
            return;
        }
        if self.tx.send(text.to_owned()).is_err() {
            tracing::debug!("transport task gone, send dropped");
        }
    }
}

/// The connection task, created detached from its handle so boot can wire
/// the bus first and start the network later.
pub struct Transport {
    rx: mpsc::UnboundedReceiver<String>,
    state: Arc<AtomicU8>,
}

impl Transport {
    /// Create the transport endpoint pair. The link starts `Disconnected`.
    pub fn channel() -> (Self, TransportHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(LinkState::Disconnected as u8));
        (Self { rx, state: Arc::clone(&state) }, TransportHandle { tx, state })
    }

    /// Spawn the connection task.
    ///
    /// `on_complete` is invoked exactly once per complete application
    /// message, in the transport task's context.
    pub fn start(
        self,
        url: String,
        on_complete: impl Fn(&str) + Send + Sync + 'static,
        cancel: CancellationToken,
    ) {
        tokio::spawn(run_loop(url, self.rx, self.state, on_complete, cancel));
    }
}

async fn run_loop(
    url: String,
    mut send_rx: mpsc::UnboundedReceiver<String>,
    state: Arc<AtomicU8>,
    on_complete: impl Fn(&str) + Send + Sync + 'static,
    cancel: CancellationToken,
) {
    let set_state = |s: LinkState| state.store(s as u8, Ordering::Release);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        set_state(LinkState::Connecting);
        match tokio_tungstenite::connect_async(&url).await {
            Ok((ws_stream, _)) => {
                set_state(LinkState::Connected);
                tracing::info!(url = %url, "ws connected");

                // Sends queued while offline were already dropped at the
                // handle; drain anything that raced the state change.
                while send_rx.try_recv().is_ok() {}

                let (mut write, mut read) = ws_stream.split();
                let mut reasm = Reassembler::new();

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            set_state(LinkState::Disconnected);
                            return;
                        }

                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    // The library hands over whole messages;
                                    // the reassembler also accepts raw
                                    // fragment streams from other sources.
                                    if let Some(complete) = reasm.push(Chunk::whole(text.as_bytes())) {
                                        on_complete(&complete);
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    tracing::debug!("ws closed by server");
                                    break;
                                }
                                Some(Err(e)) => {
                                    tracing::debug!(err = %e, "ws read error");
                                    break;
                                }
                                _ => {} // binary, ping, pong ignored
                            }
                        }

                        out = send_rx.recv() => {
                            match out {
                                Some(text) => {
                                    if write.send(Message::Text(text.into())).await.is_err() {
                                        tracing::debug!("ws write failed");
                                        break;
                                    }
                                }
                                None => {
                                    set_state(LinkState::Disconnected);
                                    return; // all handles dropped
                                }
                            }
                        }
                    }
                }

                reasm.reset();
            }
            Err(e) => {
                tracing::debug!(err = %e, "ws connect failed");
            }
        }

        set_state(LinkState::Disconnected);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

/// A handle wired straight to a receiver, with the link already `Connected`.
/// Lets component tests observe uplink frames without a socket.
#[cfg(test)]
pub(crate) fn connected_handle() -> (TransportHandle, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(AtomicU8::new(LinkState::Connected as u8));
    (TransportHandle { tx, state }, rx)
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
