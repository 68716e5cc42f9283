// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end harness: an in-process fake SDUI server plus a fully booted
//! device runtime on simulated hardware.
//!
//! The fake server is the authority the protocol assumes: scenarios script
//! it with layout/update/play frames and assert on the uplink frames the
//! device produces.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use halo::boot::{self, Started};
use halo::config::Config;
use halo::hal::sim::{MemKv, SimAccel, SimBacklight, SimCodec, SimMonitor, SimWifi};
use halo::hal::{Hal, KvStore};

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

// -- Fake SDUI server ---------------------------------------------------------

struct ServerState {
    /// Sender to the currently connected device, if any.
    to_device: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Uplink frames received from the device.
    from_device: mpsc::UnboundedSender<String>,
    connections: AtomicUsize,
    /// Cancelled on [`FakeServer::stop`]; tears down open connections too.
    shutdown: CancellationToken,
}

/// An in-process SDUI server a device can connect to.
pub struct FakeServer {
    port: u16,
    state: Arc<ServerState>,
    uplink: mpsc::UnboundedReceiver<String>,
    serve_task: JoinHandle<()>,
}

impl FakeServer {
    /// Serve on a fresh port.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_on(free_port()?).await
    }

    /// Serve on a specific port (so a scenario can stop and resurrect the
    /// server at the same address).
    pub async fn spawn_on(port: u16) -> anyhow::Result<Self> {
        let (from_tx, uplink) = mpsc::unbounded_channel();
        let state = Arc::new(ServerState {
            to_device: Mutex::new(None),
            from_device: from_tx,
            connections: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        });

        let app = Router::new().route("/ws", get(ws_handler)).with_state(Arc::clone(&state));
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let serve_task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { port, state, uplink, serve_task })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    /// Wait until a device holds an open connection.
    pub async fn wait_connected(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.state.connections.load(Ordering::Acquire) > 0 {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::bail!("device did not connect within {timeout:?}")
    }

    /// Send one downlink envelope to the connected device.
    pub fn send(&self, topic: &str, payload: serde_json::Value) -> anyhow::Result<()> {
        let frame = serde_json::json!({ "topic": topic, "payload": payload }).to_string();
        let guard = self.state.to_device.lock();
        let tx = guard.as_ref().ok_or_else(|| anyhow::anyhow!("no device connected"))?;
        tx.send(frame)?;
        Ok(())
    }

    /// Receive the next uplink envelope, whatever its topic.
    pub async fn recv(&mut self, timeout: Duration) -> anyhow::Result<serde_json::Value> {
        let frame = tokio::time::timeout(timeout, self.uplink.recv())
            .await
            .map_err(|_| anyhow::anyhow!("no uplink frame within {timeout:?}"))?
            .ok_or_else(|| anyhow::anyhow!("uplink channel closed"))?;
        Ok(serde_json::from_str(&frame)?)
    }

    /// Receive the next uplink envelope on `topic`, discarding others
    /// (heartbeats and stream frames interleave freely).
    pub async fn recv_on(
        &mut self,
        topic: &str,
        timeout: Duration,
    ) -> anyhow::Result<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .ok_or_else(|| anyhow::anyhow!("no {topic} frame within {timeout:?}"))?;
            let frame = self.recv(remaining).await?;
            if frame["topic"] == topic {
                return Ok(frame);
            }
        }
    }

    /// True when no uplink frame on `topic` arrives within `window`.
    pub async fn silent_on(&mut self, topic: &str, window: Duration) -> bool {
        self.recv_on(topic, window).await.is_err()
    }

    /// Tear the server down, dropping the device connection.
    pub fn stop(self) -> u16 {
        self.state.shutdown.cancel();
        self.serve_task.abort();
        self.port
    }
}

async fn ws_handler(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_device(socket, state))
}

/// Per-connection pump: scripted frames down, uplink frames into the queue.
async fn handle_device(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (to_tx, mut to_rx) = mpsc::unbounded_channel::<String>();
    *state.to_device.lock() = Some(to_tx);
    state.connections.fetch_add(1, Ordering::AcqRel);

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            frame = to_rx.recv() => {
                match frame {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = state.from_device.send(text.to_string());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    state.connections.fetch_sub(1, Ordering::AcqRel);
    *state.to_device.lock() = None;
}

// -- Booted device ------------------------------------------------------------

/// A booted device runtime on simulated hardware. Cancelled on drop.
pub struct TestDevice {
    pub runtime: Box<halo::boot::Runtime>,
    pub codec: Arc<SimCodec>,
    pub accel: Arc<SimAccel>,
    pub backlight: Arc<SimBacklight>,
    pub monitor: Arc<SimMonitor>,
    cancel: CancellationToken,
}

impl TestDevice {
    /// Boot a provisioned device pointed at `server_url`.
    pub async fn boot(server_url: &str) -> anyhow::Result<Self> {
        let codec = Arc::new(SimCodec::new());
        let accel = Arc::new(SimAccel::new());
        let backlight = Arc::new(SimBacklight::new());
        let monitor = Arc::new(SimMonitor::new());
        let kv: Arc<dyn KvStore> = Arc::new(MemKv::provisioned("testnet", "secret", server_url));
        let hal = Hal {
            codec: Arc::clone(&codec) as _,
            accel: Arc::clone(&accel) as _,
            monitor: Arc::clone(&monitor) as _,
            backlight: Arc::clone(&backlight) as _,
            kv,
            wifi: Arc::new(SimWifi::new()),
        };

        let config = parse_config(&[])?;
        let cancel = CancellationToken::new();
        match boot::start(&config, hal, cancel.clone()).await? {
            Started::Running(runtime) => Ok(Self { runtime, codec, accel, backlight, monitor, cancel }),
            Started::Reprovisioned => anyhow::bail!("provisioned device entered provisioning"),
        }
    }

    pub fn ui(&self) -> &Arc<halo::ui::Ui> {
        &self.runtime.ui
    }

    pub fn bus(&self) -> &Arc<halo::bus::Bus> {
        &self.runtime.bus
    }

    pub fn audio(&self) -> &Arc<halo::audio::Audio> {
        &self.runtime.audio
    }
}

impl Drop for TestDevice {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Parse a firmware [`Config`] from extra CLI arguments.
pub fn parse_config(args: &[&str]) -> anyhow::Result<Config> {
    use clap::Parser as _;
    let mut full = vec!["halo"];
    full.extend_from_slice(args);
    Ok(Config::try_parse_from(full)?)
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
