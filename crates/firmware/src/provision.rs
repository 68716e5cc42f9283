// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provisioning credential portal.
//!
//! When the device boots without stored credentials it raises a soft AP and
//! serves this portal; the captive-DNS and AP plumbing are platform
//! collaborators, the form capture is ours. Storing a non-empty `ssid`
//! completes provisioning and the orchestrator soft-restarts.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::hal::KvStore;

/// Embedded portal page. Plain form; the phone's captive browser renders it.
const PORTAL_HTML: &str = r#"<!doctype html>
<html><head><meta name="viewport" content="width=device-width, initial-scale=1">
<title>Device setup</title></head>
<body>
<h1>Device setup</h1>
<form action="/provision" method="post">
  <label>Wi-Fi network <input name="ssid" required></label><br>
  <label>Password <input name="password" type="password"></label><br>
  <label>Server URL <input name="ws_url" placeholder="wss://host/ws"></label><br>
  <button type="submit">Save and restart</button>
</form>
</body></html>
"#;

/// Credentials posted by the portal form.
#[derive(Debug, Deserialize)]
pub struct ProvisionForm {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ws_url: String,
}

/// Shared portal state.
pub struct PortalState {
    kv: Arc<dyn KvStore>,
    /// Cancelled once credentials are stored; ends the portal serve loop.
    done: CancellationToken,
}

/// Build the portal router.
pub fn router(kv: Arc<dyn KvStore>, done: CancellationToken) -> Router {
    let state = Arc::new(PortalState { kv, done });
    Router::new()
        .route("/", get(|| async { Html(PORTAL_HTML) }))
        .route("/provision", post(submit))
        .with_state(state)
}

async fn submit(
    State(state): State<Arc<PortalState>>,
    Form(form): Form<ProvisionForm>,
) -> Result<Html<&'static str>, (axum::http::StatusCode, &'static str)> {
    if form.ssid.trim().is_empty() {
        return Err((axum::http::StatusCode::BAD_REQUEST, "ssid must not be empty"));
    }
    if !form.ws_url.is_empty()
        && !form.ws_url.starts_with("ws://")
        && !form.ws_url.starts_with("wss://")
    {
        return Err((axum::http::StatusCode::BAD_REQUEST, "server URL must be ws:// or wss://"));
    }

    let store = |key: &str, value: &str| state.kv.put(key, value);
    if let Err(e) = store("ssid", form.ssid.trim())
        .and_then(|()| store("password", &form.password))
        .and_then(|()| store("ws_url", &form.ws_url))
    {
        tracing::error!(err = %e, "credential store failed");
        return Err((axum::http::StatusCode::INTERNAL_SERVER_ERROR, "store failed"));
    }

    tracing::info!(ssid = %form.ssid.trim(), "credentials captured, restarting");
    state.done.cancel();
    Ok(Html("<h1>Saved.</h1><p>The device is restarting.</p>"))
}

/// Serve the portal until credentials are captured (or `cancel` fires).
pub async fn run_portal(
    port: u16,
    kv: Arc<dyn KvStore>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let done = cancel.child_token();
    let app = router(kv, done.clone());
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "provisioning portal up");
    axum::serve(listener, app).with_graceful_shutdown(done.cancelled_owned()).await?;
    Ok(())
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
