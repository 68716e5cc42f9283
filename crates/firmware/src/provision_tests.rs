// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum_test::TestServer;
use tokio_util::sync::CancellationToken;

use super::router;
use crate::hal::sim::MemKv;
use crate::hal::KvStore;

fn portal() -> anyhow::Result<(TestServer, Arc<MemKv>, CancellationToken)> {
    let kv = Arc::new(MemKv::default());
    let done = CancellationToken::new();
    let app = router(Arc::clone(&kv) as Arc<dyn KvStore>, done.clone());
    let server = TestServer::new(app).map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok((server, kv, done))
}

#[tokio::test]
async fn serves_the_form() -> anyhow::Result<()> {
    let (server, _kv, _done) = portal()?;
    let response = server.get("/").await;
    response.assert_status_ok();
    assert!(response.text().contains("form action=\"/provision\""));
    Ok(())
}

#[tokio::test]
async fn valid_submission_stores_and_signals() -> anyhow::Result<()> {
    let (server, kv, done) = portal()?;

    let response = server
        .post("/provision")
        .form(&[("ssid", "workshop"), ("password", "hunter2"), ("ws_url", "wss://srv/ws")])
        .await;
    response.assert_status_ok();

    assert_eq!(kv.get("ssid").as_deref(), Some("workshop"));
    assert_eq!(kv.get("password").as_deref(), Some("hunter2"));
    assert_eq!(kv.get("ws_url").as_deref(), Some("wss://srv/ws"));
    assert!(done.is_cancelled(), "capture ends the portal");
    Ok(())
}

#[tokio::test]
async fn empty_ssid_is_rejected() -> anyhow::Result<()> {
    let (server, kv, done) = portal()?;

    let response = server.post("/provision").form(&[("ssid", "   ")]).await;
    response.assert_status_bad_request();
    assert!(kv.get("ssid").is_none());
    assert!(!done.is_cancelled());
    Ok(())
}

#[tokio::test]
async fn bad_server_url_is_rejected() -> anyhow::Result<()> {
    let (server, kv, _done) = portal()?;

    let response = server
        .post("/provision")
        .form(&[("ssid", "workshop"), ("ws_url", "http://not-a-socket")])
        .await;
    response.assert_status_bad_request();
    assert!(kv.get("ssid").is_none());
    Ok(())
}

#[tokio::test]
async fn password_is_optional() -> anyhow::Result<()> {
    let (server, kv, _done) = portal()?;

    let response = server.post("/provision").form(&[("ssid", "open-net")]).await;
    response.assert_status_ok();
    assert_eq!(kv.get("ssid").as_deref(), Some("open-net"));
    assert_eq!(kv.get("password").as_deref(), Some(""));
    Ok(())
}
