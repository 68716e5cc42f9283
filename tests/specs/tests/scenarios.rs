// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end protocol scenarios against the in-process fake server.

use std::time::Duration;

use base64::Engine as _;
use serde_json::json;

use halo::transport::LinkState;
use halo::ui::action::EventCode;
use halo::ui::node::NodeData;
use halo_specs::{wait_for, FakeServer, TestDevice};

const CONNECT: Duration = Duration::from_secs(5);
const FRAME: Duration = Duration::from_secs(2);

async fn connected_pair() -> anyhow::Result<(FakeServer, TestDevice)> {
    let server = FakeServer::spawn().await?;
    let device = TestDevice::boot(&server.url()).await?;
    server.wait_connected(CONNECT).await?;
    Ok((server, device))
}

#[tokio::test(flavor = "multi_thread")]
async fn hold_to_talk() -> anyhow::Result<()> {
    let (mut server, device) = connected_pair().await?;

    server.send(
        "ui/layout",
        json!([{
            "type": "button", "id": "talk", "text": "Hold to talk",
            "on_press": "local://audio/cmd/record_start",
            "on_release": "local://audio/cmd/record_stop"
        }]),
    )?;
    let ui = std::sync::Arc::clone(device.ui());
    assert!(wait_for(move || ui.find_by_id("talk").is_some(), FRAME).await);

    device.ui().pointer("talk", EventCode::Press);

    let start = server.recv_on("audio/record", FRAME).await?;
    assert_eq!(start["payload"]["state"], "start");

    let stream = server.recv_on("audio/record", FRAME).await?;
    assert_eq!(stream["payload"]["state"], "stream");
    let data = stream["payload"]["data"].as_str().unwrap_or("");
    assert!(!data.is_empty());
    base64::engine::general_purpose::STANDARD.decode(data)?;

    device.ui().pointer("talk", EventCode::Release);

    // Drain until the stop transition, then the stream goes quiet within
    // one chunk period (plus in-flight slack).
    let deadline = tokio::time::Instant::now() + FRAME;
    loop {
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "no stop frame");
        let frame = server.recv_on("audio/record", FRAME).await?;
        if frame["payload"]["state"] == "stop" {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    while server.recv_on("audio/record", Duration::from_millis(1)).await.is_ok() {}
    assert!(
        server.silent_on("audio/record", Duration::from_millis(200)).await,
        "stream frames must cease after stop"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn counter_increment() -> anyhow::Result<()> {
    let (mut server, device) = connected_pair().await?;

    server.send(
        "ui/layout",
        json!([
            {"type": "label", "id": "count", "text": "0"},
            {"type": "button", "id": "btn", "text": "+1"}
        ]),
    )?;
    let ui = std::sync::Arc::clone(device.ui());
    assert!(wait_for(move || ui.find_by_id("btn").is_some(), FRAME).await);

    device.ui().pointer("btn", EventCode::Click);

    let click = server.recv_on("ui/click", FRAME).await?;
    assert_eq!(click["payload"]["id"], "btn");

    // The fake server plays the application: bump the counter.
    server.send("ui/update", json!({"id": "count", "text": "1"}))?;

    let ui = std::sync::Arc::clone(device.ui());
    let shown = wait_for(
        move || ui.with_node("count", |n| n.text() == Some("1")) == Some(true),
        FRAME,
    )
    .await;
    assert!(shown, "label should show the updated count");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn large_layout_arrives_as_one_render() -> anyhow::Result<()> {
    let (server, device) = connected_pair().await?;

    // ~12 KiB of layout: sixty labels with long texts.
    let filler = "lorem ipsum dolor sit amet ".repeat(8);
    let nodes: Vec<serde_json::Value> = (0..60)
        .map(|i| json!({"type": "label", "id": format!("line{i}"), "text": format!("{i}: {filler}")}))
        .collect();
    let layout = serde_json::Value::Array(nodes);
    assert!(layout.to_string().len() > 12 * 1024);

    server.send("ui/layout", layout)?;

    let ui = std::sync::Arc::clone(device.ui());
    assert!(wait_for(move || ui.find_by_id("line59").is_some(), CONNECT).await);
    assert_eq!(device.ui().node_count(), 60, "exactly one render of the whole tree");
    let text = device.ui().with_node("line42", |n| n.text().map(str::to_owned));
    assert_eq!(text.flatten().map(|t| t.starts_with("42:")), Some(true));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_sends_drop_then_reconnect_delivers() -> anyhow::Result<()> {
    let (server, device) = connected_pair().await?;

    let port = server.stop();
    let link = device.runtime.link.clone();
    assert!(
        wait_for(move || link.state() != LinkState::Connected, CONNECT).await,
        "device should notice the dead server"
    );

    // 100 offline publishes return immediately and produce no I/O.
    let begin = std::time::Instant::now();
    for i in 0..100 {
        device.bus().publish_up("debug/ping", &format!("{{\"n\":{i}}}"));
    }
    assert!(begin.elapsed() < Duration::from_millis(200), "offline sends must not block");

    // Resurrect the server at the same address; the 5 s reconnect timer
    // brings the device back.
    let mut server = FakeServer::spawn_on(port).await?;
    server.wait_connected(Duration::from_secs(8)).await?;

    device.bus().publish_up("debug/ping", r#"{"n":"fresh"}"#);
    let frame = server.recv_on("debug/ping", FRAME).await?;
    assert_eq!(frame["payload"]["n"], "fresh");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn shake_fires_once_per_cooldown() -> anyhow::Result<()> {
    let (mut server, device) = connected_pair().await?;

    // 2.5 s of continuous above-threshold samples at the 10 Hz poll rate.
    for _ in 0..25 {
        device.accel.push_sample([0.0, 0.0, 16.0]);
    }

    let first = server.recv_on("motion", Duration::from_secs(3)).await?;
    assert_eq!(first["payload"]["type"], "shake");
    let magnitude = first["payload"]["magnitude"].as_f64().unwrap_or(0.0);
    assert!(magnitude > 14.7, "magnitude {magnitude} below threshold");

    // The ten-sample cooldown keeps the next second quiet...
    assert!(
        server.silent_on("motion", Duration::from_millis(900)).await,
        "cooldown must swallow the burst"
    );
    // ...then the still-shaking device fires again.
    server.recv_on("motion", Duration::from_secs(2)).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn particles_freeze_while_recording() -> anyhow::Result<()> {
    let (server, device) = connected_pair().await?;

    server.send("ui/layout", json!([{"type": "particle", "id": "fx", "canvas_w": 80, "canvas_h": 80}]))?;

    let frames = {
        let ui = std::sync::Arc::clone(device.ui());
        move || {
            ui.with_node("fx", |n| match n.data {
                NodeData::Particle(Some(ref s)) => s.frames,
                _ => 0,
            })
            .unwrap_or(0)
        }
    };

    let running = {
        let frames = frames.clone();
        wait_for(move || frames() > 2, FRAME).await
    };
    assert!(running, "particle frames should advance while idle");

    device.bus().publish_local("audio/cmd/record_start", "{}");
    tokio::time::sleep(Duration::from_millis(120)).await;
    let frozen_at = frames();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(frames(), frozen_at, "no canvas writes during recording");

    device.bus().publish_local("audio/cmd/record_stop", "{}");
    let resumed = {
        let frames = frames.clone();
        wait_for(move || frames() > frozen_at, Duration::from_millis(300)).await
    };
    assert!(resumed, "frames resume within a timer period of stopping");
    Ok(())
}
