// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot-time provisioning branch: an unprovisioned device raises the portal,
//! captures credentials, and asks for a soft restart.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use halo::boot::{self, Started};
use halo::hal::sim::{MemKv, SimAccel, SimBacklight, SimCodec, SimMonitor, SimWifi};
use halo::hal::{Hal, KvStore};
use halo_specs::{free_port, parse_config};

fn sim_hal(kv: Arc<MemKv>) -> Hal {
    Hal {
        codec: Arc::new(SimCodec::new()),
        accel: Arc::new(SimAccel::new()),
        monitor: Arc::new(SimMonitor::new()),
        backlight: Arc::new(SimBacklight::new()),
        kv: kv as Arc<dyn KvStore>,
        wifi: Arc::new(SimWifi::new()),
    }
}

/// Raw HTTP/1.1 form POST, the way a captive browser would deliver it.
async fn http_post_form(port: u16, path: &str, body: &str) -> anyhow::Result<String> {
    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port)).await?;
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[tokio::test(flavor = "multi_thread")]
async fn portal_capture_requests_restart() -> anyhow::Result<()> {
    let port = free_port()?;
    let kv = Arc::new(MemKv::default());
    let hal = sim_hal(Arc::clone(&kv));
    let config = parse_config(&["--portal-port", &port.to_string()])?;
    let cancel = CancellationToken::new();

    let boot_task = tokio::spawn(async move { boot::start(&config, hal, cancel).await });

    // Wait for the portal to come up, then submit the form.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    let response = loop {
        anyhow::ensure!(tokio::time::Instant::now() < deadline, "portal never came up");
        match http_post_form(
            port,
            "/provision",
            "ssid=homelab&password=hunter2&ws_url=ws%3A%2F%2Fserver%2Fws",
        )
        .await
        {
            Ok(resp) => break resp,
            Err(_) => tokio::time::sleep(std::time::Duration::from_millis(50)).await,
        }
    };
    assert!(response.contains("200"), "portal rejected the form: {response}");

    match boot_task.await?? {
        Started::Reprovisioned => {}
        Started::Running(_) => anyhow::bail!("boot should have taken the provisioning branch"),
    }

    assert_eq!(kv.get("ssid").as_deref(), Some("homelab"));
    assert_eq!(kv.get("password").as_deref(), Some("hunter2"));
    assert_eq!(kv.get("ws_url").as_deref(), Some("ws://server/ws"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn provisioned_device_skips_the_portal() -> anyhow::Result<()> {
    // A provisioned device heads straight for the cloud branch; the
    // unreachable server just leaves the link down.
    let kv = Arc::new(MemKv::provisioned("homelab", "hunter2", "ws://127.0.0.1:9/ws"));
    let hal = sim_hal(kv);
    let config = parse_config(&[])?;
    let cancel = CancellationToken::new();

    match boot::start(&config, hal, cancel.clone()).await? {
        Started::Running(runtime) => {
            assert!(runtime.ui.find_by_id("boot_status").is_some(), "loading screen is up");
            cancel.cancel();
        }
        Started::Reprovisioned => anyhow::bail!("provisioned device must not re-enter the portal"),
    }
    Ok(())
}
