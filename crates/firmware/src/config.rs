// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Server-driven UI terminal firmware.
#[derive(Debug, Clone, Parser)]
#[command(name = "halo", version, about)]
pub struct Config {
    /// WebSocket URL of the SDUI server. Overrides the provisioned value.
    #[arg(long, env = "HALO_WS_URL")]
    pub ws_url: Option<String>,

    /// Path to the key-value store backing file (in-memory if unset).
    #[arg(long, env = "HALO_KV_PATH")]
    pub kv_path: Option<PathBuf>,

    /// Provisioning portal HTTP port.
    #[arg(long, default_value_t = 8080, env = "HALO_PORTAL_PORT")]
    pub portal_port: u16,

    /// Internal (fast SRAM) pool capacity in bytes.
    #[arg(long, default_value_t = 356_000, env = "HALO_INTERNAL_HEAP")]
    pub internal_heap: usize,

    /// PSRAM pool capacity in bytes.
    #[arg(long, default_value_t = 8_388_608, env = "HALO_PSRAM_HEAP")]
    pub psram_heap: usize,

    /// Telemetry heartbeat period in seconds.
    #[arg(long, default_value_t = 30, env = "HALO_TELEMETRY_PERIOD")]
    pub telemetry_period: u64,

    /// User inactivity before the screen sleeps, in seconds.
    #[arg(long, default_value_t = 30, env = "HALO_SCREEN_SLEEP")]
    pub screen_sleep: u64,

    /// Log format (json or text).
    #[arg(long, env = "HALO_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "HALO_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.log_format != "json" && self.log_format != "text" {
            anyhow::bail!("--log-format must be 'json' or 'text'");
        }
        if self.internal_heap < 64 * 1024 {
            anyhow::bail!("--internal-heap below the minimum the boot sequence can reserve from");
        }
        if let Some(ref url) = self.ws_url {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                anyhow::bail!("--ws-url must be a ws:// or wss:// URL");
            }
        }
        Ok(())
    }

    pub fn telemetry_period(&self) -> Duration {
        Duration::from_secs(self.telemetry_period)
    }

    pub fn screen_sleep(&self) -> Duration {
        Duration::from_secs(self.screen_sleep)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
