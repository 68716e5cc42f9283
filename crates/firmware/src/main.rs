// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::{error, info};

use halo::boot::{self, BootOutcome};
use halo::config::Config;
use halo::hal;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Err(e) = config.validate() {
        error!("invalid configuration: {e:#}");
        std::process::exit(2);
    }

    // A provisioning pass ends in a soft restart; loop back into boot with
    // the freshly stored credentials.
    loop {
        let hal = hal::sim::simulated(&config);
        match boot::run(&config, hal).await {
            Ok(BootOutcome::Shutdown) => break,
            Ok(BootOutcome::Restart) => {
                info!("soft restart requested");
                continue;
            }
            Err(e) => {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
