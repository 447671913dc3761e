// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk — web front-end for document scanners
//
// Entry point. Initialises logging, loads the config, takes a first scanner
// inventory, then serves the HTTP routes.

mod routes;
mod services;
mod views;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use scanwerk_scan::ScanService;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use services::config_file;

#[derive(Parser, Debug)]
#[command(name = "scanwerk")]
#[command(about = "Web front-end for document scanners with two-pass duplex assembly")]
struct Cli {
    /// Address to bind
    #[arg(long, env = "SCANWERK_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(short, long, env = "SCANWERK_PORT", default_value_t = 8000)]
    port: u16,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Config file (default: $XDG_CONFIG_HOME/scanwerk/config.json)
    #[arg(long, env = "CONFIG_FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    info!("Scanwerk starting");

    let config_path = config_file::config_path(cli.config.as_deref());
    let config = config_file::load_or_init(&config_path);
    info!(
        scan_dir = %config.scan_dir.display(),
        backend = ?config.backend,
        "configuration ready"
    );

    let backend = scanwerk_driver::backend_for(config.backend);
    let service = ScanService::start(config, backend);

    // The first inventory completes before the listener opens so the index
    // never starts out empty.
    match service.refresh_registry_now().await {
        Ok(devices) => info!(devices = devices.len(), "scanners discovered"),
        Err(err) => warn!(%err, "initial scanner refresh failed"),
    }

    let app = routes::create_app(service);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["scanwerk"]).expect("parse");
        assert_eq!(cli.port, 8000);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "scanwerk",
            "--host",
            "127.0.0.1",
            "-p",
            "9000",
            "--config",
            "/tmp/scanwerk.json",
        ])
        .expect("parse");
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, 9000);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/scanwerk.json")));
    }
}
