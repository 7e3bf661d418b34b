//! peerguard-worker - demo worker guarded by the liveness watchdog
//!
//! Serves a small line protocol over TCP. `SLEEP <n>` runs a long unit of
//! work; while it runs the watchdog probes the client and cancels the work if
//! the client has silently gone away.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod config;
mod connection;
mod error;
mod protocol;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::WorkerConfig;

#[derive(Parser, Debug)]
#[command(name = "peerguard-worker")]
#[command(about = "Line-protocol worker whose long commands are cancelled when the client vanishes")]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    listen: Option<String>,

    /// Enable the liveness watchdog for new sessions
    #[arg(long)]
    enable: bool,

    /// Seconds between liveness probes
    #[arg(long)]
    interval: Option<u32>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn resolve_config(&self) -> Result<WorkerConfig> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => WorkerConfig::default(),
        };

        if let Some(listen) = &self.listen {
            config.listen.clone_from(listen);
        }
        if self.enable {
            config.watchdog.enabled = true;
        }
        if let Some(interval) = self.interval {
            config.watchdog.interval_secs = interval;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("peerguard_worker={log_level},peerguard_watchdog={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = cli.resolve_config()?;
    tracing::info!(
        enabled = config.watchdog.enabled,
        interval_secs = config.watchdog.interval_secs,
        "watchdog configured"
    );

    let listener = server::bind(&config)
        .with_context(|| format!("failed to listen on {}", config.listen))?;
    server::run(&listener, config).context("server stopped")
}
