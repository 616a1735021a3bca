// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod send;
pub mod serve;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, TransportMode};

/// Flight Courier CLI
#[derive(Parser, Debug)]
#[command(name = "flight-courier")]
#[command(version)]
#[command(about = "Ship encrypted flight records between a producer and a store", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// TOML configuration file
    #[arg(long, global = true, env = "COURIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the configured transport
    #[arg(long, global = true, value_enum)]
    pub transport: Option<TransportMode>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the consuming side: receive, decrypt and persist records
    Serve(serve::ServeArgs),

    /// Run the producing side: read, encrypt and send records
    Send(send::SendArgs),
}

impl CommonArgs {
    /// Resolve configuration: defaults, file, environment, then flags
    pub fn resolve_config(&self) -> Result<Config> {
        dotenv::dotenv().ok();
        let mut config = Config::load(self.config.as_deref()).context("Failed to load configuration")?;
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        Ok(config)
    }
}

/// Point the active transport at `host`/`port` when given
pub(crate) fn override_endpoint(config: &mut Config, host: Option<String>, port: Option<u16>) {
    let (config_host, config_port) = match config.transport {
        TransportMode::Socket => (&mut config.socket.host, &mut config.socket.port),
        TransportMode::Queue => (
            &mut config.queue.side_channel_host,
            &mut config.queue.side_channel_port,
        ),
        TransportMode::Stream => (&mut config.stream.host, &mut config.stream.port),
    };
    if let Some(host) = host {
        *config_host = host;
    }
    if let Some(port) = port {
        *config_port = port;
    }
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.common.resolve_config()?;
    match cli.command {
        Commands::Serve(args) => serve::serve(config, args).await,
        Commands::Send(args) => send::send(config, args).await,
    }
}
