// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;

use super::override_endpoint;
use crate::config::Config;
use crate::records::{JsonFileSource, RecordSource};
use crate::transport::Channel;

/// Arguments for the send command
#[derive(Args, Debug)]
pub struct SendArgs {
    /// JSON file holding an array of flight records
    #[arg(long, env = "COURIER_SOURCE_PATH")]
    pub source: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(long)]
    pub port: Option<u16>,
}

/// Read every record and ship it over the configured transport
pub async fn send(mut config: Config, args: SendArgs) -> Result<()> {
    if let Some(path) = args.source {
        config.source.path = path;
    }
    override_endpoint(&mut config, args.host, args.port);
    config.validate_client()?;

    let records = JsonFileSource::new(&config.source.path).read_all().await?;
    println!(
        "📤 Sending {} records over {}",
        records.len(),
        config.transport
    );

    let mut channel = Channel::connect(&config)
        .await
        .with_context(|| format!("Failed to connect {} transport", config.transport))?;

    let result = channel
        .send_all(&records, |_| {
            print!(".");
            std::io::stdout().flush().ok();
        })
        .await;
    println!();

    let report = result.with_context(|| format!("Transfer aborted after {} records", channel.sent()))?;
    println!(
        "✅ Sent {} records in {:.2}s",
        report.sent,
        report.elapsed.as_secs_f64()
    );
    if let Some(acks) = report.acks {
        println!(
            "   Server acknowledged {} records, rejected {}",
            acks.succeeded, acks.failed
        );
    }
    Ok(())
}
