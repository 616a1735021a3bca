// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::override_endpoint;
use crate::config::{Config, TransportMode};
use crate::records::{JsonLinesSink, RecordSink};
use crate::transport::{
    connect_queue, QueueReceiver, SideChannelListener, SocketServer, StreamServer,
};

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Output file for persisted records (JSON lines)
    #[arg(long, env = "COURIER_SINK_PATH")]
    pub sink: Option<PathBuf>,

    /// Listen address host
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port (0 picks a free port)
    #[arg(long)]
    pub port: Option<u16>,
}

/// Run the consuming side until interrupted
pub async fn serve(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(path) = args.sink {
        config.sink.path = path;
    }
    override_endpoint(&mut config, args.host, args.port);
    config.validate()?;

    let sink: Arc<dyn RecordSink> = Arc::new(
        JsonLinesSink::open(&config.sink.path)
            .await
            .with_context(|| format!("Failed to open sink {}", config.sink.path.display()))?,
    );
    info!("Persisting records to {}", config.sink.path.display());

    match config.transport {
        TransportMode::Socket => serve_socket(&config, sink).await,
        TransportMode::Queue => serve_queue(&config, sink).await,
        TransportMode::Stream => serve_stream(&config, sink).await,
    }
}

async fn serve_socket(config: &Config, sink: Arc<dyn RecordSink>) -> Result<()> {
    let mut server = SocketServer::new(config.socket.address(), sink).start().await?;
    println!("🚀 Socket server listening on {}", server.local_addr());

    loop {
        tokio::select! {
            report = server.next_report() => {
                let Some(report) = report else { break };
                match report.result {
                    Ok(stats) => println!(
                        "✅ Session from {} complete: {} records persisted",
                        report.peer, stats.persisted
                    ),
                    Err(e) => println!("❌ Session from {} failed: {}", report.peer, e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    server.shutdown().await;
    Ok(())
}

async fn serve_queue(config: &Config, sink: Arc<dyn RecordSink>) -> Result<()> {
    let queue = connect_queue(config).await?;
    let listener = SideChannelListener::bind(&config.queue.side_channel_address()).await?;
    println!(
        "🚀 Consuming queue '{}', key exchange on {}",
        config.queue.queue_name,
        listener.local_addr()?
    );

    let mut receiver = QueueReceiver::start(listener, queue, sink).await?;
    if let Some(handshake) = receiver.take_handshake() {
        tokio::spawn(async move {
            match handshake.await {
                Ok(Ok(peer)) => println!("🔑 Session key received from {}", peer),
                Ok(Err(e)) => println!("❌ Key exchange failed: {}", e),
                Err(e) => warn!("Key exchange task failed: {}", e),
            }
        });
    }

    loop {
        tokio::select! {
            outcome = receiver.next_outcome() => {
                let Some(outcome) = outcome else { break };
                if outcome.is_persisted() {
                    print!(".");
                } else {
                    warn!("Delivery {}", outcome);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let stats = receiver.shutdown().await;
    println!();
    println!(
        "✅ {} records persisted ({} dropped, {} rejected before key exchange)",
        stats.persisted, stats.dropped, stats.rejected_no_key
    );
    Ok(())
}

async fn serve_stream(config: &Config, sink: Arc<dyn RecordSink>) -> Result<()> {
    let mut server = StreamServer::new(config.stream.address(), sink)
        .with_session_ttl(config.stream.completion_timeout())
        .start()
        .await?;
    println!("🚀 Stream server listening on {}", server.local_addr());

    tokio::signal::ctrl_c().await?;
    server.shutdown().await;
    Ok(())
}
