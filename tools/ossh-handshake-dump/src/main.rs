// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ossh-handshake-dump - Dump the handshake of devices that dial in
//!
//! Listens for outbound connections and prints each device's handshake
//! fields as JSON, one line per connection. Useful for checking what a
//! device announces before wiring up a full collector.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port (2200)
//! ossh-handshake-dump
//!
//! # Custom bind address and idle window
//! ossh-handshake-dump --bind 10.0.0.10 --port 2201 --idle-timeout-ms 500
//! ```

use clap::Parser;
use ossh_collector::{drain_handshake, ConnectionContext, HandshakeParser};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Dump handshake fields of devices dialing in
#[derive(Parser, Debug)]
#[command(name = "ossh-handshake-dump")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TCP port to listen on
    #[arg(short, long, default_value = "2200")]
    port: u16,

    /// Bind address (0.0.0.0 for all interfaces)
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Idle window after the last received byte (milliseconds)
    #[arg(long, default_value = "1000")]
    idle_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    let idle_timeout = Duration::from_millis(args.idle_timeout_ms);

    let listener = TcpListener::bind(addr).await?;
    info!(
        "ossh-handshake-dump v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        listener.local_addr()?
    );

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        tokio::spawn(dump_connection(stream, peer, idle_timeout));
                    }
                    Err(e) => error!("accept failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn dump_connection(
    mut stream: tokio::net::TcpStream,
    peer: SocketAddr,
    idle_timeout: Duration,
) {
    let ctx = ConnectionContext::new(peer);
    info!("{}: connection accepted", ctx.label());

    let raw = match drain_handshake(&mut stream, idle_timeout).await {
        Ok(raw) => raw,
        Err(e) => {
            error!("{}: failed to read handshake: {}", ctx.label(), e);
            return;
        }
    };

    if raw.is_empty() {
        warn!("{}: device sent nothing within the idle window", ctx.label());
        return;
    }

    let fields = HandshakeParser::new().parse(&String::from_utf8_lossy(&raw));
    if fields.is_empty() {
        warn!(
            "{}: {} bytes received but no handshake fields recognized",
            ctx.label(),
            raw.len()
        );
        return;
    }

    match serde_json::to_string(&fields) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("{}: failed to encode fields: {}", ctx.label(), e),
    }
}
