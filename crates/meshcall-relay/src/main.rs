//! meshcall-relay: reference WebSocket signaling relay for full-mesh rooms.
//!
//! Accepts WebSocket connections, groups them by room, and forwards
//! offer/answer/candidate frames between members. The relay never sees
//! media and never inspects session descriptions.

mod connection;
mod rooms;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use meshcall_config::MeshConfig;

use crate::connection::handle_connection;
use crate::rooms::RoomStore;

#[derive(Parser)]
#[command(name = "meshcall-relay", about = "Signaling relay for meshcall rooms")]
struct Args {
    /// Config file (defaults to the platform config directory).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the config.
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind, overriding the config.
    #[arg(long)]
    bind: Option<String>,
}

fn load_config(args: &Args) -> MeshConfig {
    let loaded = match &args.config {
        Some(path) => meshcall_config::load_config_from(path),
        None => meshcall_config::load_config(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        eprintln!("meshcall-relay: {e}; using defaults");
        MeshConfig::default()
    });
    if let Some(port) = args.port {
        config.relay.port = port;
    }
    if let Some(bind) = &args.bind {
        config.relay.bind = bind.clone();
    }
    config
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(&args);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.directive_for("meshcall_relay").into()),
        )
        .init();

    let relay = config.relay;
    let store = RoomStore::new(relay.max_room_size);

    let addr = relay.listen_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };

    tracing::info!("meshcall-relay listening on {}", addr);

    // Spawn empty room reaper.
    let reaper_store = store.clone();
    let ttl = Duration::from_secs(relay.room_ttl_secs);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            reaper_store.reap_stale(ttl).await;
            let count = reaper_store.count().await;
            tracing::debug!(rooms = count, "Reaper tick");
        }
    });

    // Accept loop.
    let hello_timeout = Duration::from_secs(relay.hello_timeout_secs);
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let store = store.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, store, hello_timeout).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
