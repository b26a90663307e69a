//! Background WebSocket connection loop with auto-reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use meshcall_common::{ClientMessage, ServerMessage};
use meshcall_config::SignalingConfig;

use super::types::ChannelEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, WsMessage>;

/// How a connected session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// The socket dropped; reconnect.
    Dropped,
    /// The owning channel went away; stop for good.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

pub(crate) async fn connection_loop(
    config: SignalingConfig,
    connected: Arc<AtomicBool>,
    event_tx: mpsc::Sender<ChannelEvent>,
    mut command_rx: mpsc::Receiver<ClientMessage>,
) {
    // Re-sent after every reconnect until a leave clears it.
    let mut last_join: Option<ClientMessage> = None;
    let mut reconnect_delay = config.reconnect_delay_secs;
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

    loop {
        info!(url = %config.url, "Connecting to signaling relay");

        match tokio::time::timeout(
            connect_timeout,
            tokio_tungstenite::connect_async(config.url.as_str()),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                connected.store(true, Ordering::Release);
                if event_tx.send(ChannelEvent::Connected).await.is_err() {
                    return;
                }

                let end = run_session(
                    ws_stream,
                    &config,
                    &mut last_join,
                    &event_tx,
                    &mut command_rx,
                )
                .await;

                connected.store(false, Ordering::Release);
                if end == SessionEnd::Shutdown {
                    info!("Signaling channel shut down");
                    return;
                }
                if event_tx.send(ChannelEvent::Disconnected).await.is_err() {
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to signaling relay");
            }
            Err(_elapsed) => {
                error!(
                    timeout_secs = config.connect_timeout_secs,
                    "Signaling connect timed out"
                );
            }
        }

        // Exponential backoff reconnect.
        info!(
            delay = reconnect_delay,
            "Reconnecting in {} seconds", reconnect_delay
        );
        let keep_going = wait_reconnect(
            Duration::from_secs(reconnect_delay),
            &mut last_join,
            &mut command_rx,
        )
        .await;
        if !keep_going {
            return;
        }
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }
}

async fn run_session(
    ws_stream: WsStream,
    config: &SignalingConfig,
    last_join: &mut Option<ClientMessage>,
    event_tx: &mpsc::Sender<ChannelEvent>,
    command_rx: &mut mpsc::Receiver<ClientMessage>,
) -> SessionEnd {
    let (mut write, mut read) = ws_stream.split();

    if let Some(join) = last_join.as_ref() {
        info!("Re-joining room after reconnect");
        if let Err(e) = write_frame(&mut write, join).await {
            warn!(error = %e, "Re-join failed");
            return SessionEnd::Dropped;
        }
    }

    let mut heartbeat =
        tokio::time::interval(Duration::from_secs(config.heartbeat_interval_secs));
    // The first tick completes immediately.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                let Some(msg) = cmd else {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return SessionEnd::Shutdown;
                };
                remember_join(last_join, &msg);
                if let Err(e) = write_frame(&mut write, &msg).await {
                    warn!(error = %e, kind = msg.kind(), "Signaling write failed");
                    return SessionEnd::Dropped;
                }
            }
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            if event_tx.send(ChannelEvent::Message(msg)).await.is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Err(e) => debug!(error = %e, "Unrecognized frame from relay"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Signaling relay closed connection");
                    return SessionEnd::Dropped;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    return SessionEnd::Dropped;
                }
                Some(Ok(_)) => {}
            },
            _ = heartbeat.tick() => {
                if write.send(WsMessage::Ping(Default::default())).await.is_err() {
                    return SessionEnd::Dropped;
                }
            }
        }
    }
}

/// Sleep out the backoff delay while still draining commands. Frames other
/// than join/leave are dropped; there is no peer to deliver them to.
/// Returns false once the owning channel is gone.
async fn wait_reconnect(
    delay: Duration,
    last_join: &mut Option<ClientMessage>,
    command_rx: &mut mpsc::Receiver<ClientMessage>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = command_rx.recv() => match cmd {
                Some(msg) => {
                    if !remember_join(last_join, &msg) {
                        debug!(kind = msg.kind(), "Relay unreachable, dropping frame");
                    }
                }
                None => return false,
            },
        }
    }
}

/// Track the room to re-join. Returns true for join/leave frames.
fn remember_join(last_join: &mut Option<ClientMessage>, msg: &ClientMessage) -> bool {
    match msg {
        ClientMessage::JoinRoom { .. } => {
            *last_join = Some(msg.clone());
            true
        }
        ClientMessage::LeaveRoom { .. } => {
            *last_join = None;
            true
        }
        _ => false,
    }
}

async fn write_frame(write: &mut WsWriter, msg: &ClientMessage) -> Result<(), tungstenite::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => write.send(WsMessage::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, kind = msg.kind(), "Failed to encode signaling frame");
            Ok(())
        }
    }
}
