//! Per-connection handler: wait for a join, then route frames within the room.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use meshcall_common::{ClientMessage, Participant, ParticipantId, RoomId, ServerMessage};

use crate::rooms::{ClientTx, ForwardError, RoomStore};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Where this connection is currently joined.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Membership {
    room_id: RoomId,
    participant_id: ParticipantId,
}

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    store: RoomStore,
    hello_timeout: Duration,
) {
    let (mut sink, mut stream) = ws.split();

    // 1. The first frame must be a join.
    let Some(first) = read_hello(&mut stream, addr, hello_timeout).await else {
        let _ = send(
            &mut sink,
            &ServerMessage::Error {
                message: "expected join-room".into(),
            },
        )
        .await;
        return;
    };

    let (tx, mut rx) = mpsc::channel::<String>(256);
    let mut joined: Option<Membership> = None;

    if join(&mut sink, &store, &tx, &mut joined, first).await.is_err() {
        leave(&store, &tx, &mut joined).await;
        return;
    }

    // 2. Route frames until either side goes away.
    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let msg = match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(msg) => msg,
                        Err(e) => {
                            tracing::debug!(peer = %addr, error = %e, "Malformed client frame");
                            let reply = ServerMessage::Error {
                                message: format!("malformed frame: {e}"),
                            };
                            if send(&mut sink, &reply).await.is_err() {
                                break;
                            }
                            continue;
                        }
                    };
                    if route(&mut sink, &store, &tx, &mut joined, msg).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(peer = %addr, error = %e, "WS error");
                    break;
                }
                _ => {}
            }
        }
    }

    // 3. Cleanup.
    tracing::info!(peer = %addr, "Client disconnected");
    leave(&store, &tx, &mut joined).await;
}

/// Handle one frame from a joined client. Errors only when the socket is gone.
async fn route(
    sink: &mut WsSink,
    store: &RoomStore,
    tx: &ClientTx,
    joined: &mut Option<Membership>,
    msg: ClientMessage,
) -> Result<(), tungstenite::Error> {
    match msg {
        ClientMessage::JoinRoom { .. } => join(sink, store, tx, joined, msg).await,
        ClientMessage::LeaveRoom { room_id, .. } => {
            if joined.as_ref().is_some_and(|m| m.room_id == room_id) {
                leave(store, tx, joined).await;
            }
            Ok(())
        }
        msg => {
            let Some(membership) = joined.as_ref() else {
                return reject(sink, "join a room first").await;
            };
            let Some((target, room_id, out)) = forwarded(&membership.participant_id, msg) else {
                return Ok(());
            };
            if room_id != membership.room_id {
                return reject(sink, &format!("not joined to room {room_id}")).await;
            }
            let json = match serde_json::to_string(&out) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode forwarded frame");
                    return Ok(());
                }
            };
            match store.forward(&room_id, &target, json).await {
                Ok(()) => Ok(()),
                Err(ForwardError::NotMember(_)) => {
                    reject(sink, &format!("{target} is not in room {room_id}")).await
                }
                Err(e @ ForwardError::Backlogged(_)) => {
                    tracing::warn!(room = %room_id, error = %e, "Dropping forwarded frame");
                    reject(sink, &e.to_string()).await
                }
                Err(e @ ForwardError::Gone(_)) => {
                    tracing::debug!(room = %room_id, error = %e, "Target queue closed");
                    Ok(())
                }
            }
        }
    }
}

/// Register in a room, answer with the roster and announce the newcomer.
async fn join(
    sink: &mut WsSink,
    store: &RoomStore,
    tx: &ClientTx,
    joined: &mut Option<Membership>,
    msg: ClientMessage,
) -> Result<(), tungstenite::Error> {
    let ClientMessage::JoinRoom {
        room_id,
        participant_id,
    } = msg
    else {
        return Ok(());
    };
    let wanted = Membership {
        room_id,
        participant_id,
    };
    if joined.as_ref() == Some(&wanted) {
        tracing::debug!(room = %wanted.room_id, participant = %wanted.participant_id, "Duplicate join");
        return Ok(());
    }
    leave(store, tx, joined).await;

    let existing = match store
        .join(&wanted.room_id, &wanted.participant_id, tx.clone())
        .await
    {
        Ok(existing) => existing,
        Err(e) => {
            tracing::warn!(room = %wanted.room_id, participant = %wanted.participant_id, error = %e, "Join refused");
            return reject(sink, &e.to_string()).await;
        }
    };

    tracing::info!(
        room = %wanted.room_id,
        participant = %wanted.participant_id,
        existing = existing.len(),
        "Participant joined"
    );

    let roster = ServerMessage::ExistingUsers {
        users: existing
            .into_iter()
            .map(|participant_id| Participant { participant_id })
            .collect(),
    };
    send(sink, &roster).await?;

    store
        .broadcast(
            &wanted.room_id,
            &wanted.participant_id,
            &ServerMessage::UserJoined {
                participant_id: wanted.participant_id.clone(),
            },
        )
        .await;
    *joined = Some(wanted);
    Ok(())
}

async fn leave(store: &RoomStore, tx: &ClientTx, joined: &mut Option<Membership>) {
    let Some(m) = joined.take() else {
        return;
    };
    if store.leave(&m.room_id, &m.participant_id, tx).await {
        tracing::info!(room = %m.room_id, participant = %m.participant_id, "Participant left");
        store
            .broadcast(
                &m.room_id,
                &m.participant_id,
                &ServerMessage::UserLeft {
                    participant_id: m.participant_id.clone(),
                },
            )
            .await;
    }
}

/// Rewrite a point-to-point frame for delivery, replacing the target with
/// the sender's registered id.
fn forwarded(
    from: &ParticipantId,
    msg: ClientMessage,
) -> Option<(ParticipantId, RoomId, ServerMessage)> {
    let from_id = from.clone();
    match msg {
        ClientMessage::Offer {
            target_id,
            room_id,
            sdp,
        } => Some((
            target_id,
            room_id.clone(),
            ServerMessage::Offer {
                from_id,
                room_id,
                sdp,
            },
        )),
        ClientMessage::Answer {
            target_id,
            room_id,
            sdp,
        } => Some((
            target_id,
            room_id.clone(),
            ServerMessage::Answer {
                from_id,
                room_id,
                sdp,
            },
        )),
        ClientMessage::IceCandidate {
            target_id,
            room_id,
            candidate,
        } => Some((
            target_id,
            room_id.clone(),
            ServerMessage::IceCandidate {
                from_id,
                room_id,
                candidate,
            },
        )),
        ClientMessage::JoinRoom { .. } | ClientMessage::LeaveRoom { .. } => None,
    }
}

/// Read the first frame, which must be a `join-room`.
async fn read_hello(
    stream: &mut WsSource,
    addr: SocketAddr,
    hello_timeout: Duration,
) -> Option<ClientMessage> {
    let frame = tokio::time::timeout(hello_timeout, stream.next()).await;

    match frame {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<ClientMessage>(&text) {
            Ok(msg @ ClientMessage::JoinRoom { .. }) => Some(msg),
            Ok(other) => {
                tracing::warn!(peer = %addr, kind = other.kind(), "Expected join-room first");
                None
            }
            Err(e) => {
                tracing::warn!(peer = %addr, error = %e, "Invalid hello frame");
                None
            }
        },
        Ok(Some(Ok(_))) => {
            tracing::warn!(peer = %addr, "Expected text hello, got binary");
            None
        }
        Ok(Some(Err(e))) => {
            tracing::warn!(peer = %addr, error = %e, "WS error during hello");
            None
        }
        Ok(None) => {
            tracing::debug!(peer = %addr, "Connection closed before hello");
            None
        }
        Err(_) => {
            tracing::warn!(peer = %addr, timeout = ?hello_timeout, "Hello timeout");
            None
        }
    }
}

async fn reject(sink: &mut WsSink, message: &str) -> Result<(), tungstenite::Error> {
    send(
        sink,
        &ServerMessage::Error {
            message: message.to_string(),
        },
    )
    .await
}

/// Send a ServerMessage as a JSON text frame.
async fn send(sink: &mut WsSink, msg: &ServerMessage) -> Result<(), tungstenite::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::warn!(error = %e, kind = msg.kind(), "Failed to encode relay frame");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::{connect_async, MaybeTlsStream};

    use meshcall_common::IceCandidate;

    use super::*;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_relay(max_room_size: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = RoomStore::new(max_room_size);
        tokio::spawn(async move {
            loop {
                let (stream, peer) = listener.accept().await.unwrap();
                let store = store.clone();
                tokio::spawn(async move {
                    let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    handle_connection(ws, peer, store, Duration::from_millis(300)).await;
                });
            }
        });
        format!("ws://{addr}")
    }

    async fn client(url: &str) -> Client {
        connect_async(url).await.unwrap().0
    }

    async fn push(ws: &mut Client, msg: ClientMessage) {
        let json = serde_json::to_string(&msg).unwrap();
        ws.send(Message::Text(json.into())).await.unwrap();
    }

    async fn next(ws: &mut Client) -> ServerMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for relay frame")
                .expect("relay closed connection")
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    fn join_msg(room: &str, id: &str) -> ClientMessage {
        ClientMessage::JoinRoom {
            room_id: room.into(),
            participant_id: id.into(),
        }
    }

    async fn joined(url: &str, id: &str) -> (Client, ServerMessage) {
        let mut ws = client(url).await;
        push(&mut ws, join_msg("r1", id)).await;
        let roster = next(&mut ws).await;
        (ws, roster)
    }

    #[tokio::test]
    async fn join_gets_roster_and_announces() {
        let url = start_relay(8).await;
        let (mut alice, roster) = joined(&url, "alice").await;
        assert_eq!(roster, ServerMessage::ExistingUsers { users: vec![] });

        let (_bob, roster) = joined(&url, "bob").await;
        assert_eq!(
            roster,
            ServerMessage::ExistingUsers {
                users: vec![Participant {
                    participant_id: "alice".into()
                }]
            }
        );
        assert_eq!(
            next(&mut alice).await,
            ServerMessage::UserJoined {
                participant_id: "bob".into()
            }
        );
    }

    #[tokio::test]
    async fn offers_are_forwarded_with_sender_id() {
        let url = start_relay(8).await;
        let (mut alice, _) = joined(&url, "alice").await;
        let (mut bob, _) = joined(&url, "bob").await;
        next(&mut alice).await; // user-joined

        push(
            &mut alice,
            ClientMessage::Offer {
                target_id: "bob".into(),
                room_id: "r1".into(),
                sdp: "v=0".into(),
            },
        )
        .await;
        assert_eq!(
            next(&mut bob).await,
            ServerMessage::Offer {
                from_id: "alice".into(),
                room_id: "r1".into(),
                sdp: "v=0".into(),
            }
        );

        push(
            &mut bob,
            ClientMessage::IceCandidate {
                target_id: "alice".into(),
                room_id: "r1".into(),
                candidate: IceCandidate::new("c1"),
            },
        )
        .await;
        assert!(matches!(
            next(&mut alice).await,
            ServerMessage::IceCandidate { from_id, .. } if from_id.as_str() == "bob"
        ));
    }

    #[tokio::test]
    async fn unknown_target_is_an_error() {
        let url = start_relay(8).await;
        let (mut alice, _) = joined(&url, "alice").await;
        push(
            &mut alice,
            ClientMessage::Answer {
                target_id: "ghost".into(),
                room_id: "r1".into(),
                sdp: "a".into(),
            },
        )
        .await;
        assert!(matches!(next(&mut alice).await, ServerMessage::Error { .. }));
    }

    #[tokio::test]
    async fn disconnect_announces_departure() {
        let url = start_relay(8).await;
        let (mut alice, _) = joined(&url, "alice").await;
        let (bob, _) = joined(&url, "bob").await;
        next(&mut alice).await; // user-joined

        drop(bob);
        assert_eq!(
            next(&mut alice).await,
            ServerMessage::UserLeft {
                participant_id: "bob".into()
            }
        );
    }

    #[tokio::test]
    async fn full_room_rejects_join() {
        let url = start_relay(1).await;
        let (_alice, _) = joined(&url, "alice").await;
        let (_bob, reply) = joined(&url, "bob").await;
        assert!(matches!(reply, ServerMessage::Error { message } if message.contains("full")));
    }

    #[tokio::test]
    async fn non_join_hello_is_rejected() {
        let url = start_relay(8).await;
        let mut ws = client(&url).await;
        push(
            &mut ws,
            ClientMessage::Offer {
                target_id: "bob".into(),
                room_id: "r1".into(),
                sdp: "o".into(),
            },
        )
        .await;
        assert!(matches!(next(&mut ws).await, ServerMessage::Error { .. }));
    }
}
