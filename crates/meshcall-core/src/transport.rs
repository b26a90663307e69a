//! Point-to-point transport seam.
//!
//! The orchestrator never touches SDP or ICE internals; it drives a
//! `PeerConnection` through these operations and learns about
//! asynchronous transport activity through `TransportEvents`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use meshcall_common::{IceCandidate, ParticipantId, SessionDescription, TransportError};

use crate::media::{MediaTrack, RemoteTrack};

/// Handle to an outgoing track binding on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderId(pub u64);

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sender-{}", self.0)
    }
}

/// Transport-level connectivity as reported by the implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local candidate was gathered and must be sent to the peer.
    LocalCandidate(IceCandidate),
    /// The peer started sending a track.
    RemoteTrack(RemoteTrack),
    StateChanged(ConnectionState),
}

/// A transport event tagged with the session it belongs to.
#[derive(Debug, Clone)]
pub struct PeerTransportEvent {
    pub peer: ParticipantId,
    /// Session epoch; events from a replaced session are discarded.
    pub epoch: u64,
    pub event: TransportEvent,
}

/// Reporting handle given to a connection when it is created.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    peer: ParticipantId,
    epoch: u64,
    tx: mpsc::Sender<PeerTransportEvent>,
}

impl TransportEvents {
    pub(crate) fn new(
        peer: ParticipantId,
        epoch: u64,
        tx: mpsc::Sender<PeerTransportEvent>,
    ) -> Self {
        Self { peer, epoch, tx }
    }

    pub fn peer(&self) -> &ParticipantId {
        &self.peer
    }

    pub fn emit(&self, event: TransportEvent) {
        let tagged = PeerTransportEvent {
            peer: self.peer.clone(),
            epoch: self.epoch,
            event,
        };
        if let Err(e) = self.tx.try_send(tagged) {
            warn!(peer = %self.peer, error = %e, "Dropping transport event");
        }
    }

    pub fn local_candidate(&self, candidate: IceCandidate) {
        self.emit(TransportEvent::LocalCandidate(candidate));
    }

    pub fn remote_track(&self, track: RemoteTrack) {
        self.emit(TransportEvent::RemoteTrack(track));
    }

    pub fn state_changed(&self, state: ConnectionState) {
        self.emit(TransportEvent::StateChanged(state));
    }
}

/// One point-to-point media connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(&self, desc: SessionDescription)
        -> Result<(), TransportError>;

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError>;

    /// Discard a local offer that has not been answered.
    async fn rollback(&self) -> Result<(), TransportError>;

    /// Bind a local track as a new outgoing sender.
    async fn add_track(&self, track: MediaTrack) -> Result<SenderId, TransportError>;

    /// Swap the track carried by an existing sender without renegotiation.
    /// `None` keeps the sender but stops sending media on it.
    async fn replace_track(
        &self,
        sender: SenderId,
        track: Option<MediaTrack>,
    ) -> Result<(), TransportError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Close the transport and release its resources.
    async fn close(&self);
}

/// Factory for peer connections.
pub trait PeerConnector: Send + Sync {
    fn connect(
        &self,
        peer: &ParticipantId,
        events: TransportEvents,
    ) -> Result<Arc<dyn PeerConnection>, TransportError>;
}
