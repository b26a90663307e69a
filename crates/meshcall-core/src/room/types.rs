//! Room configuration, observable state, events and commands.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use meshcall_common::{MeshError, ParticipantId, RoomError, RoomId, TransportError};
use meshcall_config::MeshConfig;

use crate::error::{NegotiationFailure, SignalingProtocolViolation};
use crate::media::{MediaConstraints, RemoteStream, TrackKind};
use crate::peer::PeerState;
use crate::transport::ConnectionState;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Who we are and where. Fixed for the lifetime of a room session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomIdentity {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
}

impl RoomIdentity {
    pub fn new(room_id: impl Into<RoomId>, participant_id: impl Into<ParticipantId>) -> Self {
        Self {
            room_id: room_id.into(),
            participant_id: participant_id.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Upper bound on any single negotiation step.
    pub negotiation_timeout: Duration,
    /// Constraints used when `start_local_media` is given none.
    pub default_constraints: MediaConstraints,
    /// Capacity of the room event queue.
    pub event_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Duration::from_secs(15),
            default_constraints: MediaConstraints::default(),
            event_capacity: 256,
        }
    }
}

impl From<&MeshConfig> for RoomConfig {
    fn from(config: &MeshConfig) -> Self {
        Self {
            negotiation_timeout: Duration::from_secs(config.negotiation.timeout_secs),
            default_constraints: MediaConstraints::from(&config.media),
            event_capacity: config.signaling.channel_capacity,
        }
    }
}

// ---------------------------------------------------------------------------
// Observable state
// ---------------------------------------------------------------------------

/// Read-only view of the room for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomSnapshot {
    pub joined: bool,
    pub signaling_connected: bool,
    /// Remote participants, sorted.
    pub members: Vec<ParticipantId>,
    pub remote_streams: BTreeMap<ParticipantId, Arc<RemoteStream>>,
    pub peer_states: BTreeMap<ParticipantId, PeerState>,
    pub local_media_active: bool,
    pub screen_sharing: bool,
}

impl RoomSnapshot {
    pub fn state_of(&self, peer: &str) -> Option<PeerState> {
        self.peer_states.get(&ParticipantId::from(peer)).copied()
    }

    pub fn stream_of(&self, peer: &str) -> Option<&Arc<RemoteStream>> {
        self.remote_streams.get(&ParticipantId::from(peer))
    }
}

/// Watches the room snapshot.
#[derive(Debug, Clone)]
pub struct RoomObserver {
    rx: watch::Receiver<RoomSnapshot>,
}

impl RoomObserver {
    pub(crate) fn new(rx: watch::Receiver<RoomSnapshot>) -> Self {
        Self { rx }
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next published change.
    pub async fn changed(&mut self) -> Result<RoomSnapshot, MeshError> {
        self.rx.changed().await.map_err(|_| RoomError::Closed)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate`.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&RoomSnapshot) -> bool,
    ) -> Result<RoomSnapshot, MeshError> {
        let snapshot = self
            .rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| RoomError::Closed)?;
        Ok(snapshot.clone())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Everything observable that happens in a room, in processing order.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Joined { room: RoomId },
    Left { room: RoomId },
    SignalingConnected,
    SignalingDisconnected,
    /// The relay rejected something we sent.
    RelayError { message: String },
    PeerJoined { peer: ParticipantId },
    PeerLeft { peer: ParticipantId },
    PeerStateChanged { peer: ParticipantId, state: PeerState },
    ConnectionStateChanged { peer: ParticipantId, state: ConnectionState },
    RemoteStreamUpdated { peer: ParticipantId, stream: Arc<RemoteStream> },
    RemoteStreamRemoved { peer: ParticipantId },
    PeerFailed { peer: ParticipantId, error: NegotiationFailure },
    ProtocolViolation(SignalingProtocolViolation),
    LocalMediaStarted,
    ScreenShareStarted,
    /// `revoked` is true when the platform ended the capture.
    ScreenShareStopped { revoked: bool },
    VideoReplaceFailed { peer: ParticipantId, error: TransportError },
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub(crate) type Reply<T> = oneshot::Sender<Result<T, MeshError>>;

pub(crate) enum RoomCommand {
    Join { reply: Reply<()> },
    Leave { reply: Reply<()> },
    StartLocalMedia {
        constraints: Option<MediaConstraints>,
        reply: Reply<()>,
    },
    CallPeer {
        peer: ParticipantId,
        reply: Reply<()>,
    },
    StartScreenShare { reply: Reply<()> },
    StopScreenShare { reply: Reply<()> },
    ToggleTrack { kind: TrackKind, reply: Reply<bool> },
}
