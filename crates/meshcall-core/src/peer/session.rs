use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use meshcall_common::{IceCandidate, ParticipantId};

use crate::media::RemoteStream;
use crate::transport::{ConnectionState, PeerConnection};

use super::senders::SenderSet;
use super::state::{NegotiationRole, PeerState};

/// An offer or answer that arrived while a step was in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredSignal {
    Offer(String),
    Answer(String),
}

/// Negotiation and connection state for one remote participant.
pub struct PeerSession {
    pub(crate) peer_id: ParticipantId,
    /// Distinguishes this session from earlier ones for the same peer.
    pub(crate) epoch: u64,
    pub(crate) state: PeerState,
    pub(crate) role: NegotiationRole,
    pub(crate) connection: Option<Arc<dyn PeerConnection>>,
    pub(crate) senders: SenderSet,
    pub(crate) pending_candidates: VecDeque<IceCandidate>,
    pub(crate) remote_description_set: bool,
    /// A candidate batch is being applied; later candidates wait behind it.
    pub(crate) applying_candidates: bool,
    pub(crate) deferred: VecDeque<DeferredSignal>,
    pub(crate) remote_stream: Option<Arc<RemoteStream>>,
    pub(crate) connection_state: ConnectionState,
}

impl PeerSession {
    pub(crate) fn new(peer_id: ParticipantId, epoch: u64) -> Self {
        Self {
            peer_id,
            epoch,
            state: PeerState::New,
            role: NegotiationRole::Unset,
            connection: None,
            senders: SenderSet::default(),
            pending_candidates: VecDeque::new(),
            remote_description_set: false,
            applying_candidates: false,
            deferred: VecDeque::new(),
            remote_stream: None,
            connection_state: ConnectionState::New,
        }
    }

    pub fn peer_id(&self) -> &ParticipantId {
        &self.peer_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    pub fn senders(&self) -> &SenderSet {
        &self.senders
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn remote_stream(&self) -> Option<&Arc<RemoteStream>> {
        self.remote_stream.as_ref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    pub(crate) fn connection(&self) -> Option<Arc<dyn PeerConnection>> {
        self.connection.clone()
    }

    /// Candidates can go straight to the transport.
    pub(crate) fn can_apply_candidates(&self) -> bool {
        self.remote_description_set && !self.state.is_busy() && !self.applying_candidates
    }
}

impl fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer_id", &self.peer_id)
            .field("epoch", &self.epoch)
            .field("state", &self.state)
            .field("role", &self.role)
            .field("connected", &self.connection.is_some())
            .field("senders", &self.senders)
            .field("pending_candidates", &self.pending_candidates.len())
            .field("deferred", &self.deferred.len())
            .field("remote_stream", &self.remote_stream.as_ref().map(|s| s.id.as_str()))
            .finish()
    }
}
