//! Orchestrator-level error types.
//!
//! These never cross the public intent boundary as `MeshError`; they are
//! logged and reported on the room event stream.

use std::time::Duration;

use meshcall_common::{ParticipantId, TransportError};

use crate::peer::{NegotiationOp, PeerState, SenderAttachState};

/// A relayed message that does not fit the session it addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalingProtocolViolation {
    #[error("{kind} from {peer} while session is {state}")]
    UnexpectedInState {
        peer: ParticipantId,
        kind: &'static str,
        state: PeerState,
    },

    #[error("{kind} from {peer} with no session")]
    UnknownPeer {
        peer: ParticipantId,
        kind: &'static str,
    },

    #[error("{kind} from {peer} addressed to room {room}")]
    WrongRoom {
        peer: ParticipantId,
        kind: &'static str,
        room: String,
    },
}

/// Attempt to bind a local track that already has a sender.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("senders are {state}, refusing to attach")]
pub struct AttachmentConflict {
    pub state: SenderAttachState,
}

/// A negotiation step that could not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{op} did not complete within {after:?}")]
    Timeout { op: NegotiationOp, after: Duration },

    #[error("transport reported connection failure")]
    ConnectionFailed,
}
