//! Signaling wire protocol shared by the room client and the relay.
//!
//! Every frame is a JSON object tagged by `type`. Client frames address a
//! peer with `targetId`; the relay rewrites them to `fromId` before
//! delivering. Offer, answer and candidate frames are always point-to-point.

use serde::{Deserialize, Serialize};

use crate::id::{ParticipantId, RoomId};

// ---------------------------------------------------------------------------
// Session descriptions and candidates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An SDP blob together with its role in the offer/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate for NAT traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u32>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub participant_id: ParticipantId,
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Frames a room client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinRoom {
        room_id: RoomId,
        participant_id: ParticipantId,
    },
    LeaveRoom {
        room_id: RoomId,
        participant_id: ParticipantId,
    },
    Offer {
        target_id: ParticipantId,
        room_id: RoomId,
        sdp: String,
    },
    Answer {
        target_id: ParticipantId,
        room_id: RoomId,
        sdp: String,
    },
    IceCandidate {
        target_id: ParticipantId,
        room_id: RoomId,
        candidate: IceCandidate,
    },
}

impl ClientMessage {
    /// Wire name of the frame, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::LeaveRoom { .. } => "leave-room",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
        }
    }

    /// The addressed peer for point-to-point frames.
    pub fn target(&self) -> Option<&ParticipantId> {
        match self {
            Self::Offer { target_id, .. }
            | Self::Answer { target_id, .. }
            | Self::IceCandidate { target_id, .. } => Some(target_id),
            Self::JoinRoom { .. } | Self::LeaveRoom { .. } => None,
        }
    }
}

/// Frames the relay delivers to a room client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Roster snapshot sent in reply to `join-room`, excluding the joiner.
    ExistingUsers { users: Vec<Participant> },
    UserJoined { participant_id: ParticipantId },
    UserLeft { participant_id: ParticipantId },
    Offer {
        from_id: ParticipantId,
        room_id: RoomId,
        sdp: String,
    },
    Answer {
        from_id: ParticipantId,
        room_id: RoomId,
        sdp: String,
    },
    IceCandidate {
        from_id: ParticipantId,
        room_id: RoomId,
        candidate: IceCandidate,
    },
    Error { message: String },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExistingUsers { .. } => "existing-users",
            Self::UserJoined { .. } => "user-joined",
            Self::UserLeft { .. } => "user-left",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_wire_format() {
        let msg = ClientMessage::JoinRoom {
            room_id: "r1".into(),
            participant_id: "alice".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "join-room", "roomId": "r1", "participantId": "alice"})
        );
    }

    #[test]
    fn candidate_wire_format_uses_browser_field_names() {
        let msg = ClientMessage::IceCandidate {
            target_id: "bob".into(),
            room_id: "r1".into(),
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_m_line_index: Some(0),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ice-candidate");
        assert_eq!(json["targetId"], "bob");
        assert_eq!(json["candidate"]["sdpMid"], "0");
        assert_eq!(json["candidate"]["sdpMLineIndex"], 0);
    }

    #[test]
    fn existing_users_parses() {
        let json = r#"{"type":"existing-users","users":[{"participantId":"bob"},{"participantId":"carol"}]}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        match msg {
            ServerMessage::ExistingUsers { users } => {
                assert_eq!(users.len(), 2);
                assert_eq!(users[1].participant_id, ParticipantId::from("carol"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn candidate_without_optional_fields_parses() {
        let json = r#"{"type":"ice-candidate","fromId":"bob","roomId":"r1","candidate":{"candidate":"c1"}}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            msg,
            ServerMessage::IceCandidate { ref candidate, .. } if candidate.sdp_mid.is_none()
        ));
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        let json = r#"{"type":"raise-hand","participantId":"bob"}"#;
        assert!(serde_json::from_str::<ServerMessage>(json).is_err());
    }

    #[test]
    fn target_is_only_set_for_peer_frames() {
        let offer = ClientMessage::Offer {
            target_id: "bob".into(),
            room_id: "r1".into(),
            sdp: "v=0".into(),
        };
        assert_eq!(offer.target(), Some(&ParticipantId::from("bob")));
        assert_eq!(offer.kind(), "offer");

        let leave = ClientMessage::LeaveRoom {
            room_id: "r1".into(),
            participant_id: "alice".into(),
        };
        assert!(leave.target().is_none());
    }
}
