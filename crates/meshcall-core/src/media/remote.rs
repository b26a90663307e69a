//! Inbound media surfaced to the presentation layer.

use serde::{Deserialize, Serialize};

use meshcall_common::new_id;

use super::track::TrackKind;

/// A track received from a remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// Composed remote stream for one peer.
///
/// Never mutated after publication: a new inbound track yields a new
/// stream value with a fresh id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStream {
    pub id: String,
    pub tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    pub fn from_track(track: RemoteTrack) -> Self {
        Self {
            id: new_id(),
            tracks: vec![track],
        }
    }

    /// A new stream containing these tracks plus `track`. A track with the
    /// same id replaces the previous entry.
    pub fn with_track(&self, track: RemoteTrack) -> Self {
        let mut tracks: Vec<RemoteTrack> = self
            .tracks
            .iter()
            .filter(|t| t.id != track.id)
            .cloned()
            .collect();
        tracks.push(track);
        Self {
            id: new_id(),
            tracks,
        }
    }

    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}
