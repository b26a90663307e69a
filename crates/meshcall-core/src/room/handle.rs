//! Public handle for driving a room session.

use tokio::sync::{mpsc, oneshot, watch};

use meshcall_common::{ParticipantId, Result, RoomError};

use crate::media::{MediaConstraints, TrackKind};

use super::types::{Reply, RoomCommand, RoomIdentity, RoomObserver, RoomSnapshot};

/// Cloneable handle to a running room session.
///
/// Every intent is a message to the room task; the returned future
/// resolves once the room has acted on it. When every handle is dropped the
/// room tears itself down.
#[derive(Clone)]
pub struct RoomHandle {
    identity: RoomIdentity,
    command_tx: mpsc::Sender<RoomCommand>,
    snapshot: watch::Receiver<RoomSnapshot>,
}

impl RoomHandle {
    pub(crate) fn new(
        identity: RoomIdentity,
        command_tx: mpsc::Sender<RoomCommand>,
        snapshot: watch::Receiver<RoomSnapshot>,
    ) -> Self {
        Self {
            identity,
            command_tx,
            snapshot,
        }
    }

    pub fn identity(&self) -> &RoomIdentity {
        &self.identity
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> RoomCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| RoomError::Closed)?;
        rx.await.map_err(|_| RoomError::Closed)?
    }

    /// Announce ourselves to the relay.
    pub async fn join_room(&self) -> Result<()> {
        self.request(|reply| RoomCommand::Join { reply }).await
    }

    /// Leave and close the session. Later intents fail with `Closed`.
    pub async fn leave_room(&self) -> Result<()> {
        self.request(|reply| RoomCommand::Leave { reply }).await
    }

    /// Capture camera/microphone. `None` uses the configured defaults.
    pub async fn start_local_media(&self, constraints: Option<MediaConstraints>) -> Result<()> {
        self.request(|reply| RoomCommand::StartLocalMedia { constraints, reply })
            .await
    }

    /// Offer to a member, replacing a failed session if needed.
    pub async fn call_peer(&self, peer: impl Into<ParticipantId>) -> Result<()> {
        let peer = peer.into();
        self.request(|reply| RoomCommand::CallPeer { peer, reply })
            .await
    }

    pub async fn start_screen_share(&self) -> Result<()> {
        self.request(|reply| RoomCommand::StartScreenShare { reply })
            .await
    }

    pub async fn stop_screen_share(&self) -> Result<()> {
        self.request(|reply| RoomCommand::StopScreenShare { reply })
            .await
    }

    /// Returns whether audio is now enabled.
    pub async fn toggle_audio(&self) -> Result<bool> {
        self.request(|reply| RoomCommand::ToggleTrack {
            kind: TrackKind::Audio,
            reply,
        })
        .await
    }

    /// Returns whether video is now enabled.
    pub async fn toggle_video(&self) -> Result<bool> {
        self.request(|reply| RoomCommand::ToggleTrack {
            kind: TrackKind::Video,
            reply,
        })
        .await
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn observe(&self) -> RoomObserver {
        RoomObserver::new(self.snapshot.clone())
    }
}
