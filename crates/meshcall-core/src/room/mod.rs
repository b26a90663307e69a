//! Room orchestration: membership, per-peer negotiation and local media for
//! one full-mesh room.

mod driver;
mod handle;
mod types;


pub use handle::RoomHandle;
pub use types::{RoomConfig, RoomEvent, RoomIdentity, RoomObserver, RoomSnapshot};

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use meshcall_config::MeshConfig;

use crate::media::{CaptureDevice, MediaSourceManager};
use crate::signaling::{ChannelEvent, SignalingChannel, WsSignalingChannel};
use crate::transport::PeerConnector;

use driver::{DriverInputs, RoomDriver};

/// Collaborators a room session is wired to.
pub struct RoomDeps {
    pub channel: Arc<dyn SignalingChannel>,
    /// Events from `channel`.
    pub inbound: mpsc::Receiver<ChannelEvent>,
    pub connector: Arc<dyn PeerConnector>,
    pub device: Arc<dyn CaptureDevice>,
}

/// A running room. Owns the background task; hand out [`RoomHandle`]s to
/// drive it.
pub struct RoomSession {
    handle: RoomHandle,
    task: JoinHandle<()>,
}

impl RoomSession {
    /// Spawn the room task.
    /// Returns `(session, event_receiver)`.
    pub fn open(
        identity: RoomIdentity,
        config: RoomConfig,
        deps: RoomDeps,
    ) -> (Self, mpsc::Receiver<RoomEvent>) {
        let capacity = config.event_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (command_tx, command_rx) = mpsc::channel(32);
        let (transport_tx, transport_rx) = mpsc::channel(capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(RoomSnapshot::default());
        let (media, media_rx) = MediaSourceManager::new(deps.device);

        let driver = RoomDriver::new(
            identity.clone(),
            config,
            media,
            deps.channel,
            deps.connector,
            transport_tx,
            event_tx,
            snapshot_tx,
        );
        let task = tokio::spawn(driver.run(DriverInputs {
            commands: command_rx,
            inbound: deps.inbound,
            transport: transport_rx,
            media: media_rx,
        }));

        let handle = RoomHandle::new(identity, command_tx, snapshot_rx);
        (Self { handle, task }, event_rx)
    }

    /// Open a room signaled through the WebSocket relay in `config`.
    pub fn connect(
        identity: RoomIdentity,
        config: &MeshConfig,
        connector: Arc<dyn PeerConnector>,
        device: Arc<dyn CaptureDevice>,
    ) -> (Self, mpsc::Receiver<RoomEvent>) {
        let (channel, inbound) = WsSignalingChannel::connect(config.signaling.clone());
        Self::open(
            identity,
            RoomConfig::from(config),
            RoomDeps {
                channel: Arc::new(channel),
                inbound,
                connector,
                device,
            },
        )
    }

    pub fn handle(&self) -> RoomHandle {
        self.handle.clone()
    }

    /// Leave the room and wait for the task to finish.
    pub async fn close(self) {
        // Already closed if the task ended on its own.
        let _ = self.handle.leave_room().await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Room task ended abnormally");
        }
    }
}
