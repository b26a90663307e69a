//! Media source manager: local capture, screen share, and sender replacement.

use std::sync::Arc;

use futures_util::future::{join_all, BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use meshcall_common::{MediaError, ParticipantId, TransportError};

use crate::transport::{PeerConnection, SenderId};

use super::device::{CaptureDevice, MediaConstraints};
use super::track::{MediaStream, MediaTrack, TrackKind};

// ---------------------------------------------------------------------------
// Events and reports
// ---------------------------------------------------------------------------

/// Events forwarded from capture sources to the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    /// The platform revoked the screen capture surface.
    ScreenShareEnded { track_id: String },
}

/// A peer's current video sender, the unit of a replace.
#[derive(Clone)]
pub struct VideoSenderTarget {
    pub peer: ParticipantId,
    pub connection: Arc<dyn PeerConnection>,
    pub sender: SenderId,
}

/// Outcome of replacing the outgoing video on every peer.
#[derive(Debug, Default)]
pub struct ReplaceReport {
    pub replaced: Vec<ParticipantId>,
    pub failed: Vec<(ParticipantId, TransportError)>,
}

impl ReplaceReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owns the local capture stream and the optional screen-share stream.
pub struct MediaSourceManager {
    device: Arc<dyn CaptureDevice>,
    local: Option<MediaStream>,
    screen: Option<MediaStream>,
    /// Watches the screen track for end-of-sharing.
    screen_watch: Option<JoinHandle<()>>,
    event_tx: mpsc::Sender<MediaEvent>,
}

impl MediaSourceManager {
    pub fn new(device: Arc<dyn CaptureDevice>) -> (Self, mpsc::Receiver<MediaEvent>) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let mgr = Self {
            device,
            local: None,
            screen: None,
            screen_watch: None,
            event_tx,
        };
        (mgr, event_rx)
    }

    /// Request camera/microphone capture.
    ///
    /// The returned future does not borrow the manager, so the room can keep
    /// processing events while a permission prompt is open. Install the
    /// result with [`install_local_media`](Self::install_local_media).
    pub fn acquire_local_media(
        &self,
        constraints: MediaConstraints,
    ) -> BoxFuture<'static, Result<MediaStream, MediaError>> {
        let device = Arc::clone(&self.device);
        async move {
            if constraints.is_empty() {
                return Err(MediaError::EmptyConstraints);
            }
            let stream = device.user_media(constraints).await?;
            Ok(stream)
        }
        .boxed()
    }

    /// Adopt a captured stream as the local stream. If one is already
    /// installed the new capture is stopped and the existing one kept.
    pub fn install_local_media(&mut self, stream: MediaStream) -> MediaStream {
        if let Some(existing) = &self.local {
            debug!(stream = stream.id(), "Local media already active, stopping duplicate capture");
            stream.stop_all();
            return existing.clone();
        }
        info!(
            stream = stream.id(),
            tracks = stream.tracks().len(),
            "Local media active"
        );
        self.local = Some(stream.clone());
        stream
    }

    /// Request a screen capture via the platform picker.
    pub fn acquire_screen_share(&self) -> BoxFuture<'static, Result<MediaStream, MediaError>> {
        let device = Arc::clone(&self.device);
        async move { device.display_media().await }.boxed()
    }

    /// Adopt a screen capture and start watching it for end-of-sharing.
    /// Returns the screen video track.
    pub fn install_screen_share(&mut self, stream: MediaStream) -> Result<MediaTrack, MediaError> {
        let Some(track) = stream.track(TrackKind::Video).cloned() else {
            stream.stop_all();
            return Err(MediaError::Unsupported(
                "display capture returned no video track".into(),
            ));
        };

        self.stop_screen_share();

        let tx = self.event_tx.clone();
        let watched = track.clone();
        self.screen_watch = Some(tokio::spawn(async move {
            watched.ended().await;
            let _ = tx
                .send(MediaEvent::ScreenShareEnded {
                    track_id: watched.id().to_string(),
                })
                .await;
        }));
        self.screen = Some(stream);

        info!(track = track.id(), "Screen share active");
        Ok(track)
    }

    /// Stop the screen capture. Returns false if none was active.
    pub fn stop_screen_share(&mut self) -> bool {
        if let Some(handle) = self.screen_watch.take() {
            handle.abort();
        }
        match self.screen.take() {
            Some(stream) => {
                stream.stop_all();
                info!("Screen share stopped");
                true
            }
            None => false,
        }
    }

    /// Flip the enabled flag of the local track of `kind`.
    /// Returns the new enabled state.
    pub fn toggle_track_enabled(&self, kind: TrackKind) -> Result<bool, MediaError> {
        let track = self
            .local
            .as_ref()
            .and_then(|s| s.track(kind))
            .ok_or(MediaError::NotActive)?;
        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        debug!(%kind, enabled, "Toggled local track");
        Ok(enabled)
    }

    /// The track that should feed every peer's video sender: the screen
    /// track while sharing, otherwise the camera.
    pub fn outgoing_video(&self) -> Option<MediaTrack> {
        self.screen
            .as_ref()
            .and_then(|s| s.track(TrackKind::Video))
            .or_else(|| self.local.as_ref().and_then(|s| s.track(TrackKind::Video)))
            .cloned()
    }

    /// Tracks to bind when a connection's senders are first attached.
    pub fn tracks_for_attach(&self) -> Vec<MediaTrack> {
        let mut tracks = Vec::new();
        if let Some(audio) = self.local.as_ref().and_then(|s| s.track(TrackKind::Audio)) {
            tracks.push(audio.clone());
        }
        if let Some(video) = self.outgoing_video() {
            tracks.push(video);
        }
        tracks
    }

    /// Point every peer's video sender at `track`.
    ///
    /// Every replacement is attempted even if some fail; failures are
    /// collected in the report. Sender counts never change.
    pub async fn replace_outgoing_video(
        &self,
        targets: Vec<VideoSenderTarget>,
        track: Option<MediaTrack>,
    ) -> ReplaceReport {
        let results = join_all(targets.into_iter().map(|target| {
            let track = track.clone();
            async move {
                let result = target.connection.replace_track(target.sender, track).await;
                (target.peer, result)
            }
        }))
        .await;

        let mut report = ReplaceReport::default();
        for (peer, result) in results {
            match result {
                Ok(()) => report.replaced.push(peer),
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Video sender replace failed");
                    report.failed.push((peer, e));
                }
            }
        }
        report
    }

    pub fn is_local_active(&self) -> bool {
        self.local.is_some()
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.screen.is_some()
    }

    pub fn screen_track_id(&self) -> Option<&str> {
        self.screen
            .as_ref()
            .and_then(|s| s.track(TrackKind::Video))
            .map(MediaTrack::id)
    }

    /// Stop every track of both streams.
    pub fn release(&mut self) {
        self.stop_screen_share();
        if let Some(stream) = self.local.take() {
            stream.stop_all();
            info!("Local media released");
        }
    }
}

impl Drop for MediaSourceManager {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TrackSource;
    use crate::test_support::{FakeConnection, FakeDevice};
    use meshcall_common::DeviceError;
    use std::time::Duration;

    fn manager(device: FakeDevice) -> (MediaSourceManager, mpsc::Receiver<MediaEvent>) {
        MediaSourceManager::new(Arc::new(device))
    }

    #[tokio::test]
    async fn acquire_and_install_local_media() {
        let (mut mgr, _rx) = manager(FakeDevice::new());
        let stream = mgr
            .acquire_local_media(MediaConstraints::default())
            .await
            .unwrap();
        mgr.install_local_media(stream);

        assert!(mgr.is_local_active());
        assert_eq!(mgr.tracks_for_attach().len(), 2);
        assert_eq!(mgr.outgoing_video().unwrap().source(), TrackSource::Camera);
    }

    #[tokio::test]
    async fn device_error_is_surfaced() {
        let device = FakeDevice::new();
        device.fail_user_media(DeviceError::PermissionDenied("camera".into()));
        let (mgr, _rx) = manager(device);

        let err = mgr
            .acquire_local_media(MediaConstraints::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            MediaError::Device(DeviceError::PermissionDenied("camera".into()))
        );
        assert!(!mgr.is_local_active());
    }

    #[tokio::test]
    async fn empty_constraints_are_rejected() {
        let (mgr, _rx) = manager(FakeDevice::new());
        let err = mgr
            .acquire_local_media(MediaConstraints {
                audio: false,
                video: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err, MediaError::EmptyConstraints);
    }

    #[tokio::test]
    async fn second_install_keeps_first_stream() {
        let (mut mgr, _rx) = manager(FakeDevice::new());
        let first = mgr
            .acquire_local_media(MediaConstraints::default())
            .await
            .unwrap();
        let second = mgr
            .acquire_local_media(MediaConstraints::default())
            .await
            .unwrap();

        let kept = mgr.install_local_media(first.clone());
        let again = mgr.install_local_media(second.clone());

        assert_eq!(kept.id(), again.id());
        assert!(second.tracks().iter().all(MediaTrack::is_ended));
        assert!(!first.tracks().iter().any(MediaTrack::is_ended));
    }

    #[tokio::test]
    async fn toggle_flips_enabled_without_local_media_error() {
        let (mut mgr, _rx) = manager(FakeDevice::new());
        assert_eq!(
            mgr.toggle_track_enabled(TrackKind::Audio),
            Err(MediaError::NotActive)
        );

        let stream = mgr
            .acquire_local_media(MediaConstraints::default())
            .await
            .unwrap();
        mgr.install_local_media(stream.clone());

        assert_eq!(mgr.toggle_track_enabled(TrackKind::Audio), Ok(false));
        assert!(!stream.track(TrackKind::Audio).unwrap().is_enabled());
        assert_eq!(mgr.toggle_track_enabled(TrackKind::Audio), Ok(true));
    }

    #[tokio::test]
    async fn screen_share_takes_priority_for_video() {
        let (mut mgr, _rx) = manager(FakeDevice::new());
        let local = mgr
            .acquire_local_media(MediaConstraints::default())
            .await
            .unwrap();
        mgr.install_local_media(local);
        let screen = mgr.acquire_screen_share().await.unwrap();
        let track = mgr.install_screen_share(screen).unwrap();

        assert_eq!(track.source(), TrackSource::Screen);
        assert!(mgr.outgoing_video().unwrap().same_track(&track));

        assert!(mgr.stop_screen_share());
        assert!(track.is_ended());
        assert_eq!(mgr.outgoing_video().unwrap().source(), TrackSource::Camera);
        assert!(!mgr.stop_screen_share());
    }

    #[tokio::test]
    async fn revoked_screen_track_emits_event() {
        let (mut mgr, mut rx) = manager(FakeDevice::new());
        let screen = mgr.acquire_screen_share().await.unwrap();
        let track = mgr.install_screen_share(screen).unwrap();

        // Revoked outside our control.
        track.stop();

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            MediaEvent::ScreenShareEnded {
                track_id: track.id().to_string()
            }
        );
    }

    #[tokio::test]
    async fn local_stop_does_not_emit_ended_event() {
        let (mut mgr, mut rx) = manager(FakeDevice::new());
        let screen = mgr.acquire_screen_share().await.unwrap();
        mgr.install_screen_share(screen).unwrap();
        mgr.stop_screen_share();

        let waited = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn screen_share_errors_pass_through() {
        let device = FakeDevice::new();
        device.fail_display_media(MediaError::UserCancelled);
        let (mgr, _rx) = manager(device);
        assert_eq!(
            mgr.acquire_screen_share().await.unwrap_err(),
            MediaError::UserCancelled
        );
    }

    #[tokio::test]
    async fn replace_collects_failures_without_short_circuit() {
        let (mgr, _rx) = manager(FakeDevice::new());
        let ok_a = FakeConnection::detached("a");
        let bad = FakeConnection::detached("b");
        bad.fail_replace(TransportError::Sender("gone".into()));
        let ok_c = FakeConnection::detached("c");

        let targets = vec![
            VideoSenderTarget {
                peer: "a".into(),
                connection: ok_a.clone(),
                sender: SenderId(1),
            },
            VideoSenderTarget {
                peer: "b".into(),
                connection: bad.clone(),
                sender: SenderId(1),
            },
            VideoSenderTarget {
                peer: "c".into(),
                connection: ok_c.clone(),
                sender: SenderId(1),
            },
        ];
        let track = MediaTrack::new(TrackSource::Screen, "display");
        let report = mgr.replace_outgoing_video(targets, Some(track)).await;

        assert_eq!(report.replaced.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, ParticipantId::from("b"));
        assert!(!report.is_clean());
        assert_eq!(ok_c.replace_count(), 1);
    }

    #[tokio::test]
    async fn release_stops_everything() {
        let (mut mgr, _rx) = manager(FakeDevice::new());
        let local = mgr
            .acquire_local_media(MediaConstraints::default())
            .await
            .unwrap();
        let local = mgr.install_local_media(local);
        let screen = mgr.acquire_screen_share().await.unwrap();
        let track = mgr.install_screen_share(screen).unwrap();

        mgr.release();

        assert!(local.tracks().iter().all(MediaTrack::is_ended));
        assert!(track.is_ended());
        assert!(!mgr.is_local_active());
        assert!(!mgr.is_screen_sharing());
    }

    #[tokio::test]
    async fn drop_releases_tracks() {
        let (mut mgr, _rx) = manager(FakeDevice::new());
        let local = mgr
            .acquire_local_media(MediaConstraints::default())
            .await
            .unwrap();
        let local = mgr.install_local_media(local);
        drop(mgr);
        assert!(local.tracks().iter().all(MediaTrack::is_ended));
    }
}
