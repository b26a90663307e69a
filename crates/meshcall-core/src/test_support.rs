//! In-crate fakes for the transport, capture and signaling seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use meshcall_common::{
    ClientMessage, DeviceError, IceCandidate, MediaError, ParticipantId, SdpKind,
    SessionDescription, SignalingError, TransportError,
};

use crate::media::{
    CaptureDevice, MediaConstraints, MediaStream, MediaTrack, TrackKind, TrackSource,
};
use crate::signaling::SignalingChannel;
use crate::transport::{PeerConnection, PeerConnector, SenderId, TransportEvents};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpKind),
    SetRemote(SdpKind, String),
    Rollback,
    AddTrack(TrackKind),
    ReplaceTrack(SenderId, Option<String>),
    AddCandidate(String),
    Close,
}

impl Op {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateOffer => "create_offer",
            Self::CreateAnswer => "create_answer",
            Self::SetLocal(_) => "set_local",
            Self::SetRemote(..) => "set_remote",
            Self::Rollback => "rollback",
            Self::AddTrack(_) => "add_track",
            Self::ReplaceTrack(..) => "replace_track",
            Self::AddCandidate(_) => "add_candidate",
            Self::Close => "close",
        }
    }
}

/// Recording fake connection.
pub struct FakeConnection {
    peer: ParticipantId,
    events: Option<TransportEvents>,
    log: Mutex<Vec<Op>>,
    next_sender: AtomicU64,
    failures: Mutex<HashMap<&'static str, TransportError>>,
    stalled: AtomicBool,
    attach_gate: Option<Arc<Semaphore>>,
    closed: AtomicBool,
}

impl FakeConnection {
    fn build(
        peer: ParticipantId,
        events: Option<TransportEvents>,
        attach_gate: Option<Arc<Semaphore>>,
    ) -> Self {
        Self {
            peer,
            events,
            log: Mutex::new(Vec::new()),
            next_sender: AtomicU64::new(1),
            failures: Mutex::new(HashMap::new()),
            stalled: AtomicBool::new(false),
            attach_gate,
            closed: AtomicBool::new(false),
        }
    }

    /// A connection with no event handle, for direct use in unit tests.
    pub fn detached(peer: &str) -> Arc<Self> {
        Arc::new(Self::build(peer.into(), None, None))
    }

    pub fn events(&self) -> &TransportEvents {
        self.events.as_ref().expect("connection was created detached")
    }

    pub fn ops(&self) -> Vec<Op> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|op| op.name() == name).count()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.log.lock().unwrap().iter().position(|op| op.name() == name)
    }

    pub fn sender_count(&self) -> usize {
        self.count("add_track")
    }

    pub fn replace_count(&self) -> usize {
        self.count("replace_track")
    }

    pub fn candidates(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                Op::AddCandidate(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn fail_on(&self, name: &'static str, err: TransportError) {
        self.failures.lock().unwrap().insert(name, err);
    }

    pub fn fail_replace(&self, err: TransportError) {
        self.fail_on("replace_track", err);
    }

    /// Make every description operation hang.
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn record(&self, op: Op) -> Result<(), TransportError> {
        let name = op.name();
        let stalls = matches!(name, "create_offer" | "set_remote");
        self.log.lock().unwrap().push(op);
        if stalls && self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        match self.failures.lock().unwrap().get(name) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PeerConnection for FakeConnection {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        self.record(Op::CreateOffer).await?;
        Ok(SessionDescription::offer(format!("offer-for-{}", self.peer)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        self.record(Op::CreateAnswer).await?;
        Ok(SessionDescription::answer(format!("answer-for-{}", self.peer)))
    }

    async fn set_local_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        self.record(Op::SetLocal(desc.kind)).await
    }

    async fn set_remote_description(
        &self,
        desc: SessionDescription,
    ) -> Result<(), TransportError> {
        self.record(Op::SetRemote(desc.kind, desc.sdp)).await
    }

    async fn rollback(&self) -> Result<(), TransportError> {
        self.record(Op::Rollback).await
    }

    async fn add_track(&self, track: MediaTrack) -> Result<SenderId, TransportError> {
        self.record(Op::AddTrack(track.kind())).await?;
        if let Some(gate) = &self.attach_gate {
            gate.acquire().await.unwrap().forget();
        }
        Ok(SenderId(self.next_sender.fetch_add(1, Ordering::SeqCst)))
    }

    async fn replace_track(
        &self,
        sender: SenderId,
        track: Option<MediaTrack>,
    ) -> Result<(), TransportError> {
        let track_id = track.map(|t| t.id().to_string());
        self.record(Op::ReplaceTrack(sender, track_id)).await
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.record(Op::AddCandidate(candidate.candidate)).await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.log.lock().unwrap().push(Op::Close);
    }
}

/// Connector that hands out recording connections.
#[derive(Default)]
pub struct FakeConnector {
    created: Mutex<Vec<Arc<FakeConnection>>>,
    failures: Mutex<Vec<(&'static str, TransportError)>>,
    stall: AtomicBool,
    refuse: AtomicBool,
    attach_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every connection to `peer`, oldest first.
    pub fn connections(&self, peer: &str) -> Vec<Arc<FakeConnection>> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.peer.as_str() == peer)
            .cloned()
            .collect()
    }

    pub fn latest(&self, peer: &str) -> Option<Arc<FakeConnection>> {
        self.connections(peer).pop()
    }

    pub fn total(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    /// Connections created from now on fail `name` with `err`.
    pub fn fail_on(&self, name: &'static str, err: TransportError) {
        self.failures.lock().unwrap().push((name, err));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Connections created from now on hang on description operations.
    pub fn stall_new(&self) {
        self.stall.store(true, Ordering::SeqCst);
    }

    /// Connections created from now on block in `add_track` until the
    /// returned semaphore hands out one permit per track.
    pub fn gate_attach(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.attach_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl PeerConnector for FakeConnector {
    fn connect(
        &self,
        peer: &ParticipantId,
        events: TransportEvents,
    ) -> Result<Arc<dyn PeerConnection>, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("refused".into()));
        }
        let gate = self.attach_gate.lock().unwrap().clone();
        let conn = Arc::new(FakeConnection::build(peer.clone(), Some(events), gate));
        for (name, err) in self.failures.lock().unwrap().iter() {
            conn.fail_on(name, err.clone());
        }
        if self.stall.load(Ordering::SeqCst) {
            conn.stall();
        }
        self.created.lock().unwrap().push(Arc::clone(&conn));
        Ok(conn)
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeDevice {
    user_error: Mutex<Option<DeviceError>>,
    display_error: Mutex<Option<MediaError>>,
    displays: Mutex<Vec<MediaStream>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_user_media(&self, err: DeviceError) {
        *self.user_error.lock().unwrap() = Some(err);
    }

    pub fn fail_display_media(&self, err: MediaError) {
        *self.display_error.lock().unwrap() = Some(err);
    }

    /// The most recent screen capture handed out.
    pub fn last_display(&self) -> Option<MediaStream> {
        self.displays.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CaptureDevice for FakeDevice {
    async fn user_media(&self, constraints: MediaConstraints) -> Result<MediaStream, DeviceError> {
        if let Some(err) = self.user_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(TrackSource::Microphone, "fake microphone"));
        }
        if constraints.video {
            tracks.push(MediaTrack::new(TrackSource::Camera, "fake camera"));
        }
        Ok(MediaStream::new(tracks))
    }

    async fn display_media(&self) -> Result<MediaStream, MediaError> {
        if let Some(err) = self.display_error.lock().unwrap().clone() {
            return Err(err);
        }
        let stream = MediaStream::new(vec![MediaTrack::new(TrackSource::Screen, "fake display")]);
        self.displays.lock().unwrap().push(stream.clone());
        Ok(stream)
    }
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// Channel that records every outbound frame.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<ClientMessage>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Frames addressed to `peer`.
    pub fn sent_to(&self, peer: &str) -> Vec<ClientMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.target().map(ParticipantId::as_str) == Some(peer))
            .collect()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.sent().iter().filter(|m| m.kind() == kind).count()
    }
}

impl SignalingChannel for RecordingChannel {
    fn send(&self, message: ClientMessage) -> Result<(), SignalingError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}
