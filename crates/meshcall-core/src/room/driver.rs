//! The room task: one loop owning all room state.
//!
//! Signaling events, transport events, media events, intents and step
//! completions are serialized through `RoomDriver::run`. Negotiation steps
//! run in a `JoinSet` so different peers progress concurrently, while each
//! session's `Negotiating` tag keeps its own steps strictly sequential.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use meshcall_common::{
    ClientMessage, MediaError, MeshError, ParticipantId, Result, RoomError, RoomId, ServerMessage,
    TransportError,
};

use crate::error::{NegotiationFailure, SignalingProtocolViolation};
use crate::media::{
    MediaConstraints, MediaEvent, MediaSourceManager, MediaStream, MediaTrack, TrackKind,
    VideoSenderTarget,
};
use crate::membership::{Admission, RoomState};
use crate::negotiator::{self, Effect, NegotiationContext, OpOutcome};
use crate::peer::{NegotiationOp, PeerSession, PeerState};
use crate::signaling::{ChannelEvent, SignalingChannel};
use crate::transport::{
    PeerConnection, PeerConnector, PeerTransportEvent, TransportEvent, TransportEvents,
};

use super::types::{Reply, RoomCommand, RoomConfig, RoomEvent, RoomIdentity, RoomSnapshot};

/// Results flowing back from tasks in the room's `JoinSet`.
enum Completion {
    Negotiation {
        peer: ParticipantId,
        epoch: u64,
        op: NegotiationOp,
        result: std::result::Result<OpOutcome, NegotiationFailure>,
    },
    Candidates {
        peer: ParticipantId,
        epoch: u64,
        rejected: usize,
    },
    LocalMedia {
        result: std::result::Result<MediaStream, MediaError>,
        reply: Reply<()>,
    },
    ScreenShare {
        result: std::result::Result<MediaStream, MediaError>,
        reply: Reply<()>,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub(crate) struct RoomDriver {
    identity: RoomIdentity,
    config: RoomConfig,
    joined: bool,
    signaling_connected: bool,
    room: RoomState,
    media: MediaSourceManager,
    channel: Arc<dyn SignalingChannel>,
    connector: Arc<dyn PeerConnector>,
    transport_tx: mpsc::Sender<PeerTransportEvent>,
    tasks: JoinSet<Completion>,
    event_tx: mpsc::Sender<RoomEvent>,
    snapshot_tx: watch::Sender<RoomSnapshot>,
}

/// Receivers the run loop selects over.
pub(crate) struct DriverInputs {
    pub(crate) commands: mpsc::Receiver<RoomCommand>,
    pub(crate) inbound: mpsc::Receiver<ChannelEvent>,
    pub(crate) transport: mpsc::Receiver<PeerTransportEvent>,
    pub(crate) media: mpsc::Receiver<MediaEvent>,
}

impl RoomDriver {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        identity: RoomIdentity,
        config: RoomConfig,
        media: MediaSourceManager,
        channel: Arc<dyn SignalingChannel>,
        connector: Arc<dyn PeerConnector>,
        transport_tx: mpsc::Sender<PeerTransportEvent>,
        event_tx: mpsc::Sender<RoomEvent>,
        snapshot_tx: watch::Sender<RoomSnapshot>,
    ) -> Self {
        Self {
            room: RoomState::new(identity.participant_id.clone()),
            identity,
            config,
            joined: false,
            signaling_connected: false,
            media,
            channel,
            connector,
            transport_tx,
            tasks: JoinSet::new(),
            event_tx,
            snapshot_tx,
        }
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    pub(crate) async fn run(mut self, inputs: DriverInputs) {
        let DriverInputs {
            mut commands,
            mut inbound,
            mut transport,
            mut media,
        } = inputs;

        info!(
            room = %self.identity.room_id,
            participant = %self.identity.participant_id,
            "Room session opened"
        );

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await == Flow::Stop {
                            break;
                        }
                    }
                    None => {
                        info!(room = %self.identity.room_id, "All room handles dropped");
                        self.teardown().await;
                        break;
                    }
                },
                Some(event) = inbound.recv() => self.handle_channel_event(event),
                Some(event) = transport.recv() => self.handle_transport_event(event),
                Some(event) = media.recv() => self.handle_media_event(event).await,
                Some(joined) = self.tasks.join_next() => match joined {
                    Ok(completion) => self.handle_completion(completion).await,
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => error!(error = %e, "Room task panicked"),
                },
            }

            debug_assert!(
                self.room.is_consistent(),
                "membership diverged from peer registry"
            );
            self.publish();
        }

        info!(room = %self.identity.room_id, "Room session closed");
    }

    fn publish(&self) {
        let registry = self.room.registry();
        let snapshot = RoomSnapshot {
            joined: self.joined,
            signaling_connected: self.signaling_connected,
            members: self.room.members().cloned().collect(),
            remote_streams: registry
                .iter()
                .filter_map(|(peer, s)| s.remote_stream().map(|st| (peer.clone(), Arc::clone(st))))
                .collect(),
            peer_states: registry
                .iter()
                .map(|(peer, s)| (peer.clone(), s.state()))
                .collect(),
            local_media_active: self.media.is_local_active(),
            screen_sharing: self.media.is_screen_sharing(),
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    fn emit(&self, event: RoomEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.event_tx.try_send(event) {
            warn!(?event, "Room event queue full, dropping event");
        }
    }

    fn signal(&self, message: ClientMessage) {
        let kind = message.kind();
        if let Err(e) = self.channel.send(message) {
            warn!(error = %e, kind, "Signaling send failed");
        }
    }

    // -----------------------------------------------------------------------
    // Intents
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, cmd: RoomCommand) -> Flow {
        match cmd {
            RoomCommand::Join { reply } => {
                let _ = reply.send(self.join());
            }
            RoomCommand::Leave { reply } => {
                self.leave().await;
                let _ = reply.send(Ok(()));
                return Flow::Stop;
            }
            RoomCommand::StartLocalMedia { constraints, reply } => {
                self.start_local_media(constraints, reply);
            }
            RoomCommand::CallPeer { peer, reply } => {
                let _ = reply.send(self.call_peer(peer));
            }
            RoomCommand::StartScreenShare { reply } => {
                self.start_screen_share(reply);
            }
            RoomCommand::StopScreenShare { reply } => {
                self.stop_screen_share(false).await;
                let _ = reply.send(Ok(()));
            }
            RoomCommand::ToggleTrack { kind, reply } => {
                let result = self.media.toggle_track_enabled(kind).map_err(MeshError::from);
                let _ = reply.send(result);
            }
        }
        Flow::Continue
    }

    fn join(&mut self) -> Result<()> {
        if self.joined {
            debug!(room = %self.identity.room_id, "Already joined");
            return Ok(());
        }
        self.channel.send(ClientMessage::JoinRoom {
            room_id: self.identity.room_id.clone(),
            participant_id: self.identity.participant_id.clone(),
        })?;
        self.joined = true;
        info!(room = %self.identity.room_id, "Joined room");
        self.emit(RoomEvent::Joined {
            room: self.identity.room_id.clone(),
        });
        Ok(())
    }

    async fn leave(&mut self) {
        if self.joined {
            self.signal(ClientMessage::LeaveRoom {
                room_id: self.identity.room_id.clone(),
                participant_id: self.identity.participant_id.clone(),
            });
        }
        self.teardown().await;
        info!(room = %self.identity.room_id, "Left room");
        self.emit(RoomEvent::Left {
            room: self.identity.room_id.clone(),
        });
    }

    /// Abort in-flight steps, close every session and release local media.
    async fn teardown(&mut self) {
        self.tasks.abort_all();

        let mut closing: Vec<Arc<dyn PeerConnection>> = Vec::new();
        for mut session in self.room.drain() {
            for effect in negotiator::close(&mut session) {
                match effect {
                    Effect::Release(connection) => closing.push(connection),
                    Effect::Report(event) => self.emit(event),
                    _ => {}
                }
            }
        }
        join_all(closing.iter().map(|c| c.close())).await;

        self.media.release();
        self.joined = false;
        self.publish();
    }

    fn start_local_media(&mut self, constraints: Option<MediaConstraints>, reply: Reply<()>) {
        if self.media.is_local_active() {
            let _ = reply.send(Ok(()));
            return;
        }
        let constraints = constraints.unwrap_or(self.config.default_constraints);
        let acquire = self.media.acquire_local_media(constraints);
        self.tasks.spawn(async move {
            Completion::LocalMedia {
                result: acquire.await,
                reply,
            }
        });
    }

    fn call_peer(&mut self, peer: ParticipantId) -> Result<()> {
        if !self.joined {
            return Err(RoomError::NotJoined.into());
        }
        if !self.room.is_member(&peer) {
            return Err(RoomError::UnknownPeer(peer.to_string()).into());
        }
        if self.state_of(&peer) == Some(PeerState::Failed) {
            self.renew(&peer);
        }
        self.initiate(&peer);
        Ok(())
    }

    fn start_screen_share(&mut self, reply: Reply<()>) {
        if self.media.is_screen_sharing() {
            let _ = reply.send(Ok(()));
            return;
        }
        let acquire = self.media.acquire_screen_share();
        self.tasks.spawn(async move {
            Completion::ScreenShare {
                result: acquire.await,
                reply,
            }
        });
    }

    async fn stop_screen_share(&mut self, revoked: bool) {
        if !self.media.stop_screen_share() {
            return;
        }
        let camera = self.media.outgoing_video();
        self.replace_video(camera).await;
        self.emit(RoomEvent::ScreenShareStopped { revoked });
    }

    // -----------------------------------------------------------------------
    // Signaling
    // -----------------------------------------------------------------------

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                self.signaling_connected = true;
                self.emit(RoomEvent::SignalingConnected);
            }
            ChannelEvent::Disconnected => {
                warn!(room = %self.identity.room_id, "Signaling connection lost");
                self.signaling_connected = false;
                self.emit(RoomEvent::SignalingDisconnected);
            }
            ChannelEvent::Message(msg) => {
                if !self.joined {
                    debug!(kind = msg.kind(), "Ignoring relay message before join");
                    return;
                }
                self.handle_server_message(msg);
            }
        }
    }

    fn handle_server_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::ExistingUsers { users } => {
                debug!(count = users.len(), "Room roster received");
                for user in users {
                    self.admit(user.participant_id);
                }
            }
            ServerMessage::UserJoined { participant_id } => self.admit(participant_id),
            ServerMessage::UserLeft { participant_id } => self.depart(&participant_id),
            ServerMessage::Offer {
                from_id,
                room_id,
                sdp,
            } => {
                if self.in_room("offer", &from_id, &room_id) {
                    self.on_offer(from_id, sdp);
                }
            }
            ServerMessage::Answer {
                from_id,
                room_id,
                sdp,
            } => {
                if self.in_room("answer", &from_id, &room_id) && self.known("answer", &from_id) {
                    self.drive(&from_id, None, |s, _| negotiator::on_answer(s, sdp));
                }
            }
            ServerMessage::IceCandidate {
                from_id,
                room_id,
                candidate,
            } => {
                if self.in_room("ice-candidate", &from_id, &room_id)
                    && self.known("ice-candidate", &from_id)
                {
                    self.drive(&from_id, None, |s, _| {
                        negotiator::on_remote_candidate(s, candidate)
                    });
                }
            }
            ServerMessage::Error { message } => {
                warn!(%message, "Relay reported an error");
                self.emit(RoomEvent::RelayError { message });
            }
        }
    }

    fn report_violation(&self, violation: SignalingProtocolViolation) {
        warn!(error = %violation, "Discarding signaling message");
        self.emit(RoomEvent::ProtocolViolation(violation));
    }

    fn in_room(&self, kind: &'static str, from: &ParticipantId, room: &RoomId) -> bool {
        if *room == self.identity.room_id {
            return true;
        }
        self.report_violation(SignalingProtocolViolation::WrongRoom {
            peer: from.clone(),
            kind,
            room: room.to_string(),
        });
        false
    }

    fn known(&self, kind: &'static str, from: &ParticipantId) -> bool {
        if self.room.registry().contains(from) {
            return true;
        }
        self.report_violation(SignalingProtocolViolation::UnknownPeer {
            peer: from.clone(),
            kind,
        });
        false
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    fn admit(&mut self, peer: ParticipantId) {
        match self.room.admit(&peer) {
            Admission::Admitted => {
                info!(peer = %peer, "Peer joined");
                self.emit(RoomEvent::PeerJoined { peer: peer.clone() });
                if self.media.is_local_active() {
                    self.initiate(&peer);
                } else {
                    debug!(peer = %peer, "Deferring call until local media is active");
                }
            }
            Admission::Known => debug!(peer = %peer, "Duplicate join ignored"),
            Admission::Ignored => {}
        }
    }

    fn depart(&mut self, peer: &ParticipantId) {
        let Some(mut session) = self.room.depart(peer) else {
            debug!(peer = %peer, "Departure for unknown peer");
            return;
        };
        info!(peer = %peer, "Peer left");
        let effects = negotiator::close(&mut session);
        self.apply(peer, session.epoch(), None, effects);
        self.emit(RoomEvent::PeerLeft { peer: peer.clone() });
    }

    /// Replace a member's session with a fresh one in `New`.
    fn renew(&mut self, peer: &ParticipantId) {
        let Some(mut old) = self.room.renew(peer) else {
            return;
        };
        debug!(peer = %peer, old_state = %old.state(), "Replacing peer session");
        let effects = negotiator::close(&mut old);
        self.apply(peer, old.epoch(), None, effects);
        self.emit(RoomEvent::PeerStateChanged {
            peer: peer.clone(),
            state: PeerState::New,
        });
    }

    fn on_offer(&mut self, from: ParticipantId, sdp: String) {
        match self.room.admit(&from) {
            Admission::Ignored => {
                debug!("Ignoring offer from our own id");
                return;
            }
            Admission::Admitted => {
                info!(peer = %from, "Offer from new peer");
                self.emit(RoomEvent::PeerJoined { peer: from.clone() });
            }
            Admission::Known => {}
        }
        if self.state_of(&from) == Some(PeerState::Failed) {
            self.renew(&from);
        }
        if !self.ensure_connection(&from) {
            return;
        }
        self.drive(&from, None, |s, ctx| negotiator::on_offer(s, ctx, sdp));
    }

    fn initiate(&mut self, peer: &ParticipantId) {
        if !self.ensure_connection(peer) {
            return;
        }
        self.drive(peer, None, negotiator::initiate);
    }

    /// New sessions get a call; settled sessions pick up new track kinds.
    fn on_local_media_available(&mut self) {
        let peers: Vec<ParticipantId> = self.room.registry().keys().cloned().collect();
        for peer in peers {
            match self.state_of(&peer) {
                Some(PeerState::New) => self.initiate(&peer),
                Some(PeerState::Stable) => {
                    self.drive(&peer, None, negotiator::renegotiate);
                }
                _ => {}
            }
        }
    }

    fn renegotiate_all(&mut self) {
        let peers: Vec<ParticipantId> = self.room.registry().keys().cloned().collect();
        for peer in peers {
            self.drive(&peer, None, negotiator::renegotiate);
        }
    }

    fn state_of(&self, peer: &ParticipantId) -> Option<PeerState> {
        self.room.registry().get(peer).map(PeerSession::state)
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Create the session's connection if it has none.
    fn ensure_connection(&mut self, peer: &ParticipantId) -> bool {
        let Some(session) = self.room.registry_mut().get_mut(peer) else {
            return false;
        };
        if session.connection.is_some() {
            return true;
        }
        if session.state().is_terminal() {
            return false;
        }
        let epoch = session.epoch();
        let events = TransportEvents::new(peer.clone(), epoch, self.transport_tx.clone());
        match self.connector.connect(peer, events) {
            Ok(connection) => {
                session.connection = Some(connection);
                true
            }
            Err(e) => {
                self.drive(peer, Some(epoch), |s, _| negotiator::fail(s, e.into()));
                false
            }
        }
    }

    /// Run a reducer on a session and carry out its effects. With `epoch`
    /// set, a replaced session is skipped. Returns false if no session ran.
    fn drive<F>(&mut self, peer: &ParticipantId, epoch: Option<u64>, reducer: F) -> bool
    where
        F: FnOnce(&mut PeerSession, &NegotiationContext<'_>) -> Vec<Effect>,
    {
        let tracks = self.media.tracks_for_attach();
        let ctx = NegotiationContext {
            local_id: &self.identity.participant_id,
            room_id: &self.identity.room_id,
            local_tracks: &tracks,
        };
        let registry = self.room.registry_mut();
        let session = match epoch {
            Some(epoch) => registry.get_current(peer, epoch),
            None => registry.get_mut(peer),
        };
        let Some(session) = session else {
            return false;
        };
        let effects = reducer(session, &ctx);
        let epoch = session.epoch();
        let connection = session.connection();
        self.apply(peer, epoch, connection, effects);
        true
    }

    fn apply(
        &mut self,
        peer: &ParticipantId,
        epoch: u64,
        connection: Option<Arc<dyn PeerConnection>>,
        effects: Vec<Effect>,
    ) {
        for effect in effects {
            match effect {
                Effect::Signal(message) => self.signal(message),
                Effect::Run(operation) => {
                    let Some(connection) = connection.clone() else {
                        error!(peer = %peer, op = %operation.op(), "No connection for negotiation step");
                        self.drive(peer, Some(epoch), |s, _| {
                            negotiator::fail(s, TransportError::Closed.into())
                        });
                        continue;
                    };
                    let op = operation.op();
                    let limit = self.config.negotiation_timeout;
                    let peer = peer.clone();
                    self.tasks.spawn(async move {
                        let result = negotiator::execute(connection, operation, limit).await;
                        Completion::Negotiation {
                            peer,
                            epoch,
                            op,
                            result,
                        }
                    });
                }
                Effect::ApplyCandidates(candidates) => {
                    let Some(connection) = connection.clone() else {
                        debug!(peer = %peer, "Dropping candidates for closed connection");
                        continue;
                    };
                    let peer = peer.clone();
                    self.tasks.spawn(async move {
                        let rejected = negotiator::apply_candidates(connection, candidates).await;
                        Completion::Candidates {
                            peer,
                            epoch,
                            rejected,
                        }
                    });
                }
                Effect::Release(connection) => {
                    tokio::spawn(async move { connection.close().await });
                }
                Effect::Report(event) => self.emit(event),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transport, media and completions
    // -----------------------------------------------------------------------

    fn handle_transport_event(&mut self, event: PeerTransportEvent) {
        let PeerTransportEvent { peer, epoch, event } = event;
        let ran = match event {
            TransportEvent::LocalCandidate(candidate) => {
                self.drive(&peer, Some(epoch), |s, ctx| {
                    negotiator::on_local_candidate(s, ctx, candidate)
                })
            }
            TransportEvent::RemoteTrack(track) => {
                self.drive(&peer, Some(epoch), |s, _| negotiator::on_remote_track(s, track))
            }
            TransportEvent::StateChanged(state) => {
                self.drive(&peer, Some(epoch), |s, _| {
                    negotiator::on_connection_state(s, state)
                })
            }
        };
        if !ran {
            debug!(peer = %peer, epoch, "Discarding transport event for replaced session");
        }
    }

    async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::ScreenShareEnded { track_id } => {
                if self.media.screen_track_id() == Some(track_id.as_str()) {
                    info!("Screen capture ended by the platform");
                    self.stop_screen_share(true).await;
                }
            }
        }
    }

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Negotiation {
                peer,
                epoch,
                op,
                result,
            } => {
                let ran = self.drive(&peer, Some(epoch), |s, ctx| {
                    negotiator::on_completion(s, ctx, op, result)
                });
                if !ran {
                    debug!(peer = %peer, %op, "Discarding stale completion");
                    return;
                }
                self.refresh_video_sender(&peer).await;
            }
            Completion::Candidates {
                peer,
                epoch,
                rejected,
            } => {
                if rejected > 0 {
                    debug!(peer = %peer, rejected, "Some remote candidates were rejected");
                }
                self.drive(&peer, Some(epoch), |s, _| negotiator::on_candidates_applied(s));
            }
            Completion::LocalMedia { result, reply } => match result {
                Ok(stream) => {
                    self.media.install_local_media(stream);
                    self.emit(RoomEvent::LocalMediaStarted);
                    self.on_local_media_available();
                    let _ = reply.send(Ok(()));
                }
                Err(e) => {
                    warn!(error = %e, "Local media unavailable");
                    let _ = reply.send(Err(e.into()));
                }
            },
            Completion::ScreenShare { result, reply } => {
                let result = match result {
                    Ok(stream) => self.install_screen_share(stream).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = &result {
                    warn!(error = %e, "Screen share unavailable");
                }
                let _ = reply.send(result.map_err(MeshError::from));
            }
        }
    }

    async fn install_screen_share(
        &mut self,
        stream: MediaStream,
    ) -> std::result::Result<(), MediaError> {
        let track = self.media.install_screen_share(stream)?;
        self.emit(RoomEvent::ScreenShareStarted);
        self.replace_video(Some(track)).await;
        // Peers without a video sender need one.
        self.renegotiate_all();
        Ok(())
    }

    /// Point every existing video sender at `track`.
    async fn replace_video(&mut self, track: Option<MediaTrack>) {
        let targets: Vec<VideoSenderTarget> = self
            .room
            .registry()
            .iter()
            .filter_map(|(peer, session)| video_target(peer, session))
            .collect();
        self.replace_on(targets, track).await;
    }

    /// A sender bound while a share started or stopped may carry the wrong
    /// track; point it at the current outgoing video.
    async fn refresh_video_sender(&mut self, peer: &ParticipantId) {
        let track = self.media.outgoing_video();
        let Some(session) = self.room.registry().get(peer) else {
            return;
        };
        let Some(sender) = session.senders().sender_for(TrackKind::Video) else {
            return;
        };
        if sender.track_id.as_deref() == track.as_ref().map(MediaTrack::id) {
            return;
        }
        let Some(target) = video_target(peer, session) else {
            return;
        };
        debug!(peer = %peer, "Video sender carries a stale track");
        self.replace_on(vec![target], track).await;
    }

    async fn replace_on(&mut self, targets: Vec<VideoSenderTarget>, track: Option<MediaTrack>) {
        if targets.is_empty() {
            return;
        }

        let track_id = track.as_ref().map(|t| t.id().to_string());
        let report = self.media.replace_outgoing_video(targets, track).await;

        for peer in &report.replaced {
            if let Some(session) = self.room.registry_mut().get_mut(peer) {
                session.senders.set_track(TrackKind::Video, track_id.clone());
            }
        }
        info!(
            replaced = report.replaced.len(),
            failed = report.failed.len(),
            "Outgoing video replaced"
        );
        for (peer, error) in report.failed {
            self.emit(RoomEvent::VideoReplaceFailed { peer, error });
        }
    }
}

fn video_target(peer: &ParticipantId, session: &PeerSession) -> Option<VideoSenderTarget> {
    let sender = session.senders().sender_for(TrackKind::Video)?;
    Some(VideoSenderTarget {
        peer: peer.clone(),
        connection: session.connection()?,
        sender: sender.sender,
    })
}
