//! Per-peer offer/answer state machine.
//!
//! Every function here is a reducer over one `PeerSession`: it mutates the
//! session and returns the effects the room driver must perform. Nothing in
//! this module awaits; asynchronous steps leave as `Effect::Run` and come
//! back through [`on_completion`].

mod executor;


pub use executor::{apply_candidates, execute, OpOutcome};

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use meshcall_common::{ClientMessage, IceCandidate, ParticipantId, RoomId};

use crate::error::{NegotiationFailure, SignalingProtocolViolation};
use crate::media::{MediaTrack, RemoteStream, RemoteTrack};
use crate::peer::{
    DeferredSignal, NegotiationOp, NegotiationRole, PeerSession, PeerState, SenderAttachState,
};
use crate::room::RoomEvent;
use crate::transport::{ConnectionState, PeerConnection};

// ---------------------------------------------------------------------------
// Inputs and effects
// ---------------------------------------------------------------------------

/// What the reducers need to know about the room.
#[derive(Debug, Clone, Copy)]
pub struct NegotiationContext<'a> {
    pub local_id: &'a ParticipantId,
    pub room_id: &'a RoomId,
    /// Local audio plus the current outgoing video, if any.
    pub local_tracks: &'a [MediaTrack],
}

/// An asynchronous step to run against the session's connection.
#[derive(Debug, Clone)]
pub enum Operation {
    Attach {
        tracks: Vec<MediaTrack>,
    },
    Offer,
    Answer {
        offer: String,
        attach: Vec<MediaTrack>,
        /// Discard our own unanswered offer first.
        rollback: bool,
    },
    ApplyAnswer {
        answer: String,
    },
}

impl Operation {
    pub fn op(&self) -> NegotiationOp {
        match self {
            Self::Attach { .. } => NegotiationOp::Attach,
            Self::Offer => NegotiationOp::Offer,
            Self::Answer { .. } => NegotiationOp::Answer,
            Self::ApplyAnswer { .. } => NegotiationOp::ApplyAnswer,
        }
    }
}

pub enum Effect {
    /// Send a frame to the relay.
    Signal(ClientMessage),
    /// Start an async step for this session.
    Run(Operation),
    /// Apply remote candidates in order.
    ApplyCandidates(Vec<IceCandidate>),
    /// Close a connection the session no longer owns.
    Release(Arc<dyn PeerConnection>),
    Report(RoomEvent),
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(msg) => f.debug_tuple("Signal").field(msg).finish(),
            Self::Run(op) => f.debug_tuple("Run").field(op).finish(),
            Self::ApplyCandidates(c) => f.debug_tuple("ApplyCandidates").field(c).finish(),
            Self::Release(_) => f.write_str("Release"),
            Self::Report(ev) => f.debug_tuple("Report").field(ev).finish(),
        }
    }
}

type Effects = Vec<Effect>;

fn transition(session: &mut PeerSession, to: PeerState, fx: &mut Effects) {
    if session.state == to {
        return;
    }
    debug!(peer = %session.peer_id, from = %session.state, to = %to, "Peer state");
    session.state = to;
    fx.push(Effect::Report(RoomEvent::PeerStateChanged {
        peer: session.peer_id.clone(),
        state: to,
    }));
}

fn violation(
    session: &PeerSession,
    kind: &'static str,
    fx: &mut Effects,
) {
    let err = SignalingProtocolViolation::UnexpectedInState {
        peer: session.peer_id.clone(),
        kind,
        state: session.state,
    };
    warn!(peer = %session.peer_id, error = %err, "Discarding signaling message");
    fx.push(Effect::Report(RoomEvent::ProtocolViolation(err)));
}

// ---------------------------------------------------------------------------
// Offerer path
// ---------------------------------------------------------------------------

/// Start a call from a fresh session. Anything past `New` is left alone.
pub fn initiate(session: &mut PeerSession, ctx: &NegotiationContext<'_>) -> Effects {
    if session.state != PeerState::New {
        debug!(peer = %session.peer_id, state = %session.state, "Call already under way");
        return Vec::new();
    }
    session.role = NegotiationRole::Offerer;
    let tracks = if session.senders.state() == SenderAttachState::Empty {
        ctx.local_tracks.to_vec()
    } else {
        Vec::new()
    };
    info!(peer = %session.peer_id, tracks = tracks.len(), "Initiating call");
    start_offer(session, tracks)
}

/// Offer again from `Stable` if local tracks of a kind with no sender exist.
pub fn renegotiate(session: &mut PeerSession, ctx: &NegotiationContext<'_>) -> Effects {
    if session.state != PeerState::Stable {
        return Vec::new();
    }
    let missing = session.senders.missing(ctx.local_tracks);
    if missing.is_empty() {
        return Vec::new();
    }
    info!(
        peer = %session.peer_id,
        kinds = ?missing.iter().map(MediaTrack::kind).collect::<Vec<_>>(),
        "Renegotiating for new track kinds"
    );
    session.role = NegotiationRole::Offerer;
    start_offer(session, missing)
}

fn start_offer(session: &mut PeerSession, tracks: Vec<MediaTrack>) -> Effects {
    let mut fx = Vec::new();
    if !tracks.is_empty() {
        match session.senders.begin(&tracks) {
            Ok(()) => {
                transition(session, PeerState::Negotiating(NegotiationOp::Attach), &mut fx);
                fx.push(Effect::Run(Operation::Attach { tracks }));
                return fx;
            }
            Err(conflict) => {
                warn!(peer = %session.peer_id, error = %conflict, "Skipping attach");
            }
        }
    }
    transition(session, PeerState::Negotiating(NegotiationOp::Offer), &mut fx);
    fx.push(Effect::Run(Operation::Offer));
    fx
}

// ---------------------------------------------------------------------------
// Inbound signaling
// ---------------------------------------------------------------------------

pub fn on_offer(session: &mut PeerSession, ctx: &NegotiationContext<'_>, sdp: String) -> Effects {
    let mut fx = Vec::new();
    match session.state {
        PeerState::Negotiating(op) => {
            debug!(peer = %session.peer_id, %op, "Deferring offer until step completes");
            session.deferred.push_back(DeferredSignal::Offer(sdp));
        }
        PeerState::OfferSent => {
            // Glare: the greater id yields.
            if ctx.local_id < &session.peer_id {
                info!(peer = %session.peer_id, "Offer collision, keeping local offer");
            } else {
                info!(peer = %session.peer_id, "Offer collision, rolling back local offer");
                fx = start_answer(session, ctx, sdp, true);
            }
        }
        PeerState::New
        | PeerState::LocalTracksAttached
        | PeerState::AnswerSent
        | PeerState::Stable => {
            fx = start_answer(session, ctx, sdp, false);
        }
        PeerState::Closed | PeerState::Failed => violation(session, "offer", &mut fx),
    }
    fx
}

fn start_answer(
    session: &mut PeerSession,
    ctx: &NegotiationContext<'_>,
    offer: String,
    rollback: bool,
) -> Effects {
    let mut fx = Vec::new();
    let attach = match session.senders.state() {
        SenderAttachState::Empty if !ctx.local_tracks.is_empty() => {
            match session.senders.begin(ctx.local_tracks) {
                Ok(()) => ctx.local_tracks.to_vec(),
                Err(conflict) => {
                    warn!(peer = %session.peer_id, error = %conflict, "Skipping attach");
                    Vec::new()
                }
            }
        }
        SenderAttachState::Empty => Vec::new(),
        state => {
            debug!(peer = %session.peer_id, senders = %state, "Senders already bound, not attaching");
            Vec::new()
        }
    };
    session.role = NegotiationRole::Answerer;
    transition(session, PeerState::Negotiating(NegotiationOp::Answer), &mut fx);
    fx.push(Effect::Run(Operation::Answer {
        offer,
        attach,
        rollback,
    }));
    fx
}

pub fn on_answer(session: &mut PeerSession, sdp: String) -> Effects {
    let mut fx = Vec::new();
    match session.state {
        PeerState::Negotiating(op) => {
            debug!(peer = %session.peer_id, %op, "Deferring answer until step completes");
            session.deferred.push_back(DeferredSignal::Answer(sdp));
        }
        PeerState::OfferSent => {
            transition(session, PeerState::Negotiating(NegotiationOp::ApplyAnswer), &mut fx);
            fx.push(Effect::Run(Operation::ApplyAnswer { answer: sdp }));
        }
        _ => violation(session, "answer", &mut fx),
    }
    fx
}

pub fn on_remote_candidate(session: &mut PeerSession, candidate: IceCandidate) -> Effects {
    if session.state.is_terminal() {
        debug!(peer = %session.peer_id, "Dropping candidate for inactive session");
        return Vec::new();
    }
    session.pending_candidates.push_back(candidate);
    flush_candidates(session).into_iter().collect()
}

pub fn on_local_candidate(
    session: &PeerSession,
    ctx: &NegotiationContext<'_>,
    candidate: IceCandidate,
) -> Effects {
    if session.state.is_terminal() {
        return Vec::new();
    }
    vec![Effect::Signal(ClientMessage::IceCandidate {
        target_id: session.peer_id.clone(),
        room_id: ctx.room_id.clone(),
        candidate,
    })]
}

/// A candidate batch finished; release the next one if possible.
pub fn on_candidates_applied(session: &mut PeerSession) -> Effects {
    session.applying_candidates = false;
    flush_candidates(session).into_iter().collect()
}

fn flush_candidates(session: &mut PeerSession) -> Option<Effect> {
    if !session.can_apply_candidates() || session.pending_candidates.is_empty() {
        return None;
    }
    session.applying_candidates = true;
    let batch: Vec<IceCandidate> = session.pending_candidates.drain(..).collect();
    debug!(peer = %session.peer_id, count = batch.len(), "Applying remote candidates");
    Some(Effect::ApplyCandidates(batch))
}

// ---------------------------------------------------------------------------
// Completions
// ---------------------------------------------------------------------------

pub fn on_completion(
    session: &mut PeerSession,
    ctx: &NegotiationContext<'_>,
    op: NegotiationOp,
    result: Result<OpOutcome, NegotiationFailure>,
) -> Effects {
    if session.state != PeerState::Negotiating(op) {
        warn!(peer = %session.peer_id, %op, state = %session.state, "Completion does not match session state");
        return Vec::new();
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(failure) => {
            session.senders.abort();
            return fail(session, failure);
        }
    };

    let mut fx = Vec::new();
    if session.senders.state() == SenderAttachState::Attaching {
        session.senders.complete(outcome.attached);
    }

    match op {
        NegotiationOp::Attach => {
            transition(session, PeerState::LocalTracksAttached, &mut fx);
            transition(session, PeerState::Negotiating(NegotiationOp::Offer), &mut fx);
            fx.push(Effect::Run(Operation::Offer));
            return fx;
        }
        NegotiationOp::Offer => {
            let Some(offer) = outcome.local_description else {
                return fail(session, missing_description());
            };
            transition(session, PeerState::OfferSent, &mut fx);
            fx.push(Effect::Signal(ClientMessage::Offer {
                target_id: session.peer_id.clone(),
                room_id: ctx.room_id.clone(),
                sdp: offer.sdp,
            }));
        }
        NegotiationOp::Answer => {
            let Some(answer) = outcome.local_description else {
                return fail(session, missing_description());
            };
            session.remote_description_set = true;
            transition(session, PeerState::AnswerSent, &mut fx);
            fx.push(Effect::Signal(ClientMessage::Answer {
                target_id: session.peer_id.clone(),
                room_id: ctx.room_id.clone(),
                sdp: answer.sdp,
            }));
            transition(session, PeerState::Stable, &mut fx);
        }
        NegotiationOp::ApplyAnswer => {
            session.remote_description_set = true;
            transition(session, PeerState::Stable, &mut fx);
        }
    }

    fx.extend(flush_candidates(session));

    while !session.state.is_busy() {
        let Some(signal) = session.deferred.pop_front() else {
            break;
        };
        fx.extend(match signal {
            DeferredSignal::Offer(sdp) => on_offer(session, ctx, sdp),
            DeferredSignal::Answer(sdp) => on_answer(session, sdp),
        });
    }

    fx.extend(renegotiate(session, ctx));
    fx
}

fn missing_description() -> NegotiationFailure {
    NegotiationFailure::Transport(meshcall_common::TransportError::Description(
        "step produced no local description".into(),
    ))
}

// ---------------------------------------------------------------------------
// Transport events
// ---------------------------------------------------------------------------

pub fn on_connection_state(session: &mut PeerSession, state: ConnectionState) -> Effects {
    if session.state.is_terminal() {
        return Vec::new();
    }
    session.connection_state = state;
    let mut fx = vec![Effect::Report(RoomEvent::ConnectionStateChanged {
        peer: session.peer_id.clone(),
        state,
    })];
    if state == ConnectionState::Failed {
        fx.extend(fail(session, NegotiationFailure::ConnectionFailed));
    }
    fx
}

/// Publish a new composed stream including `track`.
pub fn on_remote_track(session: &mut PeerSession, track: RemoteTrack) -> Effects {
    if session.state.is_terminal() {
        return Vec::new();
    }
    let stream = match &session.remote_stream {
        Some(current) => current.with_track(track),
        None => RemoteStream::from_track(track),
    };
    let stream = Arc::new(stream);
    session.remote_stream = Some(Arc::clone(&stream));
    debug!(peer = %session.peer_id, stream = %stream.id, tracks = stream.tracks.len(), "Remote stream updated");
    vec![Effect::Report(RoomEvent::RemoteStreamUpdated {
        peer: session.peer_id.clone(),
        stream,
    })]
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

/// Mark the session failed and give up its connection and remote stream.
pub fn fail(session: &mut PeerSession, failure: NegotiationFailure) -> Effects {
    if session.state.is_terminal() {
        return Vec::new();
    }
    warn!(peer = %session.peer_id, error = %failure, "Peer session failed");
    let mut fx = Vec::new();
    transition(session, PeerState::Failed, &mut fx);
    release(session, &mut fx);
    fx.push(Effect::Report(RoomEvent::PeerFailed {
        peer: session.peer_id.clone(),
        error: failure,
    }));
    fx
}

/// Close the session for departure or leave.
pub fn close(session: &mut PeerSession) -> Effects {
    let mut fx = Vec::new();
    if session.state == PeerState::Closed {
        return fx;
    }
    transition(session, PeerState::Closed, &mut fx);
    release(session, &mut fx);
    fx
}

fn release(session: &mut PeerSession, fx: &mut Effects) {
    session.pending_candidates.clear();
    session.deferred.clear();
    session.applying_candidates = false;
    if let Some(connection) = session.connection.take() {
        fx.push(Effect::Release(connection));
    }
    if session.remote_stream.take().is_some() {
        fx.push(Effect::Report(RoomEvent::RemoteStreamRemoved {
            peer: session.peer_id.clone(),
        }));
    }
}
