//! Runs negotiation steps against a connection.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use meshcall_common::{IceCandidate, SessionDescription, TransportError};

use crate::error::NegotiationFailure;
use crate::media::MediaTrack;
use crate::peer::LocalSender;
use crate::transport::PeerConnection;

use super::Operation;

/// What a finished step produced.
#[derive(Debug, Default)]
pub struct OpOutcome {
    pub attached: Vec<LocalSender>,
    pub local_description: Option<SessionDescription>,
}

/// Run `operation` to completion or until `limit` elapses.
///
/// For an inbound offer the order is fixed: the remote description is set
/// before any track is attached, and tracks are attached before the answer
/// is created.
pub async fn execute(
    connection: Arc<dyn PeerConnection>,
    operation: Operation,
    limit: Duration,
) -> Result<OpOutcome, NegotiationFailure> {
    let op = operation.op();
    match tokio::time::timeout(limit, run(connection.as_ref(), operation)).await {
        Ok(result) => result,
        Err(_) => Err(NegotiationFailure::Timeout { op, after: limit }),
    }
}

async fn run(
    connection: &dyn PeerConnection,
    operation: Operation,
) -> Result<OpOutcome, NegotiationFailure> {
    match operation {
        Operation::Attach { tracks } => Ok(OpOutcome {
            attached: attach(connection, tracks).await?,
            local_description: None,
        }),
        Operation::Offer => {
            let offer = connection.create_offer().await?;
            connection.set_local_description(offer.clone()).await?;
            Ok(OpOutcome {
                attached: Vec::new(),
                local_description: Some(offer),
            })
        }
        Operation::Answer {
            offer,
            attach: tracks,
            rollback,
        } => {
            if rollback {
                connection.rollback().await?;
            }
            connection
                .set_remote_description(SessionDescription::offer(offer))
                .await?;
            let attached = attach(connection, tracks).await?;
            let answer = connection.create_answer().await?;
            connection.set_local_description(answer.clone()).await?;
            Ok(OpOutcome {
                attached,
                local_description: Some(answer),
            })
        }
        Operation::ApplyAnswer { answer } => {
            connection
                .set_remote_description(SessionDescription::answer(answer))
                .await?;
            Ok(OpOutcome::default())
        }
    }
}

async fn attach(
    connection: &dyn PeerConnection,
    tracks: Vec<MediaTrack>,
) -> Result<Vec<LocalSender>, TransportError> {
    let mut attached = Vec::with_capacity(tracks.len());
    for track in tracks {
        let sender = connection.add_track(track.clone()).await?;
        debug!(%sender, kind = %track.kind(), track = track.id(), "Attached local track");
        attached.push(LocalSender {
            sender,
            kind: track.kind(),
            track_id: Some(track.id().to_string()),
        });
    }
    Ok(attached)
}

/// Apply candidates in order. A rejected candidate is logged and skipped;
/// the rest are still applied. Returns the number rejected.
pub async fn apply_candidates(
    connection: Arc<dyn PeerConnection>,
    candidates: Vec<IceCandidate>,
) -> usize {
    let mut rejected = 0;
    for candidate in candidates {
        if let Err(e) = connection.add_ice_candidate(candidate).await {
            warn!(error = %e, "Remote candidate rejected");
            rejected += 1;
        }
    }
    rejected
}
