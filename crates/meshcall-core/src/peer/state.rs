use std::fmt;

use serde::Serialize;

/// Which side of the offer/answer exchange this session last played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationRole {
    #[default]
    Unset,
    Offerer,
    Answerer,
}

/// Progress of binding local tracks to a connection's senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderAttachState {
    #[default]
    Empty,
    Attaching,
    Attached,
}

impl fmt::Display for SenderAttachState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Attaching => write!(f, "attaching"),
            Self::Attached => write!(f, "attached"),
        }
    }
}

/// An asynchronous negotiation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NegotiationOp {
    /// Bind local tracks ahead of an offer.
    Attach,
    /// Create and apply a local offer.
    Offer,
    /// Apply a remote offer, attach, create and apply the answer.
    Answer,
    /// Apply a remote answer.
    ApplyAnswer,
}

impl fmt::Display for NegotiationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attach => write!(f, "attach"),
            Self::Offer => write!(f, "offer"),
            Self::Answer => write!(f, "answer"),
            Self::ApplyAnswer => write!(f, "apply-answer"),
        }
    }
}

/// Per-peer negotiation state.
///
/// `Negotiating` marks a step in flight and doubles as the per-peer guard:
/// nothing re-enters the session until the step's completion is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerState {
    #[default]
    New,
    LocalTracksAttached,
    Negotiating(NegotiationOp),
    OfferSent,
    AnswerSent,
    Stable,
    Closed,
    Failed,
}

impl PeerState {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Negotiating(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::LocalTracksAttached => write!(f, "local-tracks-attached"),
            Self::Negotiating(op) => write!(f, "negotiating({op})"),
            Self::OfferSent => write!(f, "offer-sent"),
            Self::AnswerSent => write!(f, "answer-sent"),
            Self::Stable => write!(f, "stable"),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiating_is_busy() {
        assert!(PeerState::Negotiating(NegotiationOp::Answer).is_busy());
        assert!(!PeerState::OfferSent.is_busy());
        assert!(!PeerState::Stable.is_busy());
    }

    #[test]
    fn display_names() {
        assert_eq!(
            PeerState::Negotiating(NegotiationOp::ApplyAnswer).to_string(),
            "negotiating(apply-answer)"
        );
        assert_eq!(PeerState::LocalTracksAttached.to_string(), "local-tracks-attached");
    }

    #[test]
    fn serializes_kebab_case() {
        let json = serde_json::to_string(&PeerState::OfferSent).unwrap();
        assert_eq!(json, "\"offer-sent\"");
    }
}
