use std::collections::HashMap;

use meshcall_common::ParticipantId;

use super::session::PeerSession;

/// Owned peer id → session map for one room session.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    sessions: HashMap<ParticipantId, PeerSession>,
    next_epoch: u64,
}

impl PeerRegistry {
    /// Create a fresh session for `peer`, returning any session it replaced.
    pub fn create(&mut self, peer: ParticipantId) -> Option<PeerSession> {
        self.next_epoch += 1;
        let session = PeerSession::new(peer.clone(), self.next_epoch);
        self.sessions.insert(peer, session)
    }

    pub fn get(&self, peer: &ParticipantId) -> Option<&PeerSession> {
        self.sessions.get(peer)
    }

    pub fn get_mut(&mut self, peer: &ParticipantId) -> Option<&mut PeerSession> {
        self.sessions.get_mut(peer)
    }

    /// The session for `peer` only if it is still the one tagged `epoch`.
    pub fn get_current(&mut self, peer: &ParticipantId, epoch: u64) -> Option<&mut PeerSession> {
        self.sessions.get_mut(peer).filter(|s| s.epoch == epoch)
    }

    pub fn remove(&mut self, peer: &ParticipantId) -> Option<PeerSession> {
        self.sessions.remove(peer)
    }

    pub fn contains(&self, peer: &ParticipantId) -> bool {
        self.sessions.contains_key(peer)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ParticipantId> {
        self.sessions.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &PeerSession)> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = PeerSession> + '_ {
        self.sessions.drain().map(|(_, s)| s)
    }
}
