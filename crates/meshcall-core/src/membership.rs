//! Room membership reconciled with the peer registry.
//!
//! Every mutation of the membership set goes through `RoomState`, which
//! creates or destroys the matching session in the same call. The two key
//! sets therefore never diverge; `is_consistent` checks it.

use std::collections::BTreeSet;

use meshcall_common::ParticipantId;

use crate::peer::{PeerRegistry, PeerSession};

/// Result of learning about a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The id is our own.
    Ignored,
    /// Already a member; nothing changed.
    Known,
    /// Newly added with a fresh session in `New`.
    Admitted,
}

#[derive(Debug)]
pub struct RoomState {
    local: ParticipantId,
    members: BTreeSet<ParticipantId>,
    registry: PeerRegistry,
}

impl RoomState {
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            members: BTreeSet::new(),
            registry: PeerRegistry::default(),
        }
    }

    pub fn local(&self) -> &ParticipantId {
        &self.local
    }

    pub fn admit(&mut self, peer: &ParticipantId) -> Admission {
        if *peer == self.local {
            return Admission::Ignored;
        }
        if !self.members.insert(peer.clone()) {
            return Admission::Known;
        }
        self.registry.create(peer.clone());
        Admission::Admitted
    }

    /// Remove a member and hand back its session for teardown.
    pub fn depart(&mut self, peer: &ParticipantId) -> Option<PeerSession> {
        self.members.remove(peer);
        self.registry.remove(peer)
    }

    /// Swap a member's session for a fresh one, returning the old session.
    /// Does nothing for non-members.
    pub fn renew(&mut self, peer: &ParticipantId) -> Option<PeerSession> {
        if !self.members.contains(peer) {
            return None;
        }
        self.registry.create(peer.clone())
    }

    pub fn is_member(&self, peer: &ParticipantId) -> bool {
        self.members.contains(peer)
    }

    pub fn members(&self) -> impl Iterator<Item = &ParticipantId> {
        self.members.iter()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PeerRegistry {
        &mut self.registry
    }

    pub fn is_consistent(&self) -> bool {
        self.members.len() == self.registry.len()
            && self.members.iter().all(|p| self.registry.contains(p))
    }

    /// Empty the room, returning every session.
    pub fn drain(&mut self) -> Vec<PeerSession> {
        self.members.clear();
        self.registry.drain().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_creates_session_once() {
        let mut room = RoomState::new("alice".into());
        assert_eq!(room.admit(&"bob".into()), Admission::Admitted);
        assert_eq!(room.admit(&"bob".into()), Admission::Known);
        assert_eq!(room.registry().len(), 1);
        assert!(room.is_consistent());
    }

    #[test]
    fn local_id_is_never_admitted() {
        let mut room = RoomState::new("alice".into());
        assert_eq!(room.admit(&"alice".into()), Admission::Ignored);
        assert!(room.registry().is_empty());
        assert!(room.is_consistent());
    }

    #[test]
    fn depart_removes_both() {
        let mut room = RoomState::new("alice".into());
        room.admit(&"bob".into());
        room.admit(&"carol".into());

        assert!(room.depart(&"bob".into()).is_some());
        assert!(room.depart(&"bob".into()).is_none());
        assert!(!room.is_member(&"bob".into()));
        assert_eq!(room.members().count(), 1);
        assert!(room.is_consistent());
    }

    #[test]
    fn renew_only_applies_to_members() {
        let mut room = RoomState::new("alice".into());
        assert!(room.renew(&"bob".into()).is_none());
        assert!(room.registry().is_empty());

        room.admit(&"bob".into());
        let before = room.registry().get(&"bob".into()).unwrap().epoch();
        let old = room.renew(&"bob".into()).unwrap();
        assert_eq!(old.epoch(), before);
        assert!(room.is_consistent());
    }

    #[test]
    fn drain_empties_everything() {
        let mut room = RoomState::new("alice".into());
        room.admit(&"bob".into());
        room.admit(&"carol".into());
        assert_eq!(room.drain().len(), 2);
        assert_eq!(room.members().count(), 0);
        assert!(room.is_consistent());
    }
}
