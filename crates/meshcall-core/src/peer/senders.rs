use crate::error::AttachmentConflict;
use crate::media::{MediaTrack, TrackKind};
use crate::transport::SenderId;

use super::state::SenderAttachState;

/// An outgoing sender bound on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSender {
    pub sender: SenderId,
    pub kind: TrackKind,
    /// Track currently carried; `None` after a replace with no track.
    pub track_id: Option<String>,
}

/// The senders of one connection, at most one per track kind.
#[derive(Debug, Default)]
pub struct SenderSet {
    state: SenderAttachState,
    senders: Vec<LocalSender>,
}

impl SenderSet {
    pub fn state(&self) -> SenderAttachState {
        self.state
    }

    /// Tracks from `tracks` whose kind has no sender yet, first per kind.
    pub fn missing(&self, tracks: &[MediaTrack]) -> Vec<MediaTrack> {
        let mut out: Vec<MediaTrack> = Vec::new();
        for track in tracks {
            let kind = track.kind();
            if self.sender_for(kind).is_none() && !out.iter().any(|t| t.kind() == kind) {
                out.push(track.clone());
            }
        }
        out
    }

    /// Mark `tracks` as being attached.
    ///
    /// Fails if an attach is already in flight or any track's kind is
    /// already bound; the transport is never asked to add a duplicate.
    pub fn begin(&mut self, tracks: &[MediaTrack]) -> Result<(), AttachmentConflict> {
        if self.state == SenderAttachState::Attaching {
            return Err(AttachmentConflict { state: self.state });
        }
        let mut seen: Vec<TrackKind> = Vec::with_capacity(tracks.len());
        for track in tracks {
            let kind = track.kind();
            if self.sender_for(kind).is_some() || seen.contains(&kind) {
                return Err(AttachmentConflict { state: self.state });
            }
            seen.push(kind);
        }
        self.state = SenderAttachState::Attaching;
        Ok(())
    }

    pub fn complete(&mut self, attached: Vec<LocalSender>) {
        self.senders.extend(attached);
        self.state = self.settled_state();
    }

    pub fn abort(&mut self) {
        self.state = self.settled_state();
    }

    pub fn sender_for(&self, kind: TrackKind) -> Option<&LocalSender> {
        self.senders.iter().find(|s| s.kind == kind)
    }

    /// Record the track now carried by the sender of `kind`.
    pub fn set_track(&mut self, kind: TrackKind, track_id: Option<String>) {
        if let Some(sender) = self.senders.iter_mut().find(|s| s.kind == kind) {
            sender.track_id = track_id;
        }
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalSender> {
        self.senders.iter()
    }

    fn settled_state(&self) -> SenderAttachState {
        if self.senders.is_empty() {
            SenderAttachState::Empty
        } else {
            SenderAttachState::Attached
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TrackSource;

    fn sender(id: u64, track: &MediaTrack) -> LocalSender {
        LocalSender {
            sender: SenderId(id),
            kind: track.kind(),
            track_id: Some(track.id().to_string()),
        }
    }

    #[test]
    fn attach_lifecycle() {
        let mic = MediaTrack::new(TrackSource::Microphone, "mic");
        let cam = MediaTrack::new(TrackSource::Camera, "cam");
        let mut set = SenderSet::default();
        assert_eq!(set.state(), SenderAttachState::Empty);

        set.begin(&[mic.clone(), cam.clone()]).unwrap();
        assert_eq!(set.state(), SenderAttachState::Attaching);

        set.complete(vec![sender(1, &mic), sender(2, &cam)]);
        assert_eq!(set.state(), SenderAttachState::Attached);
        assert_eq!(set.len(), 2);
        assert_eq!(set.sender_for(TrackKind::Video).unwrap().sender, SenderId(2));
    }

    #[test]
    fn begin_while_attaching_conflicts() {
        let mic = MediaTrack::new(TrackSource::Microphone, "mic");
        let mut set = SenderSet::default();
        set.begin(&[mic.clone()]).unwrap();
        let err = set.begin(&[mic]).unwrap_err();
        assert_eq!(err.state, SenderAttachState::Attaching);
    }

    #[test]
    fn attaching_bound_kind_conflicts() {
        let mic = MediaTrack::new(TrackSource::Microphone, "mic");
        let mut set = SenderSet::default();
        set.begin(&[mic.clone()]).unwrap();
        set.complete(vec![sender(1, &mic)]);

        let err = set.begin(&[mic]).unwrap_err();
        assert_eq!(err.state, SenderAttachState::Attached);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn missing_filters_bound_kinds() {
        let mic = MediaTrack::new(TrackSource::Microphone, "mic");
        let cam = MediaTrack::new(TrackSource::Camera, "cam");
        let screen = MediaTrack::new(TrackSource::Screen, "screen");
        let mut set = SenderSet::default();
        set.begin(&[mic.clone()]).unwrap();
        set.complete(vec![sender(1, &mic)]);

        let missing = set.missing(&[mic, cam.clone(), screen]);
        assert_eq!(missing.len(), 1);
        assert!(missing[0].same_track(&cam));
    }

    #[test]
    fn abort_restores_settled_state() {
        let mic = MediaTrack::new(TrackSource::Microphone, "mic");
        let mut set = SenderSet::default();
        set.begin(&[mic]).unwrap();
        set.abort();
        assert_eq!(set.state(), SenderAttachState::Empty);
    }
}
