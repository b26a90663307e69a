//! Room store: maps room ids to the outbound channels of their members.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};

use meshcall_common::{ParticipantId, RoomId, ServerMessage};

/// Outbound queue of one connected client, carrying encoded frames.
pub type ClientTx = mpsc::Sender<String>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("room is full ({0} participants)")]
    RoomFull(usize),

    #[error("participant {0} already in room")]
    DuplicateParticipant(ParticipantId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForwardError {
    #[error("{0} is not in the room")]
    NotMember(ParticipantId),

    #[error("{0} is not draining its queue; frame dropped")]
    Backlogged(ParticipantId),

    #[error("{0} has disconnected")]
    Gone(ParticipantId),
}

struct Room {
    members: HashMap<ParticipantId, ClientTx>,
    /// Set while the room has no members.
    empty_since: Option<Instant>,
}

/// Thread-safe room store.
#[derive(Clone)]
pub struct RoomStore {
    rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
    max_room_size: usize,
}

impl RoomStore {
    pub fn new(max_room_size: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            max_room_size,
        }
    }

    /// Add a participant. Returns the ids already in the room.
    pub async fn join(
        &self,
        room_id: &RoomId,
        participant: &ParticipantId,
        tx: ClientTx,
    ) -> Result<Vec<ParticipantId>, JoinError> {
        let mut map = self.rooms.write().await;
        let room = map.entry(room_id.clone()).or_insert_with(|| Room {
            members: HashMap::new(),
            empty_since: None,
        });

        if let Some(existing) = room.members.get(participant) {
            // A closed queue means the old connection is on its way out.
            if !existing.is_closed() {
                return Err(JoinError::DuplicateParticipant(participant.clone()));
            }
        } else if room.members.len() >= self.max_room_size {
            return Err(JoinError::RoomFull(self.max_room_size));
        }

        let mut existing: Vec<ParticipantId> = room
            .members
            .keys()
            .filter(|id| *id != participant)
            .cloned()
            .collect();
        existing.sort();

        room.members.insert(participant.clone(), tx);
        room.empty_since = None;
        Ok(existing)
    }

    /// Remove a participant registered with `tx`. Returns false if it was
    /// not in the room or has since been replaced by another connection.
    pub async fn leave(&self, room_id: &RoomId, participant: &ParticipantId, tx: &ClientTx) -> bool {
        let mut map = self.rooms.write().await;
        let Some(room) = map.get_mut(room_id) else {
            return false;
        };
        let owned = room
            .members
            .get(participant)
            .is_some_and(|current| current.same_channel(tx));
        if owned {
            room.members.remove(participant);
        }
        if room.members.is_empty() && room.empty_since.is_none() {
            room.empty_since = Some(Instant::now());
        }
        owned
    }

    /// Queue `frame` for one member without waiting on its queue.
    pub async fn forward(
        &self,
        room_id: &RoomId,
        target: &ParticipantId,
        frame: String,
    ) -> Result<(), ForwardError> {
        let tx = {
            let map = self.rooms.read().await;
            map.get(room_id)
                .and_then(|room| room.members.get(target))
                .cloned()
                .ok_or_else(|| ForwardError::NotMember(target.clone()))?
        };
        tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => ForwardError::Backlogged(target.clone()),
            TrySendError::Closed(_) => ForwardError::Gone(target.clone()),
        })
    }

    /// Queue `msg` for every member except `except`.
    pub async fn broadcast(&self, room_id: &RoomId, except: &ParticipantId, msg: &ServerMessage) {
        let Ok(json) = serde_json::to_string(msg) else {
            return;
        };
        let map = self.rooms.read().await;
        let Some(room) = map.get(room_id) else {
            return;
        };
        for (id, tx) in room.members.iter().filter(|(id, _)| *id != except) {
            if let Err(e) = tx.try_send(json.clone()) {
                tracing::warn!(room = %room_id, member = %id, error = %e, "Dropped broadcast frame");
            }
        }
    }

    /// Drop rooms that have been empty for longer than `max_age`.
    pub async fn reap_stale(&self, max_age: Duration) {
        let mut map = self.rooms.write().await;
        let now = Instant::now();
        map.retain(|id, room| {
            let stale = room
                .empty_since
                .is_some_and(|since| now.duration_since(since) > max_age);
            if stale {
                tracing::info!(room = %id, "Reaping empty room");
            }
            !stale
        });
    }

    /// Number of tracked rooms.
    pub async fn count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn members(&self, room_id: &RoomId) -> usize {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map_or(0, |room| room.members.len())
    }
}
