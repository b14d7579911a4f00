use std::collections::BTreeSet;
use std::sync::Mutex;

use socketioxide::SocketIo;

/// Room-based broadcast transport. Rooms are joined at connection handshake;
/// the messenger only lists them and emits into them.
pub trait Transport: Send + Sync {
    /// Keys of every room that currently has at least one connection.
    fn active_rooms(&self) -> Vec<String>;

    /// Emit to every connection in `room`. Returns false when the room has no
    /// connection or the emit failed; nothing is queued for absent rooms.
    fn emit_to_room(&self, room: &str, event: &str, payload: &serde_json::Value) -> bool;
}

impl Transport for SocketIo {
    fn active_rooms(&self) -> Vec<String> {
        match self.rooms() {
            Ok(rooms) => rooms.into_iter().map(|room| room.into_owned()).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to list socket rooms");
                Vec::new()
            }
        }
    }

    fn emit_to_room(&self, room: &str, event: &str, payload: &serde_json::Value) -> bool {
        // Broadcasting into an empty room succeeds silently.
        if !self.active_rooms().iter().any(|active| active == room) {
            return false;
        }
        match self.to(room.to_string()).emit(event.to_string(), payload) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, room = %room, event = %event, "room emit failed");
                false
            }
        }
    }
}

/// An emission that reached at least one connection of an in-process room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomEmission {
    pub room: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Transport kept entirely in memory: room membership is set explicitly and
/// emissions into active rooms are recorded. Emissions into rooms nobody has
/// joined are dropped, like the Socket.IO adapter does.
#[derive(Default)]
pub struct InProcessTransport {
    state: Mutex<InProcessState>,
}

#[derive(Default)]
struct InProcessState {
    rooms: BTreeSet<String>,
    delivered: Vec<RoomEmission>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, room: impl Into<String>) {
        self.lock().rooms.insert(room.into());
    }

    pub fn leave(&self, room: &str) {
        self.lock().rooms.remove(room);
    }

    pub fn delivered(&self) -> Vec<RoomEmission> {
        self.lock().delivered.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, InProcessState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Transport for InProcessTransport {
    fn active_rooms(&self) -> Vec<String> {
        self.lock().rooms.iter().cloned().collect()
    }

    fn emit_to_room(&self, room: &str, event: &str, payload: &serde_json::Value) -> bool {
        let mut state = self.lock();
        if !state.rooms.contains(room) {
            tracing::debug!(room = %room, event = %event, "no connection in room, emission dropped");
            return false;
        }
        state.delivered.push(RoomEmission {
            room: room.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        });
        true
    }
}
