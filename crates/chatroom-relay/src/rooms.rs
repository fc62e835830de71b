//! Room channels — fan out frames to the connections subscribed to a room

use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::{ConnectionId, ServerFrame};

/// Outbound queue of a single connection; drained by that connection's writer task
pub type Outbox = mpsc::UnboundedSender<ServerFrame>;

/// Delivery sets keyed by room name, plus each live connection's outbox.
///
/// Rooms are never created explicitly: a room exists while it has at least
/// one subscriber and disappears with its last one.
#[derive(Debug, Default)]
pub struct RoomChannels {
    outboxes: HashMap<ConnectionId, Outbox>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RoomChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbox. Returns `false` if it was already attached.
    pub fn attach(&mut self, connection_id: ConnectionId, outbox: Outbox) -> bool {
        if self.outboxes.contains_key(&connection_id) {
            return false;
        }
        self.outboxes.insert(connection_id, outbox);
        true
    }

    pub fn is_attached(&self, connection_id: &ConnectionId) -> bool {
        self.outboxes.contains_key(connection_id)
    }

    /// Release a connection's outbox. Callers unsubscribe it from its room first.
    pub fn detach(&mut self, connection_id: &ConnectionId) -> Option<Outbox> {
        self.outboxes.remove(connection_id)
    }

    /// Add a connection to a room's delivery set. Returns `false` if it was already a member.
    pub fn subscribe(&mut self, connection_id: ConnectionId, room_name: &str) -> bool {
        self.rooms
            .entry(room_name.to_string())
            .or_default()
            .insert(connection_id)
    }

    /// Remove a connection from a room's delivery set. Returns `false` if it was not a member.
    pub fn unsubscribe(&mut self, connection_id: &ConnectionId, room_name: &str) -> bool {
        let Some(members) = self.rooms.get_mut(room_name) else {
            return false;
        };
        let removed = members.remove(connection_id);
        if members.is_empty() {
            self.rooms.remove(room_name);
        }
        removed
    }

    /// Deliver a frame to one connection. Returns `false` if it has no open outbox.
    pub fn send_to(&self, connection_id: &ConnectionId, frame: ServerFrame) -> bool {
        match self.outboxes.get(connection_id) {
            Some(outbox) => outbox.send(frame).is_ok(),
            None => false,
        }
    }

    /// Deliver a frame to every member of `room_name` except `excluding`.
    ///
    /// Delivery is at-most-once: closed outboxes are skipped, never retried.
    /// Returns the number of connections the frame was handed to.
    pub fn broadcast(
        &self,
        room_name: &str,
        frame: &ServerFrame,
        excluding: Option<&ConnectionId>,
    ) -> usize {
        let Some(members) = self.rooms.get(room_name) else {
            return 0;
        };

        let mut delivered = 0;
        for connection_id in members {
            if excluding == Some(connection_id) {
                continue;
            }
            if let Some(outbox) = self.outboxes.get(connection_id) {
                if outbox.send(frame.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }

        debug!(
            "Broadcast '{}' to {} of {} members in '{}'",
            frame.event(),
            delivered,
            members.len(),
            room_name
        );
        delivered
    }

    /// Current members of a room, in no particular order
    pub fn members(&self, room_name: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_name)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, room_name: &str, connection_id: &ConnectionId) -> bool {
        self.rooms
            .get(room_name)
            .is_some_and(|members| members.contains(connection_id))
    }

    /// Number of non-empty rooms
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of attached connections, joined or not
    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }
}
