//! Relay protocol handler — drives each connection through
//! Unjoined → Joined → Gone and fans events out to rooms.
//!
//! The handler is synchronous and owns all relay state. It is driven by a
//! single task (see [`crate::service`]), so each event runs to completion
//! before the next one starts and no locking is needed.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::protocol::{ChatMessage, ConnectionId, MessageType, ServerFrame};
use crate::rooms::{Outbox, RoomChannels};
use crate::session::{Membership, SessionRegistry};

/// Observable lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected but not in any room
    Unjoined,
    /// Member of exactly one room
    Joined,
    /// Disconnected, or never connected
    Gone,
}

/// Input events, one per connection lifecycle step
#[derive(Debug)]
pub enum RelayEvent {
    Connect {
        connection_id: ConnectionId,
        outbox: Outbox,
    },
    Join {
        connection_id: ConnectionId,
        user_name: String,
        room_name: String,
    },
    Message {
        connection_id: ConnectionId,
        content: String,
        message_type: MessageType,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
}

/// Why an event was dropped. Never sent to clients.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("connection {0} is already connected")]
    AlreadyConnected(ConnectionId),
    #[error("connection {0} is not connected")]
    UnknownConnection(ConnectionId),
    #[error("connection {0} has not joined a room")]
    NotJoined(ConnectionId),
}

/// Point-in-time counters for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub connected_clients: usize,
    pub joined_members: usize,
    pub rooms: usize,
}

/// Owns the session registry and room channels
#[derive(Debug, Default)]
pub struct Relay {
    registry: SessionRegistry,
    rooms: RoomChannels,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Dropped events are logged and otherwise ignored.
    pub fn handle(&mut self, event: RelayEvent) {
        let result = match event {
            RelayEvent::Connect {
                connection_id,
                outbox,
            } => self.connect(connection_id, outbox),
            RelayEvent::Join {
                connection_id,
                user_name,
                room_name,
            } => self.join(connection_id, user_name, room_name).map(|_| ()),
            RelayEvent::Message {
                connection_id,
                content,
                message_type,
            } => self
                .message(connection_id, content, message_type)
                .map(|_| ()),
            RelayEvent::Disconnect { connection_id } => {
                self.disconnect(connection_id).map(|_| ())
            }
        };

        if let Err(e) = result {
            debug!("Dropped event: {}", e);
        }
    }

    pub fn state(&self, connection_id: &ConnectionId) -> ConnectionState {
        if self.registry.contains(connection_id) {
            ConnectionState::Joined
        } else if self.rooms.is_attached(connection_id) {
            ConnectionState::Unjoined
        } else {
            ConnectionState::Gone
        }
    }

    /// Start tracking a connection and tell it its identity.
    pub fn connect(
        &mut self,
        connection_id: ConnectionId,
        outbox: Outbox,
    ) -> Result<(), RelayError> {
        if !self.rooms.attach(connection_id, outbox) {
            return Err(RelayError::AlreadyConnected(connection_id));
        }
        self.rooms
            .send_to(&connection_id, ServerFrame::AssignedIdentity(connection_id));
        debug!("Connection {} attached", connection_id);
        Ok(())
    }

    /// Put a connection into `room_name`, leaving any room it was in.
    ///
    /// The join notice goes to the room's other members only. Returns how many
    /// members were notified.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        user_name: impl Into<String>,
        room_name: impl Into<String>,
    ) -> Result<usize, RelayError> {
        if self.state(&connection_id) == ConnectionState::Gone {
            return Err(RelayError::UnknownConnection(connection_id));
        }
        let membership = Membership::new(connection_id, user_name, room_name);
        if let Some(previous) = self.registry.put(membership.clone()) {
            if previous.room_name != membership.room_name {
                self.rooms.unsubscribe(&connection_id, &previous.room_name);
            }
        }
        self.rooms.subscribe(connection_id, &membership.room_name);

        info!(
            "{} ({}) joined '{}'",
            membership.user_name, connection_id, membership.room_name
        );
        let notice = ServerFrame::joined(&membership.user_name, &membership.room_name);
        Ok(self
            .rooms
            .broadcast(&membership.room_name, &notice, Some(&connection_id)))
    }

    /// Relay a chat message to every member of the sender's room, sender included.
    /// Returns how many members received it.
    pub fn message(
        &mut self,
        connection_id: ConnectionId,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> Result<usize, RelayError> {
        let membership = match self.state(&connection_id) {
            ConnectionState::Gone => return Err(RelayError::UnknownConnection(connection_id)),
            ConnectionState::Unjoined => return Err(RelayError::NotJoined(connection_id)),
            ConnectionState::Joined => self
                .registry
                .get(&connection_id)
                .ok_or(RelayError::NotJoined(connection_id))?,
        };

        let frame = ServerFrame::Chat(ChatMessage {
            sender_id: connection_id,
            sender_name: membership.user_name.clone(),
            room_name: membership.room_name.clone(),
            content: content.into(),
            message_type,
            sent_at: Utc::now(),
        });
        Ok(self.rooms.broadcast(&membership.room_name, &frame, None))
    }

    /// Forget a connection. Joined connections announce their departure to the
    /// rest of their room first. Returns the membership that was removed, if any.
    pub fn disconnect(
        &mut self,
        connection_id: ConnectionId,
    ) -> Result<Option<Membership>, RelayError> {
        if self.state(&connection_id) == ConnectionState::Gone {
            return Err(RelayError::UnknownConnection(connection_id));
        }

        let membership = self.registry.remove(&connection_id);
        if let Some(membership) = &membership {
            let notice = ServerFrame::left(&membership.user_name, &membership.room_name);
            self.rooms
                .broadcast(&membership.room_name, &notice, Some(&connection_id));
            self.rooms.unsubscribe(&connection_id, &membership.room_name);
            info!(
                "{} ({}) left '{}'",
                membership.user_name, connection_id, membership.room_name
            );
        }
        self.rooms.detach(&connection_id);
        debug!("Connection {} detached", connection_id);
        Ok(membership)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomChannels {
        &self.rooms
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connected_clients: self.rooms.connection_count(),
            joined_members: self.registry.len(),
            rooms: self.rooms.room_count(),
        }
    }
}
