//! Session registry — which room each joined connection belongs to

use std::collections::HashMap;
use tracing::debug;

use crate::protocol::ConnectionId;

/// A connection's membership in a room, recorded while it is joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub connection_id: ConnectionId,
    pub user_name: String,
    pub room_name: String,
}

impl Membership {
    pub fn new(
        connection_id: ConnectionId,
        user_name: impl Into<String>,
        room_name: impl Into<String>,
    ) -> Self {
        Self {
            connection_id,
            user_name: user_name.into(),
            room_name: room_name.into(),
        }
    }
}

/// Maps live connection identities to their current membership.
///
/// Holds at most one entry per connection; writing a second membership for the
/// same connection replaces the first.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: HashMap<ConnectionId, Membership>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry keyed by `membership.connection_id`.
    /// Returns the membership it replaced, if any.
    pub fn put(&mut self, membership: Membership) -> Option<Membership> {
        debug!(
            "Registering {} as '{}' in '{}'",
            membership.connection_id, membership.user_name, membership.room_name
        );
        self.entries.insert(membership.connection_id, membership)
    }

    pub fn get(&self, connection_id: &ConnectionId) -> Option<&Membership> {
        self.entries.get(connection_id)
    }

    /// Remove the entry for a connection. Absent entries are not an error.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Membership> {
        self.entries.remove(connection_id)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.entries.contains_key(connection_id)
    }

    /// Number of joined connections
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut registry = SessionRegistry::new();
        let id = ConnectionId::new();
        assert!(registry.put(Membership::new(id, "Alice", "lobby")).is_none());

        let membership = registry.get(&id).unwrap();
        assert_eq!(membership.user_name, "Alice");
        assert_eq!(membership.room_name, "lobby");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let registry = SessionRegistry::new();
        assert!(registry.get(&ConnectionId::new()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_put_replaces_prior_membership() {
        let mut registry = SessionRegistry::new();
        let id = ConnectionId::new();
        registry.put(Membership::new(id, "Alice", "lobby"));

        let replaced = registry.put(Membership::new(id, "Alice", "games")).unwrap();
        assert_eq!(replaced.room_name, "lobby");
        assert_eq!(registry.get(&id).unwrap().room_name, "games");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut registry = SessionRegistry::new();
        let id = ConnectionId::new();
        registry.put(Membership::new(id, "Alice", "lobby"));

        let removed = registry.remove(&id).unwrap();
        assert_eq!(removed.user_name, "Alice");
        assert!(registry.get(&id).is_none());
        assert!(!registry.contains(&id));
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut registry = SessionRegistry::new();
        let kept = ConnectionId::new();
        registry.put(Membership::new(kept, "Alice", "lobby"));

        assert!(registry.remove(&ConnectionId::new()).is_none());
        assert_eq!(registry.len(), 1);
    }
}
