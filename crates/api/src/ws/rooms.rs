use std::collections::HashSet;

use bson::oid::ObjectId;
use dashmap::DashMap;

/// Broadcast scope a connection can join. Tenant rooms carry presence
/// and tenant-wide events, conversation rooms carry per-chat traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomId {
    Tenant(ObjectId),
    Conversation(ObjectId),
}

/// Connection-id membership per room, with a reverse index so a closing
/// connection can leave everything in one call. Reads return snapshots,
/// so fan-out never holds a shard lock across sends.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, HashSet<String>>,
    /// connection_id -> rooms that connection has joined
    memberships: DashMap<String, HashSet<RoomId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    pub fn join(&self, room: RoomId, connection_id: &str) {
        self.rooms
            .entry(room)
            .or_default()
            .insert(connection_id.to_string());
        self.memberships
            .entry(connection_id.to_string())
            .or_default()
            .insert(room);
    }

    pub fn leave(&self, room: RoomId, connection_id: &str) {
        self.remove_from_room(room, connection_id);
        if let Some(mut rooms) = self.memberships.get_mut(connection_id) {
            rooms.remove(&room);
            if rooms.is_empty() {
                drop(rooms);
                self.memberships.remove(connection_id);
            }
        }
    }

    /// Drops the connection from every room it joined. Called on
    /// disconnect.
    pub fn leave_all(&self, connection_id: &str) {
        if let Some((_, rooms)) = self.memberships.remove(connection_id) {
            for room in rooms {
                self.remove_from_room(room, connection_id);
            }
        }
    }

    pub fn connections(&self, room: RoomId) -> Vec<String> {
        self.rooms
            .get(&room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, room: RoomId, connection_id: &str) -> bool {
        self.rooms
            .get(&room)
            .is_some_and(|members| members.contains(connection_id))
    }

    fn remove_from_room(&self, room: RoomId, connection_id: &str) {
        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.remove(connection_id);
            if members.is_empty() {
                drop(members);
                self.rooms.remove(&room);
            }
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
