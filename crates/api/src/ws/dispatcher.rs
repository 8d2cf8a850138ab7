use std::collections::HashSet;

use bson::oid::ObjectId;
use tracing::{debug, warn};

use super::events::ServerEvent;
use super::rooms::{RoomId, RoomRegistry};
use super::storage::WsStorage;

/// Sends an event to every connection of the specified users, whether or
/// not those connections have joined a room yet. Used for chat-list
/// updates that must reach members who never opened the conversation.
pub fn broadcast_users(ws_storage: &WsStorage, user_ids: &[ObjectId], event: &ServerEvent) {
    for user_id in user_ids {
        send_to_user(ws_storage, user_id, event);
    }
}

/// Sends an event to all of one user's connections.
pub fn send_to_user(ws_storage: &WsStorage, user_id: &ObjectId, event: &ServerEvent) {
    for sender in ws_storage.get_senders(user_id) {
        if sender.send(event.clone()).is_err() {
            warn!(?user_id, "Failed to queue WS event; connection is closing");
        } else {
            debug!(?user_id, "WS event queued");
        }
    }
}

/// Sends an event to a specific connection by connection_id. Used for
/// replies that should target a single tab/device.
pub fn send_to_connection(ws_storage: &WsStorage, connection_id: &str, event: &ServerEvent) {
    if let Some(sender) = ws_storage.get_sender_by_connection(connection_id) {
        if sender.send(event.clone()).is_err() {
            warn!(%connection_id, "Failed to queue WS event; connection is closing");
        }
    }
}

/// Sends an event to every connection currently in the room. `exclude`
/// skips the originating connection for events that must not echo.
pub fn broadcast_room(
    ws_storage: &WsStorage,
    registry: &RoomRegistry,
    room: RoomId,
    event: &ServerEvent,
    exclude: Option<&str>,
) {
    for connection_id in registry.connections(room) {
        if exclude.is_some_and(|skip| skip == connection_id) {
            continue;
        }
        send_to_connection(ws_storage, &connection_id, event);
    }
}

/// Room-union fan-out. A connection sitting in more than one of the
/// rooms still gets a single copy.
pub fn broadcast_rooms(
    ws_storage: &WsStorage,
    registry: &RoomRegistry,
    rooms: &[RoomId],
    event: &ServerEvent,
    exclude: Option<&str>,
) {
    let mut seen: HashSet<String> = HashSet::new();
    for room in rooms {
        for connection_id in registry.connections(*room) {
            if exclude.is_some_and(|skip| skip == connection_id) {
                continue;
            }
            if seen.insert(connection_id.clone()) {
                send_to_connection(ws_storage, &connection_id, event);
            }
        }
    }
}
