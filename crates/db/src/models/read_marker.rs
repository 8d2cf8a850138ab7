use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// One row per (message, reader). The unique index on that pair is what
/// makes marking idempotent; conversation_id is denormalized so unread
/// counts stay a single indexed count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadMarker {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub tenant_id: ObjectId,
    pub conversation_id: ObjectId,
    pub message_id: ObjectId,
    pub user_id: ObjectId,
    pub read_at: DateTime,
}

impl ReadMarker {
    pub const COLLECTION: &'static str = "read_markers";
}
