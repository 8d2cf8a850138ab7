use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// Chat message. Immutable after insert apart from the edit pair; the
/// sender's name and role are frozen at send time so history survives
/// renames and departures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub tenant_id: ObjectId,
    pub conversation_id: ObjectId,
    pub sender_id: ObjectId,
    pub sender_name: String,
    pub sender_role: String,
    pub content: String,
    #[serde(default)]
    pub is_edited: bool,
    pub edited_at: Option<DateTime>,
    pub created_at: DateTime,
}

impl Message {
    pub const COLLECTION: &'static str = "messages";
}
