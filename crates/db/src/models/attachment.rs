use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// File metadata bound to a message. The bytes live in the platform's
/// upload service; we only keep the descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub tenant_id: ObjectId,
    pub message_id: ObjectId,
    pub file_name: String,
    pub stored_name: String,
    pub content_type: String,
    pub size: i64,
    pub url: String,
    pub uploaded_by: ObjectId,
    pub created_at: DateTime,
}

impl Attachment {
    pub const COLLECTION: &'static str = "attachments";
}
