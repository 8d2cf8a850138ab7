use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub tenant_id: ObjectId,
    pub conversation_id: ObjectId,
    pub user_id: ObjectId,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_active: bool,
    pub joined_at: DateTime,
    pub updated_at: DateTime,
}

impl Participant {
    pub const COLLECTION: &'static str = "participants";
}
