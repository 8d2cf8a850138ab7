use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// Directory entry replicated from the main platform. The chat service
/// reads these, it never writes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub tenant_id: ObjectId,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl User {
    pub const COLLECTION: &'static str = "users";
}
