use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub tenant_id: ObjectId,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_by: ObjectId,
    /// Symmetric pair key for PRIVATE conversations, `None` otherwise.
    /// Backed by a unique sparse index so a user pair resolves to exactly
    /// one private conversation per tenant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_key: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: DateTime,
    /// Bumped on metadata changes and on every appended message, so the
    /// chat list sorts on a single field.
    pub updated_at: DateTime,
}

impl Conversation {
    pub const COLLECTION: &'static str = "conversations";

    /// Order-independent key identifying a private pair within a tenant.
    pub fn direct_key(tenant_id: ObjectId, a: ObjectId, b: ObjectId) -> String {
        let (lo, hi) = if a.bytes() <= b.bytes() { (a, b) } else { (b, a) };
        format!("{}:{}:{}", tenant_id.to_hex(), lo.to_hex(), hi.to_hex())
    }

    /// The other member of a private pair, recovered from the key.
    /// `None` for non-private conversations or when `user_id` is not in
    /// the pair.
    pub fn counterpart_of(&self, user_id: ObjectId) -> Option<ObjectId> {
        let key = self.direct_key.as_deref()?;
        let mut ids = key
            .split(':')
            .skip(1)
            .filter_map(|part| ObjectId::parse_str(part).ok());
        let lo = ids.next()?;
        let hi = ids.next()?;
        if lo == user_id {
            Some(hi)
        } else if hi == user_id {
            Some(lo)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationKind {
    General,
    Private,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::General => "GENERAL",
            ConversationKind::Private => "PRIVATE",
            ConversationKind::Group => "GROUP",
        }
    }
}
