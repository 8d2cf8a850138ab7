use std::collections::HashMap;

use bson::{DateTime, doc, oid::ObjectId};
use mongodb::Database;
use vitalis_db::models::{Message, ReadMarker};

use super::base::{BaseDao, DaoError, DaoResult};

/// Per-user read state. One marker row per (message, reader); the unique
/// index absorbs replays, so marking is idempotent by construction.
pub struct ReadMarkerDao {
    pub base: BaseDao<ReadMarker>,
    pub messages: BaseDao<Message>,
}

impl ReadMarkerDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, ReadMarker::COLLECTION),
            messages: BaseDao::new(db, Message::COLLECTION),
        }
    }

    /// Mark everything up to `upto_message_id` (default: the newest
    /// message) as read. Own messages never need markers. Returns how
    /// many markers were actually new.
    pub async fn mark_read(
        &self,
        tenant_id: ObjectId,
        conversation_id: ObjectId,
        user_id: ObjectId,
        upto_message_id: Option<ObjectId>,
    ) -> DaoResult<u64> {
        let upto = match upto_message_id {
            Some(message_id) => self
                .messages
                .find_one(doc! { "_id": message_id, "conversation_id": conversation_id })
                .await?
                .ok_or(DaoError::NotFound)?,
            None => {
                let latest = self
                    .messages
                    .find_many_limited(
                        doc! { "conversation_id": conversation_id },
                        doc! { "created_at": -1, "_id": -1 },
                        1,
                    )
                    .await?;
                match latest.into_iter().next() {
                    Some(message) => message,
                    None => return Ok(0),
                }
            }
        };
        let upto_id = upto.id.unwrap();

        // Everything by other authors at or before the target in
        // (created_at, _id) order.
        let candidates = self
            .messages
            .find_many(
                doc! {
                    "conversation_id": conversation_id,
                    "sender_id": { "$ne": user_id },
                    "$or": [
                        { "created_at": { "$lt": upto.created_at } },
                        { "created_at": upto.created_at, "_id": { "$lte": upto_id } },
                    ],
                },
                None,
            )
            .await?;

        let now = DateTime::now();
        let mut inserted = 0u64;
        for message in candidates {
            let marker = ReadMarker {
                id: None,
                tenant_id,
                conversation_id,
                message_id: message.id.unwrap(),
                user_id,
                read_at: now,
            };
            match self.base.insert_one(&marker).await {
                Ok(_) => inserted += 1,
                // Already read; replays are expected.
                Err(DaoError::DuplicateKey(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(inserted)
    }

    /// Messages by other authors minus this user's markers.
    pub async fn unread_count(
        &self,
        conversation_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<u64> {
        let from_others = self
            .messages
            .count(doc! { "conversation_id": conversation_id, "sender_id": { "$ne": user_id } })
            .await?;
        let read = self
            .base
            .count(doc! { "conversation_id": conversation_id, "user_id": user_id })
            .await?;
        Ok(from_others.saturating_sub(read))
    }

    pub async fn unread_counts(
        &self,
        conversation_ids: &[ObjectId],
        user_id: ObjectId,
    ) -> DaoResult<HashMap<ObjectId, u64>> {
        let mut map = HashMap::new();
        for conversation_id in conversation_ids {
            let count = self.unread_count(*conversation_id, user_id).await?;
            map.insert(*conversation_id, count);
        }
        Ok(map)
    }
}
