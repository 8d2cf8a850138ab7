use std::collections::HashMap;

use bson::{DateTime, doc, oid::ObjectId};
use mongodb::Database;
use serde::{Deserialize, Serialize};
use vitalis_db::models::{Attachment, Conversation, Message, Participant, User};

use super::base::{BaseDao, DaoError, DaoResult, PaginatedResult, PaginationParams};

/// Attachment descriptor as produced by the upload service and carried
/// on the wire (REST body or socket event).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInput {
    pub file_name: String,
    pub stored_name: String,
    pub content_type: String,
    pub size: i64,
    pub url: String,
}

/// Append-mostly message store. History reads are newest-first under the
/// hood and flipped to oldest→newest per page for display.
pub struct MessageDao {
    pub base: BaseDao<Message>,
    pub attachments: BaseDao<Attachment>,
    pub participants: BaseDao<Participant>,
    pub conversations: BaseDao<Conversation>,
}

impl MessageDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Message::COLLECTION),
            attachments: BaseDao::new(db, Attachment::COLLECTION),
            participants: BaseDao::new(db, Participant::COLLECTION),
            conversations: BaseDao::new(db, Conversation::COLLECTION),
        }
    }

    /// Persist a message. Membership is re-checked at write time so a
    /// sender who was just removed cannot slip one in through a stale
    /// connection. Sender name and role are denormalized from the
    /// directory entry, never from client input.
    pub async fn append(
        &self,
        tenant_id: ObjectId,
        conversation_id: ObjectId,
        sender: &User,
        content: &str,
        attachments: Vec<AttachmentInput>,
        max_length: usize,
    ) -> DaoResult<(Message, Vec<Attachment>)> {
        let sender_id = sender.id.ok_or(DaoError::NotFound)?;

        self.conversations
            .find_one(doc! { "_id": conversation_id, "tenant_id": tenant_id, "is_active": true })
            .await?
            .ok_or(DaoError::NotFound)?;

        self.participants
            .find_one(doc! {
                "conversation_id": conversation_id,
                "user_id": sender_id,
                "is_active": true,
            })
            .await?
            .ok_or_else(|| DaoError::Forbidden("Not a participant of this conversation".to_string()))?;

        let content = content.trim();
        if content.is_empty() && attachments.is_empty() {
            return Err(DaoError::Validation("Message content is required".to_string()));
        }
        if content.chars().count() > max_length {
            return Err(DaoError::Validation(format!(
                "Message exceeds {max_length} characters"
            )));
        }

        let now = DateTime::now();
        let message = Message {
            id: None,
            tenant_id,
            conversation_id,
            sender_id,
            sender_name: sender.name.clone(),
            sender_role: sender.role.clone(),
            content: content.to_string(),
            is_edited: false,
            edited_at: None,
            created_at: now,
        };

        let message_id = self.base.insert_one(&message).await?;

        if !attachments.is_empty() {
            let rows: Vec<Attachment> = attachments
                .into_iter()
                .map(|a| Attachment {
                    id: None,
                    tenant_id,
                    message_id,
                    file_name: a.file_name,
                    stored_name: a.stored_name,
                    content_type: a.content_type,
                    size: a.size,
                    url: a.url,
                    uploaded_by: sender_id,
                    created_at: now,
                })
                .collect();

            if let Err(e) = self.attachments.insert_many(&rows).await {
                // A message whose attachments vanished is worse than no
                // message; undo the append.
                let _ = self.base.hard_delete(doc! { "_id": message_id }).await;
                return Err(e);
            }
        }

        self.conversations
            .update_by_id(conversation_id, doc! { "$set": { "updated_at": now } })
            .await?;

        let stored = self.base.find_by_id(message_id).await?;
        let stored_attachments = self
            .attachments
            .find_many(doc! { "message_id": message_id }, Some(doc! { "created_at": 1 }))
            .await?;
        Ok((stored, stored_attachments))
    }

    /// One history page. Page 1 is the newest slice; items within a page
    /// run oldest→newest so clients can render top-down.
    pub async fn find_page(
        &self,
        conversation_id: ObjectId,
        user_id: ObjectId,
        params: &PaginationParams,
    ) -> DaoResult<PaginatedResult<Message>> {
        self.require_participant(conversation_id, user_id).await?;

        let mut page = self
            .base
            .find_paginated(
                doc! { "conversation_id": conversation_id },
                Some(doc! { "created_at": -1, "_id": -1 }),
                params,
            )
            .await?;
        page.items.reverse();
        Ok(page)
    }

    pub async fn find_latest(
        &self,
        conversation_id: ObjectId,
        limit: i64,
    ) -> DaoResult<Vec<Message>> {
        let params = PaginationParams { page: 1, limit: limit.max(1) };
        let mut page = self
            .base
            .find_paginated(
                doc! { "conversation_id": conversation_id },
                Some(doc! { "created_at": -1, "_id": -1 }),
                &params,
            )
            .await?;
        page.items.reverse();
        Ok(page.items)
    }

    pub async fn attachments_for(
        &self,
        message_ids: &[ObjectId],
    ) -> DaoResult<HashMap<ObjectId, Vec<Attachment>>> {
        let mut map: HashMap<ObjectId, Vec<Attachment>> = HashMap::new();
        if message_ids.is_empty() {
            return Ok(map);
        }

        let ids: Vec<bson::Bson> = message_ids.iter().map(|id| bson::Bson::ObjectId(*id)).collect();
        let rows = self
            .attachments
            .find_many(
                doc! { "message_id": { "$in": ids } },
                Some(doc! { "created_at": 1 }),
            )
            .await?;

        for row in rows {
            map.entry(row.message_id).or_default().push(row);
        }
        Ok(map)
    }

    /// Newest message per conversation, for chat-list previews.
    pub async fn last_messages(
        &self,
        conversation_ids: &[ObjectId],
    ) -> DaoResult<HashMap<ObjectId, Message>> {
        let mut map = HashMap::new();
        for conversation_id in conversation_ids {
            let latest = self
                .base
                .find_many_limited(
                    doc! { "conversation_id": conversation_id },
                    doc! { "created_at": -1, "_id": -1 },
                    1,
                )
                .await?;
            if let Some(message) = latest.into_iter().next() {
                map.insert(*conversation_id, message);
            }
        }
        Ok(map)
    }

    /// Sender-only correction. The record keeps its place in history;
    /// only the text and the edited pair change.
    pub async fn edit(
        &self,
        tenant_id: ObjectId,
        conversation_id: ObjectId,
        message_id: ObjectId,
        editor_id: ObjectId,
        content: &str,
        max_length: usize,
    ) -> DaoResult<Message> {
        let message = self
            .base
            .find_one(doc! { "_id": message_id, "conversation_id": conversation_id, "tenant_id": tenant_id })
            .await?
            .ok_or(DaoError::NotFound)?;

        if message.sender_id != editor_id {
            return Err(DaoError::Forbidden(
                "Only the sender can edit a message".to_string(),
            ));
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(DaoError::Validation("Message content is required".to_string()));
        }
        if content.chars().count() > max_length {
            return Err(DaoError::Validation(format!(
                "Message exceeds {max_length} characters"
            )));
        }

        self.base
            .update_by_id(
                message_id,
                doc! { "$set": { "content": content, "is_edited": true, "edited_at": DateTime::now() } },
            )
            .await?;

        self.base.find_by_id(message_id).await
    }

    async fn require_participant(
        &self,
        conversation_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<Participant> {
        self.participants
            .find_one(doc! {
                "conversation_id": conversation_id,
                "user_id": user_id,
                "is_active": true,
            })
            .await?
            .ok_or_else(|| DaoError::Forbidden("Not a participant of this conversation".to_string()))
    }
}
