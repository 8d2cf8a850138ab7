use bson::{DateTime, doc, oid::ObjectId};
use mongodb::Database;
use tracing::{info, warn};
use vitalis_db::models::{Conversation, ConversationKind, Participant, User};

use super::base::{BaseDao, DaoError, DaoResult};

pub const GENERAL_NAME: &str = "Chat Geral";

/// Resolves conversations by kind. GENERAL and PRIVATE are singletons
/// (per tenant / per pair) enforced by unique indexes, so concurrent
/// first access settles as insert-or-refetch rather than locking.
pub struct ConversationDao {
    pub base: BaseDao<Conversation>,
    pub participants: BaseDao<Participant>,
    pub users: BaseDao<User>,
}

impl ConversationDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Conversation::COLLECTION),
            participants: BaseDao::new(db, Participant::COLLECTION),
            users: BaseDao::new(db, User::COLLECTION),
        }
    }

    // ── Resolution ──────────────────────────────────────────────

    pub async fn get_or_create_general(
        &self,
        tenant_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<Conversation> {
        let filter = doc! { "tenant_id": tenant_id, "kind": "GENERAL", "is_active": true };

        if let Some(existing) = self.base.find_one(filter.clone()).await? {
            // Staff hired after the general chat was created get their
            // membership row on first access.
            self.ensure_member(tenant_id, existing.id.unwrap(), user_id).await?;
            return Ok(existing);
        }

        let now = DateTime::now();
        let conversation = Conversation {
            id: None,
            tenant_id,
            kind: ConversationKind::General,
            name: Some(GENERAL_NAME.to_string()),
            description: None,
            created_by: user_id,
            direct_key: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        match self.base.insert_one(&conversation).await {
            Ok(conversation_id) => {
                let members = self
                    .users
                    .find_many(doc! { "tenant_id": tenant_id, "is_active": true }, None)
                    .await?;

                // Row by row: a concurrent reader may already have healed
                // its own membership in, so duplicates are expected here.
                let mut enrolled = 0usize;
                for uid in members.iter().filter_map(|u| u.id) {
                    let row = participant_row(tenant_id, conversation_id, uid, false, now);
                    match self.participants.insert_one(&row).await {
                        Ok(_) => enrolled += 1,
                        Err(DaoError::DuplicateKey(_)) => {}
                        Err(e) => {
                            // Half-created general would shadow future
                            // attempts; undo it.
                            let _ = self.base.hard_delete(doc! { "_id": conversation_id }).await;
                            return Err(e);
                        }
                    }
                }

                info!(%tenant_id, %conversation_id, members = enrolled, "General conversation created");
                self.base.find_by_id(conversation_id).await
            }
            Err(DaoError::DuplicateKey(_)) => {
                // Lost the creation race; the winner is the singleton.
                let winner = self.base.find_one(filter).await?.ok_or(DaoError::NotFound)?;
                self.ensure_member(tenant_id, winner.id.unwrap(), user_id).await?;
                Ok(winner)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_or_create_private(
        &self,
        tenant_id: ObjectId,
        user_id: ObjectId,
        other_user_id: ObjectId,
    ) -> DaoResult<Conversation> {
        if user_id == other_user_id {
            return Err(DaoError::Validation(
                "Cannot open a private conversation with yourself".to_string(),
            ));
        }
        self.require_active_user(tenant_id, other_user_id).await?;

        let key = Conversation::direct_key(tenant_id, user_id, other_user_id);

        if let Some(existing) = self.base.find_one(doc! { "direct_key": &key }).await? {
            let id = existing.id.unwrap();
            if !existing.is_active {
                self.base
                    .update_by_id(id, doc! { "$set": { "is_active": true, "updated_at": DateTime::now() } })
                    .await?;
                return self.base.find_by_id(id).await;
            }
            return Ok(existing);
        }

        let now = DateTime::now();
        let conversation = Conversation {
            id: None,
            tenant_id,
            kind: ConversationKind::Private,
            name: None,
            description: None,
            created_by: user_id,
            direct_key: Some(key.clone()),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        match self.base.insert_one(&conversation).await {
            Ok(conversation_id) => {
                let rows = vec![
                    participant_row(tenant_id, conversation_id, user_id, true, now),
                    participant_row(tenant_id, conversation_id, other_user_id, false, now),
                ];
                if let Err(e) = self.participants.insert_many(&rows).await {
                    let _ = self.base.hard_delete(doc! { "_id": conversation_id }).await;
                    return Err(e);
                }
                self.base.find_by_id(conversation_id).await
            }
            Err(DaoError::DuplicateKey(_)) => self
                .base
                .find_one(doc! { "direct_key": &key })
                .await?
                .ok_or(DaoError::NotFound),
            Err(e) => Err(e),
        }
    }

    pub async fn create_group(
        &self,
        tenant_id: ObjectId,
        creator_id: ObjectId,
        name: String,
        description: Option<String>,
        member_ids: Vec<ObjectId>,
    ) -> DaoResult<Conversation> {
        if name.trim().is_empty() {
            return Err(DaoError::Validation("Group name is required".to_string()));
        }

        // Validate the whole roster before touching the database.
        let mut members: Vec<ObjectId> = Vec::new();
        for member_id in member_ids {
            if member_id == creator_id || members.contains(&member_id) {
                continue;
            }
            self.require_active_user(tenant_id, member_id).await?;
            members.push(member_id);
        }

        let now = DateTime::now();
        let conversation = Conversation {
            id: None,
            tenant_id,
            kind: ConversationKind::Group,
            name: Some(name.trim().to_string()),
            description,
            created_by: creator_id,
            direct_key: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let conversation_id = self.base.insert_one(&conversation).await?;

        let mut rows = vec![participant_row(tenant_id, conversation_id, creator_id, true, now)];
        rows.extend(
            members
                .iter()
                .map(|uid| participant_row(tenant_id, conversation_id, *uid, false, now)),
        );

        if let Err(e) = self.participants.insert_many(&rows).await {
            warn!(%conversation_id, "Group membership insert failed, rolling back conversation");
            let _ = self.base.hard_delete(doc! { "_id": conversation_id }).await;
            return Err(e);
        }

        self.base.find_by_id(conversation_id).await
    }

    // ── Lookup ──────────────────────────────────────────────────

    /// Active conversations the user participates in, most recently
    /// updated first.
    pub async fn find_for_user(
        &self,
        tenant_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<Vec<Conversation>> {
        let memberships = self
            .participants
            .find_many(
                doc! { "tenant_id": tenant_id, "user_id": user_id, "is_active": true },
                None,
            )
            .await?;

        let conversation_ids: Vec<ObjectId> =
            memberships.iter().map(|p| p.conversation_id).collect();
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.base
            .find_many(
                doc! { "_id": { "$in": conversation_ids }, "is_active": true },
                Some(doc! { "updated_at": -1 }),
            )
            .await
    }

    /// Fetch a conversation the user is allowed to see. Missing, inactive
    /// and not-a-participant all come back as NotFound so existence never
    /// leaks across membership lines.
    pub async fn find_visible(
        &self,
        tenant_id: ObjectId,
        conversation_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<Conversation> {
        let conversation = self
            .base
            .find_one(doc! { "_id": conversation_id, "tenant_id": tenant_id, "is_active": true })
            .await?
            .ok_or(DaoError::NotFound)?;

        self.find_participant(conversation_id, user_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(DaoError::NotFound)?;

        Ok(conversation)
    }

    pub async fn find_participant(
        &self,
        conversation_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<Option<Participant>> {
        self.participants
            .find_one(doc! { "conversation_id": conversation_id, "user_id": user_id })
            .await
    }

    pub async fn is_participant(
        &self,
        conversation_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<bool> {
        Ok(self
            .find_participant(conversation_id, user_id)
            .await?
            .map(|p| p.is_active)
            .unwrap_or(false))
    }

    /// The acting user's membership row, required to be an active admin.
    pub async fn require_admin(
        &self,
        conversation_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<Participant> {
        let participant = self
            .find_participant(conversation_id, user_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| DaoError::Forbidden("Not a participant of this conversation".to_string()))?;

        if !participant.is_admin {
            return Err(DaoError::Forbidden(
                "Only a conversation admin can do this".to_string(),
            ));
        }
        Ok(participant)
    }

    pub async fn list_participants(&self, conversation_id: ObjectId) -> DaoResult<Vec<Participant>> {
        self.participants
            .find_many(
                doc! { "conversation_id": conversation_id, "is_active": true },
                Some(doc! { "joined_at": 1 }),
            )
            .await
    }

    pub async fn find_participant_user_ids(
        &self,
        conversation_id: ObjectId,
    ) -> DaoResult<Vec<ObjectId>> {
        let participants = self.list_participants(conversation_id).await?;
        Ok(participants.into_iter().map(|p| p.user_id).collect())
    }

    // ── Membership changes ──────────────────────────────────────

    pub async fn add_participant(
        &self,
        tenant_id: ObjectId,
        conversation_id: ObjectId,
        acting_user_id: ObjectId,
        new_user_id: ObjectId,
    ) -> DaoResult<Participant> {
        let conversation = self.base.find_by_id_in_tenant(tenant_id, conversation_id).await?;
        if conversation.kind == ConversationKind::Private {
            return Err(DaoError::Invariant(
                "Private conversations have a fixed pair of participants".to_string(),
            ));
        }
        self.require_admin(conversation_id, acting_user_id).await?;
        self.require_active_user(tenant_id, new_user_id).await?;

        if let Some(existing) = self.find_participant(conversation_id, new_user_id).await? {
            if existing.is_active {
                return Err(DaoError::DuplicateKey(
                    "User is already a participant".to_string(),
                ));
            }
            let id = existing.id.unwrap();
            self.participants
                .update_by_id(id, doc! { "$set": { "is_active": true, "updated_at": DateTime::now() } })
                .await?;
            return self.participants.find_by_id(id).await;
        }

        let row = participant_row(tenant_id, conversation_id, new_user_id, false, DateTime::now());
        let id = self.participants.insert_one(&row).await?;
        self.participants.find_by_id(id).await
    }

    pub async fn remove_participant(
        &self,
        tenant_id: ObjectId,
        conversation_id: ObjectId,
        acting_user_id: ObjectId,
        target_user_id: ObjectId,
    ) -> DaoResult<bool> {
        let conversation = self.base.find_by_id_in_tenant(tenant_id, conversation_id).await?;
        if conversation.kind == ConversationKind::Private {
            return Err(DaoError::Invariant(
                "Participants cannot be removed from private conversations".to_string(),
            ));
        }
        self.require_admin(conversation_id, acting_user_id).await?;

        if target_user_id == conversation.created_by {
            return Err(DaoError::Invariant(
                "The conversation creator cannot be removed".to_string(),
            ));
        }

        let target = self
            .find_participant(conversation_id, target_user_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or(DaoError::NotFound)?;

        self.participants
            .update_by_id(
                target.id.unwrap(),
                doc! { "$set": { "is_active": false, "updated_at": DateTime::now() } },
            )
            .await
    }

    // ── Metadata ────────────────────────────────────────────────

    pub async fn update_info(
        &self,
        tenant_id: ObjectId,
        conversation_id: ObjectId,
        name: Option<String>,
        description: Option<String>,
    ) -> DaoResult<Conversation> {
        let mut set_doc = doc! {};
        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(DaoError::Validation("Name cannot be empty".to_string()));
            }
            set_doc.insert("name", name.trim());
        }
        if let Some(description) = description {
            set_doc.insert("description", description);
        }

        if !set_doc.is_empty() {
            set_doc.insert("updated_at", DateTime::now());
            self.base
                .update_one(
                    doc! { "_id": conversation_id, "tenant_id": tenant_id },
                    doc! { "$set": set_doc },
                )
                .await?;
        }

        self.base.find_by_id_in_tenant(tenant_id, conversation_id).await
    }

    pub async fn deactivate(&self, tenant_id: ObjectId, conversation_id: ObjectId) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": conversation_id, "tenant_id": tenant_id, "is_active": true },
                doc! { "$set": { "is_active": false, "updated_at": DateTime::now() } },
            )
            .await
    }

    // ── Helpers ─────────────────────────────────────────────────

    async fn require_active_user(&self, tenant_id: ObjectId, user_id: ObjectId) -> DaoResult<User> {
        self.users
            .find_one(doc! { "_id": user_id, "tenant_id": tenant_id, "is_active": true })
            .await?
            .ok_or_else(|| {
                DaoError::Validation(format!(
                    "User {} is not an active member of this tenant",
                    user_id.to_hex()
                ))
            })
    }

    async fn ensure_member(
        &self,
        tenant_id: ObjectId,
        conversation_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<()> {
        if self.find_participant(conversation_id, user_id).await?.is_some() {
            return Ok(());
        }
        if self.require_active_user(tenant_id, user_id).await.is_err() {
            return Ok(());
        }

        let row = participant_row(tenant_id, conversation_id, user_id, false, DateTime::now());
        match self.participants.insert_one(&row).await {
            Ok(_) => Ok(()),
            // Raced another connection of the same user; the row exists.
            Err(DaoError::DuplicateKey(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn participant_row(
    tenant_id: ObjectId,
    conversation_id: ObjectId,
    user_id: ObjectId,
    is_admin: bool,
    now: DateTime,
) -> Participant {
    Participant {
        id: None,
        tenant_id,
        conversation_id,
        user_id,
        is_admin,
        is_active: true,
        joined_at: now,
        updated_at: now,
    }
}
