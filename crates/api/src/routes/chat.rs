use axum::{
    Json,
    extract::{Path, State},
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};
use crate::routes::message::{MessageResponse, to_response};
use crate::ws::{
    dispatcher,
    events::{ChatUpdatedPayload, ServerEvent},
};
use vitalis_db::models::{Conversation, ConversationKind};
use vitalis_services::dao::base::DaoError;
use vitalis_services::dao::conversation::GENERAL_NAME;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChatRequest {
    pub tipo: String,
    #[validate(length(min = 1, max = 100))]
    pub nome: Option<String>,
    #[validate(length(max = 500))]
    pub descricao: Option<String>,
    #[serde(default)]
    pub participantes: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateChatRequest {
    #[validate(length(min = 1, max = 100))]
    pub nome: Option<String>,
    #[validate(length(max = 500))]
    pub descricao: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub mensagem_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub id: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct ChatDetailResponse {
    #[serde(flatten)]
    pub chat: ChatResponse,
    pub participants: Vec<ParticipantResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub user_id: String,
    pub name: String,
    pub is_admin: bool,
    pub joined_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateChatResponse {
    pub chat: ChatResponse,
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatListItem {
    pub id: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessagePreview>,
    pub unread_count: u64,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessagePreview {
    pub content: String,
    pub sender_id: String,
    pub sender_name: String,
    pub timestamp: String,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ChatListItem>>, ApiError> {
    let conversations = state
        .conversations
        .find_for_user(auth.tenant_id, auth.user_id)
        .await?;
    let ids: Vec<ObjectId> = conversations.iter().filter_map(|c| c.id).collect();

    let last = state.messages.last_messages(&ids).await?;
    let unread = state.read_markers.unread_counts(&ids, auth.user_id).await?;

    // Private chats display under the counterpart's name.
    let counterpart_ids: Vec<ObjectId> = conversations
        .iter()
        .filter(|c| c.kind == ConversationKind::Private)
        .filter_map(|c| c.counterpart_of(auth.user_id))
        .collect();
    let names = state.users.find_names(&counterpart_ids).await?;

    let items: Vec<ChatListItem> = conversations
        .into_iter()
        .filter_map(|c| {
            let id = c.id?;
            let display_name = match c.kind {
                ConversationKind::General => {
                    c.name.clone().unwrap_or_else(|| GENERAL_NAME.to_string())
                }
                ConversationKind::Group => c.name.clone().unwrap_or_default(),
                ConversationKind::Private => c
                    .counterpart_of(auth.user_id)
                    .and_then(|other| names.get(&other).cloned())
                    .unwrap_or_else(|| "Conversa privada".to_string()),
            };
            let last_message = last.get(&id).map(|m| LastMessagePreview {
                content: m.content.clone(),
                sender_id: m.sender_id.to_hex(),
                sender_name: m.sender_name.clone(),
                timestamp: m.created_at.try_to_rfc3339_string().unwrap_or_default(),
            });
            Some(ChatListItem {
                id: id.to_hex(),
                kind: c.kind.as_str().to_string(),
                name: c.name,
                display_name,
                last_message,
                unread_count: unread.get(&id).copied().unwrap_or(0),
                updated_at: c.updated_at.try_to_rfc3339_string().unwrap_or_default(),
            })
        })
        .collect();

    Ok(Json(items))
}

pub async fn general(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ChatResponse>, ApiError> {
    let conversation = state
        .conversations
        .get_or_create_general(auth.tenant_id, auth.user_id)
        .await?;

    Ok(Json(chat_response(&conversation)))
}

pub async fn private(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<PrivateChatResponse>, ApiError> {
    let other = ObjectId::parse_str(&user_id)
        .map_err(|_| ApiError::BadRequest("Invalid user id".to_string()))?;

    let conversation = state
        .conversations
        .get_or_create_private(auth.tenant_id, auth.user_id, other)
        .await?;
    let conversation_id = conversation.id.unwrap();

    let messages = state
        .messages
        .find_latest(conversation_id, state.settings.chat.latest_limit)
        .await?;
    let message_ids: Vec<ObjectId> = messages.iter().filter_map(|m| m.id).collect();
    let mut attachments = state.messages.attachments_for(&message_ids).await?;

    let messages: Vec<MessageResponse> = messages
        .into_iter()
        .map(|m| {
            let files = m.id.and_then(|id| attachments.remove(&id)).unwrap_or_default();
            to_response(m, files)
        })
        .collect();

    Ok(Json(PrivateChatResponse {
        chat: chat_response(&conversation),
        messages,
    }))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatDetailResponse>, ApiError> {
    let cid = ObjectId::parse_str(&chat_id)
        .map_err(|_| ApiError::BadRequest("Invalid chat id".to_string()))?;

    let conversation = state
        .conversations
        .find_visible(auth.tenant_id, cid, auth.user_id)
        .await?;

    Ok(Json(detail_response(&state, conversation).await?))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateChatRequest>,
) -> Result<Json<ChatDetailResponse>, ApiError> {
    body.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    // GENERAL and PRIVATE are resolved through their own endpoints.
    if body.tipo != ConversationKind::Group.as_str() {
        return Err(ApiError::Validation(
            "Only GROUP conversations can be created directly".to_string(),
        ));
    }
    let name = body
        .nome
        .ok_or_else(|| ApiError::Validation("Group name is required".to_string()))?;

    let mut member_ids = Vec::with_capacity(body.participantes.len());
    for raw in &body.participantes {
        let member_id = ObjectId::parse_str(raw)
            .map_err(|_| ApiError::BadRequest(format!("Invalid participant id: {raw}")))?;
        member_ids.push(member_id);
    }

    let conversation = state
        .conversations
        .create_group(auth.tenant_id, auth.user_id, name, body.descricao, member_ids)
        .await?;

    let detail = detail_response(&state, conversation).await?;
    notify_members(
        &state,
        detail.participants.iter().map(|p| p.user_id.clone()).collect(),
        ChatUpdatedPayload {
            id: detail.chat.id.clone(),
            name: detail.chat.name.clone(),
            participants: Some(detail.participants.iter().map(|p| p.user_id.clone()).collect()),
            ..Default::default()
        },
    );

    Ok(Json(detail))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<UpdateChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    body.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let cid = ObjectId::parse_str(&chat_id)
        .map_err(|_| ApiError::BadRequest("Invalid chat id".to_string()))?;

    state
        .conversations
        .find_visible(auth.tenant_id, cid, auth.user_id)
        .await?;
    state.conversations.require_admin(cid, auth.user_id).await?;

    let conversation = state
        .conversations
        .update_info(auth.tenant_id, cid, body.nome, body.descricao)
        .await?;

    let member_ids = participant_hex_ids(&state, cid).await?;
    notify_members(
        &state,
        member_ids,
        ChatUpdatedPayload {
            id: chat_id,
            name: conversation.name.clone(),
            description: conversation.description.clone(),
            ..Default::default()
        },
    );

    Ok(Json(chat_response(&conversation)))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cid = ObjectId::parse_str(&chat_id)
        .map_err(|_| ApiError::BadRequest("Invalid chat id".to_string()))?;

    state
        .conversations
        .find_visible(auth.tenant_id, cid, auth.user_id)
        .await?;
    // The general chat has no admins, so it cannot be deleted this way.
    state.conversations.require_admin(cid, auth.user_id).await?;

    let member_ids = participant_hex_ids(&state, cid).await?;
    state.conversations.deactivate(auth.tenant_id, cid).await?;

    notify_members(
        &state,
        member_ids,
        ChatUpdatedPayload {
            id: chat_id,
            active: Some(false),
            ..Default::default()
        },
    );

    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn add_participant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<AddParticipantRequest>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let cid = ObjectId::parse_str(&chat_id)
        .map_err(|_| ApiError::BadRequest("Invalid chat id".to_string()))?;
    let new_user_id = ObjectId::parse_str(&body.user_id)
        .map_err(|_| ApiError::BadRequest("Invalid user id".to_string()))?;

    state
        .conversations
        .find_visible(auth.tenant_id, cid, auth.user_id)
        .await?;

    let participant = state
        .conversations
        .add_participant(auth.tenant_id, cid, auth.user_id, new_user_id)
        .await?;

    let member_ids = participant_hex_ids(&state, cid).await?;
    notify_members(
        &state,
        member_ids.clone(),
        ChatUpdatedPayload {
            id: chat_id,
            participants: Some(member_ids),
            ..Default::default()
        },
    );

    let name = state
        .users
        .find_names(&[new_user_id])
        .await?
        .remove(&new_user_id)
        .unwrap_or_default();

    Ok(Json(ParticipantResponse {
        user_id: participant.user_id.to_hex(),
        name,
        is_admin: participant.is_admin,
        joined_at: participant.joined_at.try_to_rfc3339_string().unwrap_or_default(),
    }))
}

pub async fn remove_participant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, user_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cid = ObjectId::parse_str(&chat_id)
        .map_err(|_| ApiError::BadRequest("Invalid chat id".to_string()))?;
    let target_user_id = ObjectId::parse_str(&user_id)
        .map_err(|_| ApiError::BadRequest("Invalid user id".to_string()))?;

    state
        .conversations
        .find_visible(auth.tenant_id, cid, auth.user_id)
        .await?;

    state
        .conversations
        .remove_participant(auth.tenant_id, cid, auth.user_id, target_user_id)
        .await?;

    // The removed user gets the update too, so their chat list drops the
    // conversation.
    let mut member_ids = participant_hex_ids(&state, cid).await?;
    member_ids.push(target_user_id.to_hex());
    notify_members(
        &state,
        member_ids.clone(),
        ChatUpdatedPayload {
            id: chat_id,
            participants: Some(
                member_ids
                    .into_iter()
                    .filter(|id| *id != target_user_id.to_hex())
                    .collect(),
            ),
            ..Default::default()
        },
    );

    Ok(Json(serde_json::json!({ "removed": true })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<MarkReadRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cid = ObjectId::parse_str(&chat_id)
        .map_err(|_| ApiError::BadRequest("Invalid chat id".to_string()))?;

    state
        .conversations
        .find_visible(auth.tenant_id, cid, auth.user_id)
        .await?;

    let upto = body
        .mensagem_id
        .as_ref()
        .map(ObjectId::parse_str)
        .transpose()
        .map_err(|_| ApiError::BadRequest("Invalid message id".to_string()))?;

    let marked = state
        .read_markers
        .mark_read(auth.tenant_id, cid, auth.user_id, upto)
        .await?;
    let unread = state.read_markers.unread_count(cid, auth.user_id).await?;

    // Badge sync for the reader's other tabs and devices.
    dispatcher::send_to_user(
        &state.ws_storage,
        &auth.user_id,
        &ServerEvent::ChatUpdated(ChatUpdatedPayload {
            id: chat_id,
            unread_count: Some(unread),
            ..Default::default()
        }),
    );

    Ok(Json(serde_json::json!({ "marked": marked, "unreadCount": unread })))
}

async fn detail_response(
    state: &AppState,
    conversation: Conversation,
) -> Result<ChatDetailResponse, ApiError> {
    let conversation_id = conversation.id.ok_or(DaoError::NotFound)?;
    let participants = state.conversations.list_participants(conversation_id).await?;
    let user_ids: Vec<ObjectId> = participants.iter().map(|p| p.user_id).collect();
    let names = state.users.find_names(&user_ids).await?;

    let participants = participants
        .into_iter()
        .map(|p| ParticipantResponse {
            user_id: p.user_id.to_hex(),
            name: names.get(&p.user_id).cloned().unwrap_or_default(),
            is_admin: p.is_admin,
            joined_at: p.joined_at.try_to_rfc3339_string().unwrap_or_default(),
        })
        .collect();

    Ok(ChatDetailResponse {
        chat: chat_response(&conversation),
        participants,
    })
}

async fn participant_hex_ids(state: &AppState, conversation_id: ObjectId) -> Result<Vec<String>, ApiError> {
    let ids = state
        .conversations
        .find_participant_user_ids(conversation_id)
        .await?;
    Ok(ids.into_iter().map(|id| id.to_hex()).collect())
}

/// Pushes a chatUpdated event to every listed member, addressed by user
/// so members who never joined the room still hear about it.
fn notify_members(state: &AppState, member_hex_ids: Vec<String>, payload: ChatUpdatedPayload) {
    let user_ids: Vec<ObjectId> = member_hex_ids
        .iter()
        .filter_map(|id| ObjectId::parse_str(id).ok())
        .collect();
    dispatcher::broadcast_users(
        &state.ws_storage,
        &user_ids,
        &ServerEvent::ChatUpdated(payload),
    );
}

fn chat_response(c: &Conversation) -> ChatResponse {
    ChatResponse {
        id: c.id.map(|id| id.to_hex()).unwrap_or_default(),
        kind: c.kind.as_str().to_string(),
        name: c.name.clone(),
        description: c.description.clone(),
        created_by: c.created_by.to_hex(),
        is_active: c.is_active,
        created_at: c.created_at.try_to_rfc3339_string().unwrap_or_default(),
        updated_at: c.updated_at.try_to_rfc3339_string().unwrap_or_default(),
    }
}
