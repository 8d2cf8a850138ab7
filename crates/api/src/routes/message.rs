use axum::{
    Json,
    extract::{Path, Query, State},
};
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};
use crate::ws::{
    dispatcher,
    events::ServerEvent,
    rooms::RoomId,
};
use vitalis_db::models::{Attachment, Conversation, ConversationKind, Message};
use vitalis_services::dao::base::PaginationParams;
use vitalis_services::dao::message::AttachmentInput;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Body keys follow the platform's Portuguese API conventions; responses
/// are camelCase like the rest of the wire surface.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub conteudo: String,
    #[serde(default)]
    pub anexos: Vec<AttachmentInput>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub conteudo: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub content: String,
    pub is_edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
    pub timestamp: String,
    pub attachments: Vec<AttachmentResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub size: i64,
    pub url: String,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cid = ObjectId::parse_str(&chat_id)
        .map_err(|_| ApiError::BadRequest("Invalid chat id".to_string()))?;

    state
        .conversations
        .find_visible(auth.tenant_id, cid, auth.user_id)
        .await?;

    let params = PaginationParams::from_query(
        query.page,
        query.limit,
        state.settings.chat.default_page_size,
        state.settings.chat.max_page_size,
    );
    let result = state.messages.find_page(cid, auth.user_id, &params).await?;

    let message_ids: Vec<ObjectId> = result.items.iter().filter_map(|m| m.id).collect();
    let mut attachments = state.messages.attachments_for(&message_ids).await?;

    let items: Vec<MessageResponse> = result
        .items
        .into_iter()
        .map(|message| {
            let files = message
                .id
                .and_then(|id| attachments.remove(&id))
                .unwrap_or_default();
            to_response(message, files)
        })
        .collect();

    Ok(Json(serde_json::json!({
        "items": items,
        "page": result.page,
        "limit": result.limit,
        "total": result.total,
        "pages": result.total_pages,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let cid = ObjectId::parse_str(&chat_id)
        .map_err(|_| ApiError::BadRequest("Invalid chat id".to_string()))?;

    let conversation = state
        .conversations
        .find_visible(auth.tenant_id, cid, auth.user_id)
        .await?;

    let sender = state.users.find_active(auth.tenant_id, auth.user_id).await?;
    let (message, attachments) = state
        .messages
        .append(
            auth.tenant_id,
            cid,
            &sender,
            &body.conteudo,
            body.anexos,
            state.settings.chat.max_message_length,
        )
        .await?;

    let response = to_response(message, attachments);
    broadcast_new_message(&state, &conversation, &response);

    Ok(Json(response))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((chat_id, message_id)): Path<(String, String)>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let cid = ObjectId::parse_str(&chat_id)
        .map_err(|_| ApiError::BadRequest("Invalid chat id".to_string()))?;
    let mid = ObjectId::parse_str(&message_id)
        .map_err(|_| ApiError::BadRequest("Invalid message id".to_string()))?;

    state
        .conversations
        .find_visible(auth.tenant_id, cid, auth.user_id)
        .await?;

    let message = state
        .messages
        .edit(
            auth.tenant_id,
            cid,
            mid,
            auth.user_id,
            &body.conteudo,
            state.settings.chat.max_message_length,
        )
        .await?;

    let attachments = state
        .messages
        .attachments_for(&[mid])
        .await?
        .remove(&mid)
        .unwrap_or_default();

    Ok(Json(to_response(message, attachments)))
}

/// Fans a freshly appended message out to the conversation room, plus
/// the tenant room when the conversation is the tenant's general one so
/// staff who never opened the chat still see it land.
pub fn broadcast_new_message(
    state: &AppState,
    conversation: &Conversation,
    response: &MessageResponse,
) {
    let Some(conversation_id) = conversation.id else {
        return;
    };

    let mut targets = vec![RoomId::Conversation(conversation_id)];
    if conversation.kind == ConversationKind::General {
        targets.push(RoomId::Tenant(conversation.tenant_id));
    }

    dispatcher::broadcast_rooms(
        &state.ws_storage,
        &state.rooms,
        &targets,
        &ServerEvent::NewMessage(response.clone()),
        None,
    );
}

pub fn to_response(m: Message, attachments: Vec<Attachment>) -> MessageResponse {
    MessageResponse {
        id: m.id.map(|id| id.to_hex()).unwrap_or_default(),
        chat_id: m.conversation_id.to_hex(),
        sender_id: m.sender_id.to_hex(),
        sender_name: m.sender_name,
        sender_role: m.sender_role,
        content: m.content,
        is_edited: m.is_edited,
        edited_at: m
            .edited_at
            .and_then(|at| at.try_to_rfc3339_string().ok()),
        timestamp: m.created_at.try_to_rfc3339_string().unwrap_or_default(),
        attachments: attachments.into_iter().map(attachment_response).collect(),
    }
}

fn attachment_response(a: Attachment) -> AttachmentResponse {
    AttachmentResponse {
        id: a.id.map(|id| id.to_hex()).unwrap_or_default(),
        file_name: a.file_name,
        content_type: a.content_type,
        size: a.size,
        url: a.url,
    }
}
