use axum::{
    extract::{Query, State, WebSocketUpgrade, ws::{Message, WebSocket}},
    response::Response,
};
use bson::oid::ObjectId;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;
use vitalis_services::dao::base::DaoError;

use super::dispatcher;
use super::events::{
    ClientEvent, ConnectedPayload, JoinChatPayload, JoinPayload, JoinedPayload, MessagePayload,
    PongPayload, ServerEvent, StatusPayload, TypingPayload, UserDisconnectedPayload,
    UserStatusPayload, UserTypingPayload,
};
use super::rooms::RoomId;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match state.auth.verify_access_token(&params.token) {
        Ok(c) => c,
        Err(_) => {
            return Response::builder()
                .status(401)
                .body("Unauthorized".into())
                .unwrap();
        }
    };

    let user_id = match ObjectId::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => {
            return Response::builder()
                .status(400)
                .body("Invalid user ID".into())
                .unwrap();
        }
    };
    let tenant_id = match ObjectId::parse_str(&claims.tenant_id) {
        Ok(id) => id,
        Err(_) => {
            return Response::builder()
                .status(400)
                .body("Invalid tenant ID".into())
                .unwrap();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id, tenant_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: ObjectId, tenant_id: ObjectId) {
    let connection_id = Uuid::new_v4().to_string();
    info!(?user_id, %connection_id, "WebSocket connected");

    let (mut sink, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // All outbound traffic funnels through the writer task, which owns
    // the sink. Producers stay sync and never block on the socket.
    let writer_id = connection_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(%writer_id, %e, "Failed to encode WS event");
                    continue;
                }
            };
            if sink.send(Message::text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    state.ws_storage.add(user_id, connection_id.clone(), tx.clone());

    let _ = tx.send(ServerEvent::Connected(ConnectedPayload {
        message: "connected".to_string(),
    }));

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_client_event(&state, user_id, tenant_id, &connection_id, &text).await;
            }
            Ok(Message::Close(_)) => {
                break;
            }
            Err(e) => {
                warn!(?user_id, %connection_id, %e, "WebSocket error");
                break;
            }
            // Protocol pings are answered by the stack.
            _ => {}
        }
    }

    // Cleanup
    state.rooms.leave_all(&connection_id);
    state.ws_storage.remove(&user_id, &connection_id, &tx);
    drop(tx);
    let _ = writer.await;

    // Offline only when the last connection is gone; other tabs keep
    // the user present.
    if !state.ws_storage.has_connections(&user_id) {
        dispatcher::broadcast_room(
            &state.ws_storage,
            &state.rooms,
            RoomId::Tenant(tenant_id),
            &ServerEvent::UserDisconnected(UserDisconnectedPayload {
                user_id: user_id.to_hex(),
            }),
            None,
        );
    }

    info!(?user_id, %connection_id, "WebSocket disconnected");
}

async fn handle_client_event(
    state: &AppState,
    user_id: ObjectId,
    tenant_id: ObjectId,
    connection_id: &str,
    text: &str,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(?user_id, %connection_id, %e, "Malformed WS event");
            dispatcher::send_to_connection(
                &state.ws_storage,
                connection_id,
                &ServerEvent::error("Malformed event"),
            );
            return;
        }
    };

    debug!(?user_id, %connection_id, kind = event.kind(), "WS event received");

    match event {
        ClientEvent::Join(payload) => {
            handle_join(state, user_id, tenant_id, connection_id, payload).await;
        }
        ClientEvent::JoinChat(payload) => {
            handle_join_chat(state, user_id, connection_id, payload).await;
        }
        ClientEvent::Message(payload) => {
            handle_message(state, user_id, tenant_id, connection_id, payload).await;
        }
        ClientEvent::Typing(payload) => {
            handle_typing(state, user_id, connection_id, payload).await;
        }
        ClientEvent::Status(payload) => {
            handle_status(state, user_id, tenant_id, connection_id, payload);
        }
        ClientEvent::Ping => {
            dispatcher::send_to_connection(
                &state.ws_storage,
                connection_id,
                &ServerEvent::Pong(PongPayload {
                    timestamp: bson::DateTime::now().timestamp_millis(),
                }),
            );
        }
    }
}

async fn handle_join(
    state: &AppState,
    user_id: ObjectId,
    tenant_id: ObjectId,
    connection_id: &str,
    payload: JoinPayload,
) {
    // The event echoes identity; the token stays authoritative.
    let claimed_user = ObjectId::parse_str(&payload.user_id).ok();
    let claimed_tenant = ObjectId::parse_str(&payload.tenant_id).ok();
    if claimed_user != Some(user_id) || claimed_tenant != Some(tenant_id) {
        dispatcher::send_to_connection(
            &state.ws_storage,
            connection_id,
            &ServerEvent::error("Join does not match the authenticated session"),
        );
        return;
    }

    state.rooms.join(RoomId::Tenant(tenant_id), connection_id);

    match state.conversations.get_or_create_general(tenant_id, user_id).await {
        Ok(general) => {
            dispatcher::send_to_connection(
                &state.ws_storage,
                connection_id,
                &ServerEvent::Joined(JoinedPayload {
                    tenant_id: tenant_id.to_hex(),
                    general_chat_id: general.id.map(|id| id.to_hex()).unwrap_or_default(),
                }),
            );
        }
        Err(e) => {
            warn!(?user_id, %tenant_id, %e, "General conversation resolution failed");
            dispatcher::send_to_connection(
                &state.ws_storage,
                connection_id,
                &ServerEvent::error("Could not resolve the general conversation"),
            );
        }
    }
}

async fn handle_join_chat(
    state: &AppState,
    user_id: ObjectId,
    connection_id: &str,
    payload: JoinChatPayload,
) {
    let Ok(chat_id) = ObjectId::parse_str(&payload.chat_id) else {
        dispatcher::send_to_connection(
            &state.ws_storage,
            connection_id,
            &ServerEvent::error("Invalid chat id"),
        );
        return;
    };

    match state.conversations.is_participant(chat_id, user_id).await {
        Ok(true) => {
            state.rooms.join(RoomId::Conversation(chat_id), connection_id);
        }
        Ok(false) => {
            // Not fatal; the client may hold a stale chat list.
            debug!(?user_id, %chat_id, "joinChat from non-participant ignored");
        }
        Err(e) => {
            warn!(?user_id, %chat_id, %e, "joinChat lookup failed");
        }
    }
}

async fn handle_message(
    state: &AppState,
    user_id: ObjectId,
    tenant_id: ObjectId,
    connection_id: &str,
    payload: MessagePayload,
) {
    let Ok(chat_id) = ObjectId::parse_str(&payload.chat_id) else {
        dispatcher::send_to_connection(
            &state.ws_storage,
            connection_id,
            &ServerEvent::error("Invalid chat id"),
        );
        return;
    };

    let conversation = match state
        .conversations
        .find_visible(tenant_id, chat_id, user_id)
        .await
    {
        Ok(conversation) => conversation,
        Err(_) => {
            dispatcher::send_to_connection(
                &state.ws_storage,
                connection_id,
                &ServerEvent::error("Conversation not found"),
            );
            return;
        }
    };

    let sender = match state.users.find_active(tenant_id, user_id).await {
        Ok(user) => user,
        Err(_) => {
            dispatcher::send_to_connection(
                &state.ws_storage,
                connection_id,
                &ServerEvent::error("Sender is not an active user"),
            );
            return;
        }
    };

    // A failed or slow append must not leave a ghost message in the
    // room, so nothing is broadcast until the write is confirmed.
    let persist = state.messages.append(
        tenant_id,
        chat_id,
        &sender,
        &payload.content,
        payload.attachments,
        state.settings.chat.max_message_length,
    );
    let timeout = Duration::from_millis(state.settings.chat.persist_timeout_ms);
    let (message, attachments) = match tokio::time::timeout(timeout, persist).await {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            debug!(?user_id, %chat_id, %e, "Message rejected");
            let reason = match &e {
                DaoError::Validation(msg) | DaoError::Forbidden(msg) => msg.clone(),
                _ => "Message could not be saved".to_string(),
            };
            dispatcher::send_to_connection(
                &state.ws_storage,
                connection_id,
                &ServerEvent::error(reason),
            );
            return;
        }
        Err(_) => {
            warn!(?user_id, %chat_id, "Message persistence timed out");
            dispatcher::send_to_connection(
                &state.ws_storage,
                connection_id,
                &ServerEvent::error("Message could not be saved"),
            );
            return;
        }
    };

    let response = crate::routes::message::to_response(message, attachments);
    crate::routes::message::broadcast_new_message(state, &conversation, &response);
}

async fn handle_typing(
    state: &AppState,
    user_id: ObjectId,
    connection_id: &str,
    payload: TypingPayload,
) {
    let Ok(chat_id) = ObjectId::parse_str(&payload.chat_id) else {
        return;
    };
    match state.conversations.is_participant(chat_id, user_id).await {
        Ok(true) => {}
        _ => {
            debug!(?user_id, %chat_id, "typing from non-participant ignored");
            return;
        }
    }

    if payload.is_typing {
        let (generation, started) = state.typing.start(chat_id, user_id);
        if started {
            dispatcher::broadcast_room(
                &state.ws_storage,
                &state.rooms,
                RoomId::Conversation(chat_id),
                &ServerEvent::UserTyping(UserTypingPayload {
                    chat_id: chat_id.to_hex(),
                    user_id: user_id.to_hex(),
                    is_typing: true,
                }),
                Some(connection_id),
            );
        }

        // Dropped clients stop typing on their own after the TTL.
        let typing = state.typing.clone();
        let ws_storage = state.ws_storage.clone();
        let rooms = state.rooms.clone();
        let ttl = Duration::from_millis(state.settings.chat.typing_ttl_ms);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if typing.expire(chat_id, user_id, generation) {
                dispatcher::broadcast_room(
                    &ws_storage,
                    &rooms,
                    RoomId::Conversation(chat_id),
                    &ServerEvent::UserTyping(UserTypingPayload {
                        chat_id: chat_id.to_hex(),
                        user_id: user_id.to_hex(),
                        is_typing: false,
                    }),
                    None,
                );
            }
        });
    } else if state.typing.stop(chat_id, user_id) {
        dispatcher::broadcast_room(
            &state.ws_storage,
            &state.rooms,
            RoomId::Conversation(chat_id),
            &ServerEvent::UserTyping(UserTypingPayload {
                chat_id: chat_id.to_hex(),
                user_id: user_id.to_hex(),
                is_typing: false,
            }),
            Some(connection_id),
        );
    }
}

fn handle_status(
    state: &AppState,
    user_id: ObjectId,
    tenant_id: ObjectId,
    connection_id: &str,
    payload: StatusPayload,
) {
    dispatcher::broadcast_room(
        &state.ws_storage,
        &state.rooms,
        RoomId::Tenant(tenant_id),
        &ServerEvent::UserStatus(UserStatusPayload {
            user_id: user_id.to_hex(),
            status: payload.value,
        }),
        Some(connection_id),
    );
}
