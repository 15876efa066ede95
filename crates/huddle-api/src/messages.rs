use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use huddle_store::messages::{NewMessage, conversation_from_parts};
use huddle_store::visibility::MessageCursor;
use huddle_types::api::{Claims, EditMessageRequest, SendMessageRequest, UnreadCountResponse};
use huddle_types::events::GatewayEvent;
use huddle_types::models::{ConversationRef, Message, MessageKind};

use crate::auth::AppStateInner;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor pagination: the created_at of the oldest message from the
    /// previous page, as unix milliseconds.
    pub before: Option<i64>,
    /// The seq of that same message. Without it the cursor falls back to
    /// strictly-before-the-timestamp and can skip same-millisecond peers.
    pub before_seq: Option<i64>,
}

fn default_limit() -> u32 {
    50
}

fn before_cursor(query: &MessageQuery) -> Option<MessageCursor> {
    let created_at = query
        .before
        .and_then(chrono::DateTime::from_timestamp_millis)?;
    Some(MessageCursor {
        created_at,
        // seq 0 sorts below every real row, so an old-style timestamp-only
        // cursor keeps its strictly-before meaning
        seq: query.before_seq.unwrap_or(0),
    })
}

pub(crate) fn conversation_parts(message: &Message) -> (Option<Uuid>, Option<Uuid>) {
    match message.conversation {
        ConversationRef::Group(id) => (Some(id), None),
        ConversationRef::Direct(id) => (None, Some(id)),
    }
}

fn preview_of(message: &Message) -> String {
    match message.kind {
        MessageKind::File => message
            .file_name
            .clone()
            .unwrap_or_else(|| "file".to_string()),
        _ => message.content.chars().take(80).collect(),
    }
}

/// Deliver an event: group-scoped events go over the broadcast channel
/// (connections filter on their subscriptions), direct events go only to
/// the two participants.
pub(crate) async fn publish(state: &AppStateInner, event: GatewayEvent, direct_peers: &[Uuid]) {
    if event.group_id().is_some() {
        state.dispatcher.broadcast(event);
    } else {
        let mut notified = Vec::with_capacity(direct_peers.len());
        for &peer in direct_peers {
            if notified.contains(&peer) {
                continue;
            }
            state.dispatcher.send_to_user(peer, event.clone()).await;
            notified.push(peer);
        }
    }
}

pub async fn send_message(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let conversation = conversation_from_parts(req.receiver_id, req.group_id)?;
    let now = chrono::Utc::now();

    let db = state.clone();
    let message = tokio::task::spawn_blocking(move || {
        db.db.send(
            NewMessage {
                sender_id: claims.sub,
                conversation,
                content: req.content,
                kind: req.kind,
                file_id: req.file_id,
                file_name: req.file_name,
            },
            now,
        )
    })
    .await??;

    let (group_id, receiver_id) = conversation_parts(&message);
    let event = GatewayEvent::MessageCreate {
        id: message.id,
        group_id,
        receiver_id,
        sender_id: claims.sub,
        sender_username: claims.username.clone(),
        preview: preview_of(&message),
        kind: message.kind,
        timestamp: message.created_at,
    };
    let peers: Vec<Uuid> = receiver_id.into_iter().chain([claims.sub]).collect();
    publish(&state, event, &peers).await;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn group_messages(
    State(state): State<Arc<AppStateInner>>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.min(200);
    let before = before_cursor(&query);

    let db = state.clone();
    let messages = tokio::task::spawn_blocking(move || {
        db.db.group_messages(claims.sub, group_id, limit, before)
    })
    .await??;

    Ok(Json(messages))
}

pub async fn direct_messages(
    State(state): State<Arc<AppStateInner>>,
    Path(other_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.min(200);
    let before = before_cursor(&query);

    let db = state.clone();
    let messages = tokio::task::spawn_blocking(move || {
        db.db.direct_messages(claims.sub, other_id, limit, before)
    })
    .await??;

    Ok(Json(messages))
}

pub async fn edit_message(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let now = chrono::Utc::now();

    let db = state.clone();
    let message = tokio::task::spawn_blocking(move || {
        db.db.edit(claims.sub, message_id, &req.content, now)
    })
    .await??;

    let (group_id, receiver_id) = conversation_parts(&message);
    let event = GatewayEvent::MessageEdit {
        id: message.id,
        group_id,
        content: message.content.clone(),
        edited_at: message.edited_at.unwrap_or(now),
    };
    let peers: Vec<Uuid> = receiver_id.into_iter().chain([claims.sub]).collect();
    publish(&state, event, &peers).await;

    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let now = chrono::Utc::now();

    let db = state.clone();
    let message = tokio::task::spawn_blocking(move || {
        db.db.delete(claims.sub, message_id, now)?;
        // The row survives as a tombstone; re-read it for the event scope.
        db.db
            .get_message(message_id)?
            .ok_or(huddle_store::StoreError::NotFound("message"))
    })
    .await??;

    let (group_id, receiver_id) = conversation_parts(&message);
    let event = GatewayEvent::MessageDelete {
        id: message.id,
        group_id,
    };
    let peers: Vec<Uuid> = receiver_id.into_iter().chain([claims.sub]).collect();
    publish(&state, event, &peers).await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_direct_read(
    State(state): State<Arc<AppStateInner>>,
    Path(other_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let changed =
        tokio::task::spawn_blocking(move || db.db.mark_direct_read(claims.sub, other_id))
            .await??;

    Ok(Json(serde_json::json!({ "marked": changed })))
}

pub async fn direct_unread(
    State(state): State<Arc<AppStateInner>>,
    Path(other_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let unread =
        tokio::task::spawn_blocking(move || db.db.direct_unread_count(claims.sub, other_id))
            .await??;

    Ok(Json(UnreadCountResponse { unread }))
}
