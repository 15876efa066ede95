use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_store::StoreError;
use huddle_types::api::{Claims, ReactRequest};
use huddle_types::events::GatewayEvent;

use crate::auth::AppStateInner;
use crate::error::ApiResult;
use crate::messages::{conversation_parts, publish};

pub async fn react(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReactRequest>,
) -> ApiResult<impl IntoResponse> {
    let now = chrono::Utc::now();

    let db = state.clone();
    let (message, summary) = tokio::task::spawn_blocking(move || {
        db.db
            .react(claims.sub, message_id, req.kind, req.glyph.as_deref(), now)?;
        let message = db
            .db
            .get_message(message_id)?
            .ok_or(StoreError::NotFound("message"))?;
        let summary = db.db.reaction_summary(message_id, claims.sub)?;
        Ok::<_, StoreError>((message, summary))
    })
    .await??;

    let (group_id, receiver_id) = conversation_parts(&message);
    let event = GatewayEvent::ReactionUpdate {
        message_id,
        group_id,
        reactions: summary.clone(),
    };
    let peers: Vec<Uuid> = receiver_id
        .into_iter()
        .chain([message.sender_id, claims.sub])
        .collect();
    publish(&state, event, &peers).await;

    Ok(Json(summary))
}

pub async fn unreact(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let (removed, message, summary) = tokio::task::spawn_blocking(move || {
        let removed = db.db.unreact(claims.sub, message_id)?;
        let message = db
            .db
            .get_message(message_id)?
            .ok_or(StoreError::NotFound("message"))?;
        let summary = db.db.reaction_summary(message_id, claims.sub)?;
        Ok::<_, StoreError>((removed, message, summary))
    })
    .await??;

    if removed {
        let (group_id, receiver_id) = conversation_parts(&message);
        let event = GatewayEvent::ReactionUpdate {
            message_id,
            group_id,
            reactions: summary,
        };
        let peers: Vec<Uuid> = receiver_id
            .into_iter()
            .chain([message.sender_id, claims.sub])
            .collect();
        publish(&state, event, &peers).await;
    }

    Ok(Json(serde_json::json!({ "removed": removed })))
}

pub async fn reaction_summary(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let summary =
        tokio::task::spawn_blocking(move || db.db.reaction_summary(message_id, claims.sub))
            .await??;

    Ok(Json(summary))
}
