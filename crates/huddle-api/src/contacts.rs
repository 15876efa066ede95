use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_types::api::{Claims, ContactRequestBody};

use crate::auth::AppStateInner;
use crate::error::ApiResult;

pub async fn request_contact(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ContactRequestBody>,
) -> ApiResult<impl IntoResponse> {
    let now = chrono::Utc::now();

    let db = state.clone();
    tokio::task::spawn_blocking(move || db.db.request_contact(claims.sub, req.user_id, now))
        .await??;

    Ok(StatusCode::CREATED)
}

pub async fn accept_contact(
    State(state): State<Arc<AppStateInner>>,
    Path(other_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    tokio::task::spawn_blocking(move || db.db.accept_contact(claims.sub, other_id)).await??;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn pending_requests(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let pending =
        tokio::task::spawn_blocking(move || db.db.pending_contact_requests(claims.sub))
            .await??;

    Ok(Json(pending))
}
