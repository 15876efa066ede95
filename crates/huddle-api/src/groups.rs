use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use huddle_store::StoreError;
use huddle_store::membership::NewGroup;
use huddle_types::api::{
    AddMembersRequest, Claims, CreateGroupRequest, SetRoleRequest, UnreadCountResponse,
    UpdateGroupRequest,
};
use huddle_types::events::GatewayEvent;
use huddle_types::models::{Role, SystemEventKind};

use crate::auth::AppStateInner;
use crate::error::ApiResult;

pub async fn create_group(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let now = chrono::Utc::now();

    let db = state.clone();
    let group = tokio::task::spawn_blocking(move || {
        db.db.create_group(
            claims.sub,
            NewGroup {
                name: req.name,
                description: req.description,
                is_private: req.is_private,
                member_ids: req.member_ids,
            },
            now,
        )
    })
    .await??;

    state.dispatcher.broadcast(GatewayEvent::MembershipChange {
        group_id: group.id,
        kind: SystemEventKind::GroupCreated,
        subject_ids: vec![claims.sub],
        role: None,
    });

    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list_groups(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let groups =
        tokio::task::spawn_blocking(move || db.db.groups_for_user(claims.sub)).await??;
    Ok(Json(groups))
}

pub async fn get_group(
    State(state): State<Arc<AppStateInner>>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let group = tokio::task::spawn_blocking(move || {
        db.db
            .get_membership(group_id, claims.sub)?
            .ok_or(StoreError::NotAMember)?;
        db.db.get_group(group_id)?.ok_or(StoreError::NotFound("group"))
    })
    .await??;

    Ok(Json(group))
}

pub async fn update_group(
    State(state): State<Arc<AppStateInner>>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let now = chrono::Utc::now();

    let db = state.clone();
    let group = tokio::task::spawn_blocking(move || {
        db.db.update_group_details(
            claims.sub,
            group_id,
            req.name.as_deref(),
            req.description.as_deref(),
            now,
        )
    })
    .await??;

    state.dispatcher.broadcast(GatewayEvent::MembershipChange {
        group_id,
        kind: SystemEventKind::GroupUpdated,
        subject_ids: vec![],
        role: None,
    });

    Ok(Json(group))
}

pub async fn list_members(
    State(state): State<Arc<AppStateInner>>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let members = tokio::task::spawn_blocking(move || {
        db.db
            .get_membership(group_id, claims.sub)?
            .ok_or(StoreError::NotAMember)?;
        db.db.list_members(group_id)
    })
    .await??;

    Ok(Json(members))
}

pub async fn add_members(
    State(state): State<Arc<AppStateInner>>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMembersRequest>,
) -> ApiResult<impl IntoResponse> {
    let now = chrono::Utc::now();

    let db = state.clone();
    let added = tokio::task::spawn_blocking(move || {
        db.db.add_members(claims.sub, group_id, &req.member_ids, now)
    })
    .await??;

    if !added.is_empty() {
        state.dispatcher.broadcast(GatewayEvent::MembershipChange {
            group_id,
            kind: SystemEventKind::MemberAdded,
            subject_ids: added.clone(),
            role: None,
        });
    }

    Ok(Json(serde_json::json!({ "added": added })))
}

pub async fn remove_member(
    State(state): State<Arc<AppStateInner>>,
    Path((group_id, target_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let now = chrono::Utc::now();
    let is_self = target_id == claims.sub;

    let db = state.clone();
    tokio::task::spawn_blocking(move || {
        db.db.remove_member(claims.sub, group_id, target_id, now)
    })
    .await??;

    state.dispatcher.broadcast(GatewayEvent::MembershipChange {
        group_id,
        kind: if is_self {
            SystemEventKind::MemberLeft
        } else {
            SystemEventKind::MemberRemoved
        },
        subject_ids: vec![target_id],
        role: None,
    });

    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_role(
    State(state): State<Arc<AppStateInner>>,
    Path((group_id, target_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetRoleRequest>,
) -> ApiResult<impl IntoResponse> {
    let now = chrono::Utc::now();
    let role: Role = req.role;

    let db = state.clone();
    tokio::task::spawn_blocking(move || {
        db.db.set_role(claims.sub, group_id, target_id, role, now)
    })
    .await??;

    state.dispatcher.broadcast(GatewayEvent::MembershipChange {
        group_id,
        kind: SystemEventKind::RoleChanged,
        subject_ids: vec![target_id],
        role: Some(role),
    });

    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_group_read(
    State(state): State<Arc<AppStateInner>>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let now = chrono::Utc::now();

    let db = state.clone();
    let marked =
        tokio::task::spawn_blocking(move || db.db.mark_group_read(claims.sub, group_id, now))
            .await??;

    Ok(Json(serde_json::json!({ "marked": marked })))
}

pub async fn group_unread(
    State(state): State<Arc<AppStateInner>>,
    Path(group_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let unread =
        tokio::task::spawn_blocking(move || db.db.group_unread_count(claims.sub, group_id))
            .await??;

    Ok(Json(UnreadCountResponse { unread }))
}
