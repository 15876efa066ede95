//! Row mapping between SQLite and the shared domain types.
//!
//! Timestamps are stored as unix milliseconds so range queries and the
//! join-time visibility floor compare as plain integers.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use uuid::Uuid;

use huddle_types::models::{
    ContactStatus, ConversationRef, Group, Membership, MessageKind, ReactionKind, Role,
    SystemEventKind,
};

/// Stored credentials; only the auth layer sees the password hash.
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

fn conv_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conv_err(idx, e))
}

pub(crate) fn get_uuid_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => s.parse().map(Some).map_err(|e| conv_err(idx, e)),
        None => Ok(None),
    }
}

pub(crate) fn get_millis(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(from_millis(row.get(idx)?))
}

pub(crate) fn get_millis_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let ms: Option<i64> = row.get(idx)?;
    Ok(ms.map(from_millis))
}

fn bad_enum(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    conv_err(
        idx,
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown {}: {}", what, value),
        ),
    )
}

/// Subjects of a system message, stored as a comma-joined uuid list.
/// Uuids are fixed-width, so membership tests on the joined form are exact.
pub(crate) fn join_subjects(ids: &[Uuid]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    Some(
        ids.iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(","),
    )
}

pub(crate) fn split_subjects(s: Option<String>) -> Vec<Uuid> {
    s.map(|s| s.split(',').filter_map(|p| p.parse().ok()).collect())
        .unwrap_or_default()
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: get_uuid(row, 0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: get_millis(row, 3)?,
    })
}

/// Column order: id, name, description, creator_id, is_private,
/// member_count, created_at.
pub(crate) fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        creator_id: get_uuid(row, 3)?,
        is_private: row.get(4)?,
        member_count: row.get(5)?,
        created_at: get_millis(row, 6)?,
    })
}

/// Column order: group_id, user_id, role, joined_at.
pub(crate) fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<Membership> {
    let role: String = row.get(2)?;
    Ok(Membership {
        group_id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        role: Role::parse(&role).ok_or_else(|| bad_enum(2, "role", &role))?,
        joined_at: get_millis(row, 3)?,
    })
}

/// Column order matches [`crate::messages::MESSAGE_COLUMNS`].
pub(crate) fn message_from_row(row: &Row<'_>) -> rusqlite::Result<huddle_types::models::Message> {
    let receiver_id = get_uuid_opt(row, 3)?;
    let group_id = get_uuid_opt(row, 4)?;

    let conversation = match (receiver_id, group_id) {
        (Some(user_id), None) => ConversationRef::Direct(user_id),
        (None, Some(group_id)) => ConversationRef::Group(group_id),
        // The CHECK constraint forbids both other shapes.
        _ => return Err(bad_enum(4, "conversation target", "ambiguous")),
    };

    let kind: String = row.get(6)?;
    let system_kind: Option<String> = row.get(13)?;
    let system_kind = match system_kind {
        Some(s) => Some(SystemEventKind::parse(&s).ok_or_else(|| bad_enum(13, "system kind", &s))?),
        None => None,
    };

    Ok(huddle_types::models::Message {
        seq: row.get(0)?,
        id: get_uuid(row, 1)?,
        sender_id: get_uuid(row, 2)?,
        conversation,
        content: row.get(5)?,
        kind: MessageKind::parse(&kind).ok_or_else(|| bad_enum(6, "message kind", &kind))?,
        file_id: row.get(7)?,
        file_name: row.get(8)?,
        is_read: row.get(9)?,
        is_edited: row.get(10)?,
        edited_at: get_millis_opt(row, 11)?,
        is_deleted: row.get(12)?,
        system_kind,
        system_subjects: split_subjects(row.get(14)?),
        deleted_at: get_millis_opt(row, 15)?,
        created_at: get_millis(row, 16)?,
    })
}

pub(crate) fn parse_reaction_kind_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<ReactionKind> {
    let s: String = row.get(idx)?;
    ReactionKind::parse(&s).ok_or_else(|| bad_enum(idx, "reaction kind", &s))
}

pub(crate) fn parse_contact_status(idx: usize, s: &str) -> rusqlite::Result<ContactStatus> {
    ContactStatus::parse(s).ok_or_else(|| bad_enum(idx, "contact status", s))
}
