//! Message lifecycle: send, edit, soft delete.
//!
//! Direct and group messages share one table; `ConversationRef` picks the
//! target. Mutation rights belong to the sender only.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use huddle_types::models::{ConversationRef, Message, MessageKind, SystemEventKind};

use crate::contacts::are_contacts_inner;
use crate::membership::membership_inner;
use crate::models::{join_subjects, message_from_row, to_millis};
use crate::users::user_exists;
use crate::{Database, Result, StoreError};

/// Replacement content after a soft delete. The row stays; the words go.
pub const TOMBSTONE: &str = "[message deleted]";

/// Select list matching `models::message_from_row`.
pub(crate) const MESSAGE_COLUMNS: &str = "seq, id, sender_id, receiver_id, group_id, content, \
     kind, file_id, file_name, is_read, is_edited, edited_at, is_deleted, \
     system_kind, system_subject_ids, deleted_at, created_at";

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub conversation: ConversationRef,
    pub content: String,
    pub kind: MessageKind,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
}

/// Resolve the exactly-one-of pair a send request carries.
pub fn conversation_from_parts(
    receiver_id: Option<Uuid>,
    group_id: Option<Uuid>,
) -> Result<ConversationRef> {
    match (receiver_id, group_id) {
        (Some(user_id), None) => Ok(ConversationRef::Direct(user_id)),
        (None, Some(group_id)) => Ok(ConversationRef::Group(group_id)),
        _ => Err(StoreError::InvalidTarget),
    }
}

impl Database {
    pub fn send(&self, msg: NewMessage, sent_at: DateTime<Utc>) -> Result<Message> {
        if msg.kind == MessageKind::System {
            // System messages are appended by membership operations, never
            // accepted from callers.
            return Err(StoreError::InvalidInput("system messages cannot be sent"));
        }

        let content = msg.content.trim().to_string();
        if content.is_empty() && msg.kind != MessageKind::File {
            return Err(StoreError::InvalidInput("message content must not be empty"));
        }
        if msg.kind == MessageKind::File && msg.file_id.is_none() {
            return Err(StoreError::InvalidInput("file messages need a file_id"));
        }

        self.with_conn(|conn| {
            match msg.conversation {
                ConversationRef::Direct(receiver_id) => {
                    if !user_exists(conn, receiver_id)? {
                        return Err(StoreError::NotFound("user"));
                    }
                    if !are_contacts_inner(conn, msg.sender_id, receiver_id)? {
                        return Err(StoreError::NotContacts);
                    }
                }
                ConversationRef::Group(group_id) => {
                    if membership_inner(conn, group_id, msg.sender_id)?.is_none() {
                        return Err(StoreError::NotAMember);
                    }
                }
            }

            let inserted = insert_message(
                conn,
                msg.sender_id,
                msg.conversation,
                &content,
                msg.kind,
                msg.file_id.as_deref(),
                msg.file_name.as_deref(),
                None,
                &[],
                sent_at,
            )?;
            Ok(inserted)
        })
    }

    /// Sender-only; text and emoji messages only; deleted messages stay deleted.
    pub fn edit(
        &self,
        actor_id: Uuid,
        message_id: Uuid,
        new_content: &str,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        let content = new_content.trim().to_string();
        if content.is_empty() {
            return Err(StoreError::InvalidInput("message content must not be empty"));
        }

        self.with_conn(|conn| {
            let msg = get_message_inner(conn, message_id)?.ok_or(StoreError::NotFound("message"))?;

            if msg.sender_id != actor_id {
                return Err(StoreError::NotSender);
            }
            if msg.is_deleted {
                return Err(StoreError::AlreadyDeleted);
            }
            if !msg.kind.editable() {
                return Err(StoreError::UnsupportedType);
            }

            conn.execute(
                "UPDATE messages SET content = ?1, is_edited = 1, edited_at = ?2 WHERE id = ?3",
                params![content, to_millis(now), message_id.to_string()],
            )?;

            get_message_inner(conn, message_id)?.ok_or(StoreError::NotFound("message"))
        })
    }

    /// Soft delete: content is tombstoned, the row stays. Deleting an
    /// already-deleted message is a no-op.
    pub fn delete(&self, actor_id: Uuid, message_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            let msg = get_message_inner(conn, message_id)?.ok_or(StoreError::NotFound("message"))?;

            if msg.sender_id != actor_id {
                return Err(StoreError::NotSender);
            }
            if msg.is_deleted {
                return Ok(());
            }

            conn.execute(
                "UPDATE messages SET content = ?1, is_deleted = 1, deleted_at = ?2 WHERE id = ?3",
                params![TOMBSTONE, to_millis(now), message_id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, message_id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| Ok(get_message_inner(conn, message_id)?))
    }
}

pub(crate) fn get_message_inner(
    conn: &Connection,
    message_id: Uuid,
) -> rusqlite::Result<Option<Message>> {
    conn.query_row(
        &format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS),
        [message_id.to_string()],
        message_from_row,
    )
    .optional()
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn insert_message(
    conn: &Connection,
    sender_id: Uuid,
    conversation: ConversationRef,
    content: &str,
    kind: MessageKind,
    file_id: Option<&str>,
    file_name: Option<&str>,
    system_kind: Option<SystemEventKind>,
    system_subjects: &[Uuid],
    created_at: DateTime<Utc>,
) -> rusqlite::Result<Message> {
    let (receiver_id, group_id) = match conversation {
        ConversationRef::Direct(user_id) => (Some(user_id.to_string()), None),
        ConversationRef::Group(group_id) => (None, Some(group_id.to_string())),
    };

    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO messages (id, sender_id, receiver_id, group_id, content, kind, \
             file_id, file_name, system_kind, system_subject_ids, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id.to_string(),
            sender_id.to_string(),
            receiver_id,
            group_id,
            content,
            kind.as_str(),
            file_id,
            file_name,
            system_kind.map(|k| k.as_str()),
            join_subjects(system_subjects),
            to_millis(created_at),
        ],
    )?;

    Ok(Message {
        seq: conn.last_insert_rowid(),
        id,
        sender_id,
        conversation,
        content: content.to_string(),
        kind,
        file_id: file_id.map(str::to_string),
        file_name: file_name.map(str::to_string),
        is_read: false,
        is_edited: false,
        edited_at: None,
        is_deleted: false,
        deleted_at: None,
        system_kind,
        system_subjects: system_subjects.to_vec(),
        created_at,
    })
}

/// Appended from inside membership transactions so the announcement commits
/// with the mutation it describes.
pub(crate) fn append_system_message(
    conn: &Connection,
    group_id: Uuid,
    sender_id: Uuid,
    content: &str,
    event: SystemEventKind,
    subjects: &[Uuid],
    now: DateTime<Utc>,
) -> rusqlite::Result<Message> {
    insert_message(
        conn,
        sender_id,
        ConversationRef::Group(group_id),
        content,
        MessageKind::System,
        None,
        None,
        Some(event),
        subjects,
        now,
    )
}
