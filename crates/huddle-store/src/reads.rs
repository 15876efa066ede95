//! Read state: a boolean on the row for direct messages, per-user read
//! records for group messages (a group message has many readers).
//!
//! A group message counts toward a user's unread set iff it was created at
//! or after their current joined_at, was not sent by them, has no read
//! record for them, and is not a membership announcement about them
//! (matched on the structured subject tag, not on content text).

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::membership::membership_inner;
use crate::models::to_millis;
use crate::{Database, Result, StoreError};

/// Shared WHERE clause for "unread by ?1" group messages. Parameters:
/// ?1 user, ?2 group, ?3 joined_at floor.
const GROUP_UNREAD_PREDICATES: &str = "m.group_id = ?2
      AND m.created_at >= ?3
      AND m.sender_id <> ?1
      AND NOT EXISTS (
          SELECT 1 FROM read_records r
          WHERE r.message_id = m.id AND r.user_id = ?1)
      AND NOT (m.kind = 'system'
          AND m.system_kind IN ('member_added', 'group_created')
          AND instr(coalesce(m.system_subject_ids, ''), ?1) > 0)";

impl Database {
    /// Flip every direct message from `other_id` to `reader_id` to read.
    /// Returns how many rows changed.
    pub fn mark_direct_read(&self, reader_id: Uuid, other_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                params![other_id.to_string(), reader_id.to_string()],
            )?;
            Ok(changed)
        })
    }

    pub fn direct_unread_count(&self, reader_id: Uuid, other_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                params![other_id.to_string(), reader_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Insert a read record for every group message currently unread by the
    /// user. Returns how many records were created.
    pub fn mark_group_read(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let membership =
                membership_inner(conn, group_id, user_id)?.ok_or(StoreError::NotAMember)?;

            let created = conn.execute(
                &format!(
                    "INSERT INTO read_records (group_id, message_id, user_id, read_at)
                     SELECT m.group_id, m.id, ?1, ?4 FROM messages m
                     WHERE {}",
                    GROUP_UNREAD_PREDICATES
                ),
                params![
                    user_id.to_string(),
                    group_id.to_string(),
                    to_millis(membership.joined_at),
                    to_millis(now),
                ],
            )?;
            Ok(created)
        })
    }

    /// Cardinality of the same unread set `mark_group_read` would clear.
    pub fn group_unread_count(&self, user_id: Uuid, group_id: Uuid) -> Result<i64> {
        self.with_conn(|conn| {
            let membership =
                membership_inner(conn, group_id, user_id)?.ok_or(StoreError::NotAMember)?;

            let count = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM messages m WHERE {}",
                    GROUP_UNREAD_PREDICATES
                ),
                params![
                    user_id.to_string(),
                    group_id.to_string(),
                    to_millis(membership.joined_at),
                ],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}
