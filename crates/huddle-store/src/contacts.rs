//! Accepted-contact gate.
//!
//! Contact-gated operations (direct sends, group member adds) only care
//! about `are_contacts`; the request/accept lifecycle exists so the gate has
//! something to answer from.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use huddle_types::models::ContactStatus;

use crate::models::{get_millis, get_uuid, parse_contact_status, to_millis};
use crate::users::user_exists;
use crate::{Database, Result, StoreError};

/// Contact pairs are stored once; order the pair by text form.
fn pair(a: Uuid, b: Uuid) -> (String, String) {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b { (a, b) } else { (b, a) }
}

/// An inbound request, as listed for the receiving user.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContactRequest {
    pub from: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Database {
    /// Idempotent: an existing pending or accepted pair is left untouched.
    pub fn request_contact(&self, from: Uuid, to: Uuid, now: DateTime<Utc>) -> Result<()> {
        if from == to {
            return Err(StoreError::InvalidInput("cannot add yourself as a contact"));
        }
        self.with_conn(|conn| {
            if !user_exists(conn, to)? {
                return Err(StoreError::NotFound("user"));
            }
            let (user_a, user_b) = pair(from, to);
            conn.execute(
                "INSERT INTO contacts (user_a, user_b, status, requested_by, created_at)
                 VALUES (?1, ?2, 'pending', ?3, ?4)
                 ON CONFLICT (user_a, user_b) DO NOTHING",
                params![user_a, user_b, from.to_string(), to_millis(now)],
            )?;
            Ok(())
        })
    }

    /// Only the receiving side of a pending request may accept it.
    pub fn accept_contact(&self, user_id: Uuid, other: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            let (user_a, user_b) = pair(user_id, other);
            let row = conn
                .query_row(
                    "SELECT status, requested_by FROM contacts WHERE user_a = ?1 AND user_b = ?2",
                    params![user_a, user_b],
                    |row| {
                        let status: String = row.get(0)?;
                        Ok((parse_contact_status(0, &status)?, get_uuid(row, 1)?))
                    },
                )
                .optional()?;

            let (status, requested_by) = row.ok_or(StoreError::NotFound("contact request"))?;
            if status == ContactStatus::Accepted {
                // already contacts; accepting again is a no-op
                return Ok(());
            }
            if requested_by == user_id {
                return Err(StoreError::PermissionDenied);
            }

            conn.execute(
                "UPDATE contacts SET status = 'accepted' WHERE user_a = ?1 AND user_b = ?2",
                params![user_a, user_b],
            )?;
            Ok(())
        })
    }

    pub fn are_contacts(&self, a: Uuid, b: Uuid) -> Result<bool> {
        self.with_conn(|conn| Ok(are_contacts_inner(conn, a, b)?))
    }

    pub fn pending_contact_requests(&self, user_id: Uuid) -> Result<Vec<ContactRequest>> {
        self.with_conn(|conn| {
            let uid = user_id.to_string();
            let mut stmt = conn.prepare(
                "SELECT requested_by, created_at FROM contacts
                 WHERE (user_a = ?1 OR user_b = ?1)
                   AND status = 'pending' AND requested_by <> ?1
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map([&uid], |row| {
                    Ok(ContactRequest {
                        from: get_uuid(row, 0)?,
                        created_at: get_millis(row, 1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn are_contacts_inner(conn: &Connection, a: Uuid, b: Uuid) -> rusqlite::Result<bool> {
    let (user_a, user_b) = pair(a, b);
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM contacts
         WHERE user_a = ?1 AND user_b = ?2 AND status = 'accepted'",
        params![user_a, user_b],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
