use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use huddle_types::models::User;

use crate::models::{get_millis, get_uuid, to_millis, user_from_row, UserRow};
use crate::{Database, Result};

impl Database {
    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), username, password_hash, to_millis(now)],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, password, created_at FROM users WHERE username = ?1",
                    [username],
                    user_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, created_at FROM users WHERE id = ?1",
                    [id.to_string()],
                    |row| {
                        Ok(User {
                            id: get_uuid(row, 0)?,
                            username: row.get(1)?,
                            created_at: get_millis(row, 2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }
}

pub(crate) fn user_exists(conn: &Connection, id: Uuid) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE id = ?1",
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Display name for system message content. Falls back rather than failing
/// the surrounding transaction over a missing profile.
pub(crate) fn username_or_unknown(conn: &Connection, id: Uuid) -> String {
    conn.query_row(
        "SELECT username FROM users WHERE id = ?1",
        [id.to_string()],
        |row| row.get(0),
    )
    .unwrap_or_else(|_| "unknown user".to_string())
}
