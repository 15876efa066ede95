use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        -- Contact pairs are stored once, with user_a < user_b (text order).
        CREATE TABLE IF NOT EXISTS contacts (
            user_a        TEXT NOT NULL REFERENCES users(id),
            user_b        TEXT NOT NULL REFERENCES users(id),
            status        TEXT NOT NULL CHECK (status IN ('pending', 'accepted')),
            requested_by  TEXT NOT NULL,
            created_at    INTEGER NOT NULL,
            PRIMARY KEY (user_a, user_b)
        );

        CREATE TABLE IF NOT EXISTS groups (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            description   TEXT,
            creator_id    TEXT NOT NULL REFERENCES users(id),
            is_private    INTEGER NOT NULL DEFAULT 0,
            member_count  INTEGER NOT NULL DEFAULT 0,
            created_at    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS memberships (
            group_id   TEXT NOT NULL REFERENCES groups(id),
            user_id    TEXT NOT NULL REFERENCES users(id),
            role       TEXT NOT NULL CHECK (role IN ('admin', 'member')),
            joined_at  INTEGER NOT NULL,
            PRIMARY KEY (group_id, user_id)
        );

        -- One table for both direct and group messages. seq is the
        -- insertion sequence used to break created_at ties.
        CREATE TABLE IF NOT EXISTS messages (
            seq                  INTEGER PRIMARY KEY AUTOINCREMENT,
            id                   TEXT NOT NULL UNIQUE,
            sender_id            TEXT NOT NULL REFERENCES users(id),
            receiver_id          TEXT REFERENCES users(id),
            group_id             TEXT REFERENCES groups(id),
            content              TEXT NOT NULL,
            kind                 TEXT NOT NULL CHECK (kind IN ('text', 'emoji', 'file', 'system')),
            file_id              TEXT,
            file_name            TEXT,
            is_read              INTEGER NOT NULL DEFAULT 0,
            is_edited            INTEGER NOT NULL DEFAULT 0,
            edited_at            INTEGER,
            is_deleted           INTEGER NOT NULL DEFAULT 0,
            deleted_at           INTEGER,
            system_kind          TEXT,
            system_subject_ids   TEXT,
            created_at           INTEGER NOT NULL,
            CHECK ((receiver_id IS NULL) <> (group_id IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_group
            ON messages(group_id, created_at, seq);

        CREATE INDEX IF NOT EXISTS idx_messages_direct
            ON messages(receiver_id, sender_id, created_at);

        CREATE TABLE IF NOT EXISTS read_records (
            group_id    TEXT NOT NULL REFERENCES groups(id),
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            read_at     INTEGER NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_read_records_group
            ON read_records(group_id, user_id);

        -- At most one reaction per (message, user); reacting again with a
        -- different kind updates the row in place.
        CREATE TABLE IF NOT EXISTS reactions (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            kind        TEXT NOT NULL,
            glyph       TEXT,
            created_at  INTEGER NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
