pub mod contacts;
pub mod error;
pub mod membership;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod reactions;
pub mod reads;
pub mod users;
pub mod visibility;

pub use error::StoreError;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

pub type Result<T> = std::result::Result<T, StoreError>;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Internal(format!("DB lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Mutable access, needed for `Connection::transaction`. Every mutating
    /// operation that checks an invariant runs inside a single transaction
    /// so the invariant is evaluated against the rows it commits with.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Internal(format!("DB lock poisoned: {}", e)))?;
        f(&mut conn)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::Utc;
    use uuid::Uuid;

    use crate::membership::NewGroup;
    use crate::Database;

    pub fn new_db() -> Database {
        Database::open_in_memory().expect("in-memory db")
    }

    pub fn user(db: &Database, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(id, name, "hash", Utc::now()).unwrap();
        id
    }

    pub fn befriend(db: &Database, a: Uuid, b: Uuid) {
        db.request_contact(a, b, Utc::now()).unwrap();
        db.accept_contact(b, a).unwrap();
    }

    /// Group where every listed member is already an accepted contact of
    /// the creator, so all of them land in the member list. Created at the
    /// epoch so tests can use small synthetic timestamps above the
    /// creator's visibility floor.
    pub fn group_of(db: &Database, creator: Uuid, members: &[Uuid]) -> Uuid {
        for &m in members {
            befriend(db, creator, m);
        }
        db.create_group(
            creator,
            NewGroup {
                name: "test group".into(),
                description: None,
                is_private: false,
                member_ids: members.to_vec(),
            },
            chrono::DateTime::from_timestamp_millis(0).unwrap(),
        )
        .unwrap()
        .id
    }
}
