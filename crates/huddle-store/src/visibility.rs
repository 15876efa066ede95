//! Which stored messages a user may see.
//!
//! Group history is scoped by join time: a member sees a message iff it was
//! created at or after their current membership's joined_at. Leaving and
//! rejoining resets the floor to the newest joined_at. Results are ascending
//! by (created_at, seq) so pagination and "last message" stay deterministic.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use huddle_types::models::{ConversationRef, Message};

use crate::membership::membership_inner;
use crate::messages::MESSAGE_COLUMNS;
use crate::models::{message_from_row, to_millis};
use crate::{Database, Result, StoreError};

/// Pagination cursor: the `(created_at, seq)` of the oldest message from
/// the previous page. The seq half keeps messages that share a millisecond
/// reachable across a page boundary.
#[derive(Debug, Clone, Copy)]
pub struct MessageCursor {
    pub created_at: DateTime<Utc>,
    pub seq: i64,
}

impl MessageCursor {
    pub fn of(message: &Message) -> Self {
        Self {
            created_at: message.created_at,
            seq: message.seq,
        }
    }
}

impl Database {
    /// The newest `limit` messages visible to `user_id`, oldest first.
    /// `before` pages further back.
    pub fn group_messages(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        limit: u32,
        before: Option<MessageCursor>,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let membership =
                membership_inner(conn, group_id, user_id)?.ok_or(StoreError::NotAMember)?;
            let floor = to_millis(membership.joined_at);

            let mut rows = match before {
                Some(before) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM messages
                         WHERE group_id = ?1 AND created_at >= ?2
                           AND (created_at < ?3 OR (created_at = ?3 AND seq < ?4))
                         ORDER BY created_at DESC, seq DESC LIMIT ?5",
                        MESSAGE_COLUMNS
                    ))?;
                    stmt.query_map(
                        params![
                            group_id.to_string(),
                            floor,
                            to_millis(before.created_at),
                            before.seq,
                            limit
                        ],
                        message_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM messages
                         WHERE group_id = ?1 AND created_at >= ?2
                         ORDER BY created_at DESC, seq DESC LIMIT ?3",
                        MESSAGE_COLUMNS
                    ))?;
                    stmt.query_map(
                        params![group_id.to_string(), floor, limit],
                        message_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };

            rows.reverse();
            Ok(rows)
        })
    }

    /// Direct history between `user_id` and `other_id`, oldest first.
    /// Visibility is participation; there is no time floor.
    pub fn direct_messages(
        &self,
        user_id: Uuid,
        other_id: Uuid,
        limit: u32,
        before: Option<MessageCursor>,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let (me, other) = (user_id.to_string(), other_id.to_string());
            let mut rows = match before {
                Some(before) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM messages
                         WHERE ((sender_id = ?1 AND receiver_id = ?2)
                             OR (sender_id = ?2 AND receiver_id = ?1))
                           AND (created_at < ?3 OR (created_at = ?3 AND seq < ?4))
                         ORDER BY created_at DESC, seq DESC LIMIT ?5",
                        MESSAGE_COLUMNS
                    ))?;
                    stmt.query_map(
                        params![me, other, to_millis(before.created_at), before.seq, limit],
                        message_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {} FROM messages
                         WHERE (sender_id = ?1 AND receiver_id = ?2)
                            OR (sender_id = ?2 AND receiver_id = ?1)
                         ORDER BY created_at DESC, seq DESC LIMIT ?3",
                        MESSAGE_COLUMNS
                    ))?;
                    stmt.query_map(params![me, other, limit], message_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };

            rows.reverse();
            Ok(rows)
        })
    }
}

/// Whether `user_id` may see `message` at all: a participant for direct
/// messages, a member whose join-time floor admits it for group messages.
/// Reaction reads and writes go through this before touching the row.
pub(crate) fn ensure_viewer(conn: &Connection, user_id: Uuid, message: &Message) -> Result<()> {
    match message.conversation {
        ConversationRef::Direct(receiver_id) => {
            if message.sender_id == user_id || receiver_id == user_id {
                Ok(())
            } else {
                Err(StoreError::NotAMember)
            }
        }
        ConversationRef::Group(group_id) => {
            let membership =
                membership_inner(conn, group_id, user_id)?.ok_or(StoreError::NotAMember)?;
            if message.created_at >= membership.joined_at {
                Ok(())
            } else {
                Err(StoreError::NotAMember)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::NewMessage;
    use crate::testutil::{befriend, group_of, new_db, user};
    use huddle_types::models::{ConversationRef, MessageKind};

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn say(db: &Database, sender: Uuid, group_id: Uuid, text: &str, at: DateTime<Utc>) -> Message {
        db.send(
            NewMessage {
                sender_id: sender,
                conversation: ConversationRef::Group(group_id),
                content: text.into(),
                kind: MessageKind::Text,
                file_id: None,
                file_name: None,
            },
            at,
        )
        .unwrap()
    }

    #[test]
    fn join_time_floor_hides_prior_history() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let group_id = group_of(&db, alice, &[]);

        say(&db, alice, group_id, "before bob", ts(50));

        befriend(&db, alice, bob);
        db.add_members(alice, group_id, &[bob], ts(100)).unwrap();

        say(&db, alice, group_id, "after bob", ts(150));

        let visible = db.group_messages(bob, group_id, 100, None).unwrap();
        let contents: Vec<&str> = visible.iter().map(|m| m.content.as_str()).collect();
        assert!(!contents.contains(&"before bob"));
        assert!(contents.contains(&"after bob"));

        // alice sees everything back to her own join
        let all = db.group_messages(alice, group_id, 100, None).unwrap();
        assert!(all.iter().any(|m| m.content == "before bob"));
    }

    #[test]
    fn message_at_exactly_join_time_is_visible() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let group_id = group_of(&db, alice, &[]);

        befriend(&db, alice, bob);
        db.add_members(alice, group_id, &[bob], ts(100)).unwrap();
        say(&db, alice, group_id, "same instant", ts(100));

        let visible = db.group_messages(bob, group_id, 100, None).unwrap();
        assert!(visible.iter().any(|m| m.content == "same instant"));
    }

    #[test]
    fn rejoin_resets_the_floor() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let group_id = group_of(&db, alice, &[]);

        befriend(&db, alice, bob);
        db.add_members(alice, group_id, &[bob], ts(100)).unwrap();
        say(&db, alice, group_id, "first stint", ts(200));

        db.remove_member(bob, group_id, bob, ts(300)).unwrap();
        say(&db, alice, group_id, "while gone", ts(400));

        db.add_members(alice, group_id, &[bob], ts(500)).unwrap();
        say(&db, alice, group_id, "second stint", ts(600));

        let visible = db.group_messages(bob, group_id, 100, None).unwrap();
        let contents: Vec<&str> = visible
            .iter()
            .filter(|m| m.kind == MessageKind::Text)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["second stint"]);
    }

    #[test]
    fn non_member_gets_no_history() {
        let db = new_db();
        let alice = user(&db, "alice");
        let outsider = user(&db, "outsider");
        let group_id = group_of(&db, alice, &[]);

        assert!(matches!(
            db.group_messages(outsider, group_id, 100, None),
            Err(StoreError::NotAMember)
        ));
    }

    #[test]
    fn ordering_is_ascending_with_seq_tiebreak() {
        let db = new_db();
        let alice = user(&db, "alice");
        let group_id = group_of(&db, alice, &[]);

        // same millisecond: insertion order must decide
        say(&db, alice, group_id, "first", ts(1000));
        say(&db, alice, group_id, "second", ts(1000));
        say(&db, alice, group_id, "third", ts(1000));

        let visible = db.group_messages(alice, group_id, 100, None).unwrap();
        let tied: Vec<&str> = visible
            .iter()
            .filter(|m| m.kind == MessageKind::Text)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(tied, vec!["first", "second", "third"]);
    }

    #[test]
    fn before_cursor_pages_backwards() {
        let db = new_db();
        let alice = user(&db, "alice");
        let group_id = group_of(&db, alice, &[]);

        for i in 0..5 {
            say(&db, alice, group_id, &format!("m{}", i), ts(1000 + i * 10));
        }

        let latest = db.group_messages(alice, group_id, 2, None).unwrap();
        let contents: Vec<&str> = latest.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);

        let older = db
            .group_messages(alice, group_id, 2, Some(MessageCursor::of(&latest[0])))
            .unwrap();
        let contents: Vec<&str> = older.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2"]);
    }

    #[test]
    fn before_cursor_keeps_same_millisecond_messages_reachable() {
        let db = new_db();
        let alice = user(&db, "alice");
        let group_id = group_of(&db, alice, &[]);

        say(&db, alice, group_id, "first", ts(1000));
        say(&db, alice, group_id, "second", ts(1000));
        say(&db, alice, group_id, "third", ts(1000));

        let page = db.group_messages(alice, group_id, 2, None).unwrap();
        let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "third"]);

        let older = db
            .group_messages(alice, group_id, 2, Some(MessageCursor::of(&page[0])))
            .unwrap();
        let contents: Vec<&str> = older
            .iter()
            .filter(|m| m.kind == MessageKind::Text)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["first"]);
    }

    #[test]
    fn direct_history_is_shared_between_the_pair() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");
        befriend(&db, alice, bob);
        befriend(&db, alice, carol);

        db.send(
            NewMessage {
                sender_id: alice,
                conversation: ConversationRef::Direct(bob),
                content: "to bob".into(),
                kind: MessageKind::Text,
                file_id: None,
                file_name: None,
            },
            ts(100),
        )
        .unwrap();
        db.send(
            NewMessage {
                sender_id: bob,
                conversation: ConversationRef::Direct(alice),
                content: "reply".into(),
                kind: MessageKind::Text,
                file_id: None,
                file_name: None,
            },
            ts(200),
        )
        .unwrap();
        db.send(
            NewMessage {
                sender_id: alice,
                conversation: ConversationRef::Direct(carol),
                content: "to carol".into(),
                kind: MessageKind::Text,
                file_id: None,
                file_name: None,
            },
            ts(300),
        )
        .unwrap();

        let bobs_view = db.direct_messages(bob, alice, 100, None).unwrap();
        let contents: Vec<&str> = bobs_view.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["to bob", "reply"]);
    }
}
