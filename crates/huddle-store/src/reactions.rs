//! Reactions: at most one per (message, user). Reacting again replaces the
//! existing row; removing a reaction that is not there is a no-op.
//!
//! Every operation here runs behind the same visibility check as message
//! history: only a participant (direct) or a member whose join-time floor
//! admits the message (group) may react or read the summary.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use huddle_types::models::{Reaction, ReactionGroup, ReactionKind};

use crate::messages::get_message_inner;
use crate::models::{parse_reaction_kind_col, to_millis};
use crate::visibility::ensure_viewer;
use crate::{Database, Result, StoreError};

impl Database {
    /// Upsert: a second react from the same user updates kind, glyph and
    /// timestamp in place instead of inserting a duplicate.
    pub fn react(
        &self,
        user_id: Uuid,
        message_id: Uuid,
        kind: ReactionKind,
        glyph: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Reaction> {
        self.with_conn(|conn| {
            let message =
                get_message_inner(conn, message_id)?.ok_or(StoreError::NotFound("message"))?;
            ensure_viewer(conn, user_id, &message)?;

            conn.execute(
                "INSERT INTO reactions (message_id, user_id, kind, glyph, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (message_id, user_id) DO UPDATE SET
                     kind = excluded.kind,
                     glyph = excluded.glyph,
                     created_at = excluded.created_at",
                params![
                    message_id.to_string(),
                    user_id.to_string(),
                    kind.as_str(),
                    glyph,
                    to_millis(now),
                ],
            )?;

            Ok(Reaction {
                message_id,
                user_id,
                kind,
                glyph: glyph.map(str::to_string),
                created_at: now,
            })
        })
    }

    /// Returns whether a reaction was actually removed. Absence is not an
    /// error, but the message must still be visible to the caller.
    pub fn unreact(&self, user_id: Uuid, message_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let Some(message) = get_message_inner(conn, message_id)? else {
                return Ok(false);
            };
            ensure_viewer(conn, user_id, &message)?;

            let removed = conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                params![message_id.to_string(), user_id.to_string()],
            )?;
            Ok(removed > 0)
        })
    }

    /// Per-(kind, glyph) buckets sorted by count descending, ties broken by
    /// which bucket was reacted to first. `me` flags the requester's own
    /// reaction.
    pub fn reaction_summary(
        &self,
        message_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Vec<ReactionGroup>> {
        self.with_conn(|conn| {
            let message =
                get_message_inner(conn, message_id)?.ok_or(StoreError::NotFound("message"))?;
            ensure_viewer(conn, requester_id, &message)?;

            let mut stmt = conn.prepare(
                "SELECT kind, glyph, COUNT(*),
                        MAX(CASE WHEN user_id = ?2 THEN 1 ELSE 0 END)
                 FROM reactions
                 WHERE message_id = ?1
                 GROUP BY kind, glyph
                 ORDER BY COUNT(*) DESC, MIN(created_at) ASC",
            )?;
            let rows = stmt
                .query_map(
                    params![message_id.to_string(), requester_id.to_string()],
                    |row| {
                        Ok(ReactionGroup {
                            kind: parse_reaction_kind_col(row, 0)?,
                            glyph: row.get(1)?,
                            count: row.get::<_, i64>(2)? as usize,
                            me: row.get::<_, i64>(3)? != 0,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::NewMessage;
    use crate::testutil::{befriend, group_of, new_db, user};
    use huddle_types::models::{ConversationRef, MessageKind};

    fn setup() -> (Database, Uuid, Uuid, Uuid) {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        befriend(&db, alice, bob);
        let msg = db
            .send(
                NewMessage {
                    sender_id: alice,
                    conversation: ConversationRef::Direct(bob),
                    content: "react to this".into(),
                    kind: MessageKind::Text,
                    file_id: None,
                    file_name: None,
                },
                Utc::now(),
            )
            .unwrap();
        (db, alice, bob, msg.id)
    }

    #[test]
    fn react_then_switch_updates_in_place() {
        let (db, _alice, bob, msg) = setup();

        db.react(bob, msg, ReactionKind::Love, None, Utc::now()).unwrap();
        let summary = db.reaction_summary(msg, bob).unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].kind, ReactionKind::Love);
        assert_eq!(summary[0].count, 1);
        assert!(summary[0].me);

        // switching replaces, never duplicates
        db.react(bob, msg, ReactionKind::Laugh, None, Utc::now()).unwrap();
        let summary = db.reaction_summary(msg, bob).unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].kind, ReactionKind::Laugh);
        assert_eq!(summary[0].count, 1);
    }

    #[test]
    fn summary_sorts_by_count_then_first_created() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");
        let dave = user(&db, "dave");
        let group_id = group_of(&db, alice, &[bob, carol, dave]);

        let t = |ms| DateTime::from_timestamp_millis(ms).unwrap();
        let msg = db
            .send(
                NewMessage {
                    sender_id: alice,
                    conversation: ConversationRef::Group(group_id),
                    content: "react to this".into(),
                    kind: MessageKind::Text,
                    file_id: None,
                    file_name: None,
                },
                t(50),
            )
            .unwrap()
            .id;

        db.react(alice, msg, ReactionKind::Wow, None, t(100)).unwrap();
        db.react(bob, msg, ReactionKind::Love, None, t(200)).unwrap();
        db.react(carol, msg, ReactionKind::Love, None, t(300)).unwrap();
        db.react(dave, msg, ReactionKind::Laugh, None, t(400)).unwrap();

        let summary = db.reaction_summary(msg, dave).unwrap();
        let kinds: Vec<_> = summary.iter().map(|g| g.kind.clone()).collect();
        // love wins on count; wow beats laugh on first-created
        assert_eq!(
            kinds,
            vec![ReactionKind::Love, ReactionKind::Wow, ReactionKind::Laugh]
        );
        assert!(!summary[0].me);
        assert!(summary[2].me);
    }

    #[test]
    fn custom_glyphs_bucket_separately() {
        let (db, alice, bob, msg) = setup();

        db.react(alice, msg, ReactionKind::Custom, Some("🎉"), Utc::now()).unwrap();
        db.react(bob, msg, ReactionKind::Custom, Some("🚀"), Utc::now()).unwrap();

        let summary = db.reaction_summary(msg, alice).unwrap();
        assert_eq!(summary.len(), 2);
        let glyphs: Vec<_> = summary.iter().filter_map(|g| g.glyph.clone()).collect();
        assert!(glyphs.contains(&"🎉".to_string()));
        assert!(glyphs.contains(&"🚀".to_string()));
    }

    #[test]
    fn unreact_is_a_noop_when_absent() {
        let (db, _alice, bob, msg) = setup();

        assert!(!db.unreact(bob, msg).unwrap());

        db.react(bob, msg, ReactionKind::Like, None, Utc::now()).unwrap();
        assert!(db.unreact(bob, msg).unwrap());
        assert!(!db.unreact(bob, msg).unwrap());
        assert!(db.reaction_summary(msg, bob).unwrap().is_empty());
    }

    #[test]
    fn react_to_missing_message_fails() {
        let (db, _alice, bob, _msg) = setup();
        assert!(matches!(
            db.react(bob, Uuid::new_v4(), ReactionKind::Like, None, Utc::now()),
            Err(StoreError::NotFound("message"))
        ));
    }

    #[test]
    fn direct_message_reactions_are_participants_only() {
        let (db, alice, _bob, msg) = setup();
        let carol = user(&db, "carol");
        db.react(alice, msg, ReactionKind::Like, None, Utc::now()).unwrap();

        assert!(matches!(
            db.react(carol, msg, ReactionKind::Love, None, Utc::now()),
            Err(StoreError::NotAMember)
        ));
        assert!(matches!(
            db.reaction_summary(msg, carol),
            Err(StoreError::NotAMember)
        ));
        assert!(matches!(db.unreact(carol, msg), Err(StoreError::NotAMember)));

        let summary = db.reaction_summary(msg, alice).unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].count, 1);
    }

    #[test]
    fn group_reactions_require_membership_and_the_visibility_floor() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let outsider = user(&db, "outsider");
        let group_id = group_of(&db, alice, &[]);

        let t = |ms| DateTime::from_timestamp_millis(ms).unwrap();
        let msg = db
            .send(
                NewMessage {
                    sender_id: alice,
                    conversation: ConversationRef::Group(group_id),
                    content: "before bob".into(),
                    kind: MessageKind::Text,
                    file_id: None,
                    file_name: None,
                },
                t(100),
            )
            .unwrap()
            .id;

        assert!(matches!(
            db.react(outsider, msg, ReactionKind::Like, None, Utc::now()),
            Err(StoreError::NotAMember)
        ));
        assert!(matches!(
            db.reaction_summary(msg, outsider),
            Err(StoreError::NotAMember)
        ));

        // bob joins after the message; it sits below his floor
        befriend(&db, alice, bob);
        db.add_members(alice, group_id, &[bob], t(200)).unwrap();
        assert!(matches!(
            db.react(bob, msg, ReactionKind::Like, None, Utc::now()),
            Err(StoreError::NotAMember)
        ));

        // a message bob can see is fair game
        let visible = db
            .send(
                NewMessage {
                    sender_id: alice,
                    conversation: ConversationRef::Group(group_id),
                    content: "after bob".into(),
                    kind: MessageKind::Text,
                    file_id: None,
                    file_name: None,
                },
                t(300),
            )
            .unwrap()
            .id;
        db.react(bob, visible, ReactionKind::Like, None, Utc::now()).unwrap();
        assert_eq!(db.reaction_summary(visible, bob).unwrap().len(), 1);
    }
}
