//! Group membership: creation, member adds/removals, role transitions.
//!
//! The load-bearing invariant is that a group always keeps at least one
//! admin. Every mutation that could break it re-queries the live admin
//! count inside the same transaction it commits with, so two concurrent
//! demotions cannot both observe "more than one admin" and leave zero.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use huddle_types::models::{Group, Membership, Role, SystemEventKind};

use crate::contacts::are_contacts_inner;
use crate::messages::append_system_message;
use crate::models::{group_from_row, membership_from_row, to_millis};
use crate::users::{user_exists, username_or_unknown};
use crate::{Database, Result, StoreError};

const GROUP_COLUMNS: &str =
    "id, name, description, creator_id, is_private, member_count, created_at";

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub description: Option<String>,
    pub is_private: bool,
    /// Initial members beyond the creator. Anyone who is not an accepted
    /// contact of the creator is silently skipped.
    pub member_ids: Vec<Uuid>,
}

/// One authorization path shared by admin-removal and self-leave.
/// Permission is checked before the invariant so a bystander probing the
/// sole admin gets `PermissionDenied`, not a membership detail.
fn authorize_removal(actor_role: Role, is_self: bool, target_is_sole_admin: bool) -> Result<()> {
    if !is_self && actor_role != Role::Admin {
        return Err(StoreError::PermissionDenied);
    }
    if target_is_sole_admin {
        return Err(StoreError::LastAdminViolation);
    }
    Ok(())
}

impl Database {
    /// Creates the group, seats the creator as admin, and adds every listed
    /// member who is an accepted contact of the creator. Commits together
    /// with a "group created" system message.
    pub fn create_group(
        &self,
        creator_id: Uuid,
        params_in: NewGroup,
        now: DateTime<Utc>,
    ) -> Result<Group> {
        let name = params_in.name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("group name must not be empty"));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if !user_exists(&tx, creator_id)? {
                return Err(StoreError::NotFound("user"));
            }

            let group_id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO groups (id, name, description, creator_id, is_private, member_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                params![
                    group_id.to_string(),
                    name,
                    params_in.description,
                    creator_id.to_string(),
                    params_in.is_private,
                    to_millis(now),
                ],
            )?;

            insert_membership(&tx, group_id, creator_id, Role::Admin, now)?;

            let mut added = Vec::new();
            for member_id in params_in.member_ids {
                if member_id == creator_id || added.contains(&member_id) {
                    continue;
                }
                // non-contacts are skipped by policy, not rejected
                if !user_exists(&tx, member_id)? || !are_contacts_inner(&tx, creator_id, member_id)? {
                    debug!(%group_id, %member_id, "skipping non-contact initial member");
                    continue;
                }
                insert_membership(&tx, group_id, member_id, Role::Member, now)?;
                added.push(member_id);
            }

            let member_count = 1 + added.len() as i64;
            tx.execute(
                "UPDATE groups SET member_count = ?1 WHERE id = ?2",
                params![member_count, group_id.to_string()],
            )?;

            let creator_name = username_or_unknown(&tx, creator_id);
            append_system_message(
                &tx,
                group_id,
                creator_id,
                &format!("{} created the group \"{}\"", creator_name, name),
                SystemEventKind::GroupCreated,
                &added,
                now,
            )?;

            let group = get_group_inner(&tx, group_id)?.ok_or(StoreError::NotFound("group"))?;
            tx.commit()?;
            Ok(group)
        })
    }

    /// Admin-only. Targets already in the group or not contacts of the
    /// actor are skipped. Returns the ids actually added; one aggregated
    /// system message announces them when the list is non-empty.
    pub fn add_members(
        &self,
        actor_id: Uuid,
        group_id: Uuid,
        member_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let actor = membership_inner(&tx, group_id, actor_id)?.ok_or(StoreError::NotAMember)?;
            if actor.role != Role::Admin {
                return Err(StoreError::PermissionDenied);
            }

            let mut added = Vec::new();
            for &member_id in member_ids {
                if added.contains(&member_id) {
                    continue;
                }
                if membership_inner(&tx, group_id, member_id)?.is_some() {
                    continue;
                }
                if !user_exists(&tx, member_id)? || !are_contacts_inner(&tx, actor_id, member_id)? {
                    debug!(%group_id, %member_id, "skipping non-contact add");
                    continue;
                }
                insert_membership(&tx, group_id, member_id, Role::Member, now)?;
                added.push(member_id);
            }

            if !added.is_empty() {
                tx.execute(
                    "UPDATE groups SET member_count = member_count + ?1 WHERE id = ?2",
                    params![added.len() as i64, group_id.to_string()],
                )?;

                let actor_name = username_or_unknown(&tx, actor_id);
                let names: Vec<String> = added
                    .iter()
                    .map(|&id| username_or_unknown(&tx, id))
                    .collect();
                append_system_message(
                    &tx,
                    group_id,
                    actor_id,
                    &format!("{} added {}", actor_name, names.join(", ")),
                    SystemEventKind::MemberAdded,
                    &added,
                    now,
                )?;
            }

            tx.commit()?;
            Ok(added)
        })
    }

    /// Removal by an admin, or self-leave (same authorization path).
    /// Removing the sole admin is rejected either way.
    pub fn remove_member(
        &self,
        actor_id: Uuid,
        group_id: Uuid,
        target_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let actor = membership_inner(&tx, group_id, actor_id)?.ok_or(StoreError::NotAMember)?;
            let target =
                membership_inner(&tx, group_id, target_id)?.ok_or(StoreError::NotFound("member"))?;

            let is_self = actor_id == target_id;
            let sole_admin = target.role == Role::Admin && admin_count(&tx, group_id)? <= 1;
            authorize_removal(actor.role, is_self, sole_admin)?;

            tx.execute(
                "DELETE FROM memberships WHERE group_id = ?1 AND user_id = ?2",
                params![group_id.to_string(), target_id.to_string()],
            )?;
            tx.execute(
                "UPDATE groups SET member_count = member_count - 1 WHERE id = ?1",
                [group_id.to_string()],
            )?;

            let target_name = username_or_unknown(&tx, target_id);
            let (content, event) = if is_self {
                (format!("{} left the group", target_name), SystemEventKind::MemberLeft)
            } else {
                let actor_name = username_or_unknown(&tx, actor_id);
                (
                    format!("{} removed {}", actor_name, target_name),
                    SystemEventKind::MemberRemoved,
                )
            };
            append_system_message(&tx, group_id, actor_id, &content, event, &[target_id], now)?;

            tx.commit()?;
            Ok(())
        })
    }

    /// Admin-only role transition. Demoting the sole remaining admin is
    /// rejected, including self-demotion.
    pub fn set_role(
        &self,
        actor_id: Uuid,
        group_id: Uuid,
        target_id: Uuid,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let actor = membership_inner(&tx, group_id, actor_id)?.ok_or(StoreError::NotAMember)?;
            if actor.role != Role::Admin {
                return Err(StoreError::PermissionDenied);
            }
            let target =
                membership_inner(&tx, group_id, target_id)?.ok_or(StoreError::NotFound("member"))?;

            if target.role == role {
                // nothing to do
                tx.commit()?;
                return Ok(());
            }

            // live count, same transaction: this is the demotion race guard
            if target.role == Role::Admin
                && role == Role::Member
                && admin_count(&tx, group_id)? <= 1
            {
                return Err(StoreError::LastAdminViolation);
            }

            tx.execute(
                "UPDATE memberships SET role = ?1 WHERE group_id = ?2 AND user_id = ?3",
                params![role.as_str(), group_id.to_string(), target_id.to_string()],
            )?;

            let actor_name = username_or_unknown(&tx, actor_id);
            let target_name = username_or_unknown(&tx, target_id);
            let content = match role {
                Role::Admin => format!("{} made {} an admin", actor_name, target_name),
                Role::Member => format!("{} made {} a member", actor_name, target_name),
            };
            append_system_message(
                &tx,
                group_id,
                actor_id,
                &content,
                SystemEventKind::RoleChanged,
                &[target_id],
                now,
            )?;

            tx.commit()?;
            Ok(())
        })
    }

    /// Admin-only rename/re-describe. Empty or whitespace names are rejected.
    pub fn update_group_details(
        &self,
        actor_id: Uuid,
        group_id: Uuid,
        name: Option<&str>,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Group> {
        let name = match name {
            Some(n) => {
                let n = n.trim();
                if n.is_empty() {
                    return Err(StoreError::InvalidInput("group name must not be empty"));
                }
                Some(n.to_string())
            }
            None => None,
        };

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let actor = membership_inner(&tx, group_id, actor_id)?.ok_or(StoreError::NotAMember)?;
            if actor.role != Role::Admin {
                return Err(StoreError::PermissionDenied);
            }

            if let Some(ref name) = name {
                tx.execute(
                    "UPDATE groups SET name = ?1 WHERE id = ?2",
                    params![name, group_id.to_string()],
                )?;
                let actor_name = username_or_unknown(&tx, actor_id);
                append_system_message(
                    &tx,
                    group_id,
                    actor_id,
                    &format!("{} renamed the group to \"{}\"", actor_name, name),
                    SystemEventKind::GroupUpdated,
                    &[],
                    now,
                )?;
            }
            if let Some(description) = description {
                tx.execute(
                    "UPDATE groups SET description = ?1 WHERE id = ?2",
                    params![description, group_id.to_string()],
                )?;
            }

            let group = get_group_inner(&tx, group_id)?.ok_or(StoreError::NotFound("group"))?;
            tx.commit()?;
            Ok(group)
        })
    }

    pub fn get_group(&self, group_id: Uuid) -> Result<Option<Group>> {
        self.with_conn(|conn| Ok(get_group_inner(conn, group_id)?))
    }

    pub fn get_membership(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<Membership>> {
        self.with_conn(|conn| Ok(membership_inner(conn, group_id, user_id)?))
    }

    pub fn list_members(&self, group_id: Uuid) -> Result<Vec<Membership>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT group_id, user_id, role, joined_at FROM memberships
                 WHERE group_id = ?1 ORDER BY joined_at ASC, user_id ASC",
            )?;
            let rows = stmt
                .query_map([group_id.to_string()], membership_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn groups_for_user(&self, user_id: Uuid) -> Result<Vec<Group>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, g.description, g.creator_id, g.is_private,
                        g.member_count, g.created_at
                 FROM groups g
                 JOIN memberships m ON m.group_id = g.id
                 WHERE m.user_id = ?1 ORDER BY g.created_at ASC",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], group_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn insert_membership(
    conn: &Connection,
    group_id: Uuid,
    user_id: Uuid,
    role: Role,
    joined_at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO memberships (group_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            group_id.to_string(),
            user_id.to_string(),
            role.as_str(),
            to_millis(joined_at),
        ],
    )?;
    Ok(())
}

pub(crate) fn membership_inner(
    conn: &Connection,
    group_id: Uuid,
    user_id: Uuid,
) -> rusqlite::Result<Option<Membership>> {
    conn.query_row(
        "SELECT group_id, user_id, role, joined_at FROM memberships
         WHERE group_id = ?1 AND user_id = ?2",
        params![group_id.to_string(), user_id.to_string()],
        membership_from_row,
    )
    .optional()
}

fn admin_count(conn: &Connection, group_id: Uuid) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM memberships WHERE group_id = ?1 AND role = 'admin'",
        [group_id.to_string()],
        |row| row.get(0),
    )
}

fn get_group_inner(conn: &Connection, group_id: Uuid) -> rusqlite::Result<Option<Group>> {
    conn.query_row(
        &format!("SELECT {} FROM groups WHERE id = ?1", GROUP_COLUMNS),
        [group_id.to_string()],
        group_from_row,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{befriend, group_of, new_db, user};
    use huddle_types::models::MessageKind;

    fn last_group_message(db: &Database, group_id: Uuid) -> huddle_types::models::Message {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                &format!(
                    "SELECT {} FROM messages WHERE group_id = ?1 ORDER BY seq DESC LIMIT 1",
                    crate::messages::MESSAGE_COLUMNS
                ),
                [group_id.to_string()],
                crate::models::message_from_row,
            )?)
        })
        .unwrap()
    }

    #[test]
    fn create_group_seats_creator_as_admin_and_skips_non_contacts() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let stranger = user(&db, "stranger");
        befriend(&db, alice, bob);

        let group = db
            .create_group(
                alice,
                NewGroup {
                    name: "  book club  ".into(),
                    description: Some("tuesdays".into()),
                    is_private: true,
                    member_ids: vec![bob, stranger, alice],
                },
                Utc::now(),
            )
            .unwrap();

        assert_eq!(group.name, "book club");
        assert_eq!(group.member_count, 2); // creator + bob; stranger skipped

        let creator = db.get_membership(group.id, alice).unwrap().unwrap();
        assert_eq!(creator.role, Role::Admin);
        let member = db.get_membership(group.id, bob).unwrap().unwrap();
        assert_eq!(member.role, Role::Member);
        assert!(db.get_membership(group.id, stranger).unwrap().is_none());

        let announcement = last_group_message(&db, group.id);
        assert_eq!(announcement.kind, MessageKind::System);
        assert_eq!(announcement.system_kind, Some(SystemEventKind::GroupCreated));
        assert_eq!(announcement.system_subjects, vec![bob]);
    }

    #[test]
    fn empty_group_name_rejected() {
        let db = new_db();
        let alice = user(&db, "alice");
        let result = db.create_group(
            alice,
            NewGroup {
                name: "   ".into(),
                description: None,
                is_private: false,
                member_ids: vec![],
            },
            Utc::now(),
        );
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    }

    #[test]
    fn add_members_is_admin_only_and_aggregates_announcement() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");
        let dave = user(&db, "dave");
        let group_id = group_of(&db, alice, &[bob]);

        // bob is a plain member
        assert!(matches!(
            db.add_members(bob, group_id, &[carol], Utc::now()),
            Err(StoreError::PermissionDenied)
        ));
        // carol is no member at all
        assert!(matches!(
            db.add_members(carol, group_id, &[dave], Utc::now()),
            Err(StoreError::NotAMember)
        ));

        befriend(&db, alice, carol);
        befriend(&db, alice, dave);
        let added = db
            .add_members(alice, group_id, &[carol, dave, bob], Utc::now())
            .unwrap();
        assert_eq!(added, vec![carol, dave]); // bob already a member

        let group = db.get_group(group_id).unwrap().unwrap();
        assert_eq!(group.member_count, 4);

        let announcement = last_group_message(&db, group_id);
        assert_eq!(announcement.system_kind, Some(SystemEventKind::MemberAdded));
        assert_eq!(announcement.system_subjects, vec![carol, dave]);
    }

    #[test]
    fn add_members_with_nothing_to_add_emits_no_announcement() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let group_id = group_of(&db, alice, &[bob]);

        let before = last_group_message(&db, group_id).seq;
        let added = db.add_members(alice, group_id, &[bob], Utc::now()).unwrap();
        assert!(added.is_empty());
        assert_eq!(last_group_message(&db, group_id).seq, before);
    }

    #[test]
    fn sole_admin_cannot_be_removed_or_demoted() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let group_id = group_of(&db, alice, &[bob]);

        // self-demotion of the only admin
        assert!(matches!(
            db.set_role(alice, group_id, alice, Role::Member, Utc::now()),
            Err(StoreError::LastAdminViolation)
        ));
        // self-leave of the only admin goes through the same gate
        assert!(matches!(
            db.remove_member(alice, group_id, alice, Utc::now()),
            Err(StoreError::LastAdminViolation)
        ));

        // promote bob, then the same operations succeed
        db.set_role(alice, group_id, bob, Role::Admin, Utc::now()).unwrap();
        db.set_role(alice, group_id, alice, Role::Member, Utc::now()).unwrap();

        let alice_membership = db.get_membership(group_id, alice).unwrap().unwrap();
        assert_eq!(alice_membership.role, Role::Member);
    }

    #[test]
    fn remove_member_and_self_leave() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let carol = user(&db, "carol");
        let group_id = group_of(&db, alice, &[bob, carol]);

        // a member cannot remove someone else
        assert!(matches!(
            db.remove_member(bob, group_id, carol, Utc::now()),
            Err(StoreError::PermissionDenied)
        ));

        // but may leave on their own
        db.remove_member(bob, group_id, bob, Utc::now()).unwrap();
        assert!(db.get_membership(group_id, bob).unwrap().is_none());
        let left = last_group_message(&db, group_id);
        assert_eq!(left.system_kind, Some(SystemEventKind::MemberLeft));

        // admin removal of a member
        db.remove_member(alice, group_id, carol, Utc::now()).unwrap();
        assert!(db.get_membership(group_id, carol).unwrap().is_none());
        let removed = last_group_message(&db, group_id);
        assert_eq!(removed.system_kind, Some(SystemEventKind::MemberRemoved));
        assert_eq!(removed.system_subjects, vec![carol]);

        let group = db.get_group(group_id).unwrap().unwrap();
        assert_eq!(group.member_count, 1);
    }

    #[test]
    fn removing_an_admin_with_a_second_admin_present_succeeds() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let group_id = group_of(&db, alice, &[bob]);

        db.set_role(alice, group_id, bob, Role::Admin, Utc::now()).unwrap();
        db.remove_member(bob, group_id, alice, Utc::now()).unwrap();
        assert!(db.get_membership(group_id, alice).unwrap().is_none());
    }

    #[test]
    fn rename_requires_admin_and_nonempty_name() {
        let db = new_db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        let group_id = group_of(&db, alice, &[bob]);

        assert!(matches!(
            db.update_group_details(bob, group_id, Some("coup"), None, Utc::now()),
            Err(StoreError::PermissionDenied)
        ));
        assert!(matches!(
            db.update_group_details(alice, group_id, Some("   "), None, Utc::now()),
            Err(StoreError::InvalidInput(_))
        ));

        let group = db
            .update_group_details(alice, group_id, Some("renamed"), Some("new blurb"), Utc::now())
            .unwrap();
        assert_eq!(group.name, "renamed");
        assert_eq!(group.description.as_deref(), Some("new blurb"));
    }
}
