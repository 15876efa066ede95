//! End-to-end store scenarios: a group's life from creation through
//! membership churn, messaging, read state and reactions, exercised through
//! the public API only.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use huddle_store::membership::NewGroup;
use huddle_store::messages::NewMessage;
use huddle_store::{Database, StoreError};
use huddle_types::models::{ConversationRef, MessageKind, ReactionKind, Role};

fn ts(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap()
}

fn user(db: &Database, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.create_user(id, name, "hash", ts(0)).unwrap();
    id
}

fn befriend(db: &Database, a: Uuid, b: Uuid) {
    db.request_contact(a, b, ts(0)).unwrap();
    db.accept_contact(b, a).unwrap();
}

fn group_message(db: &Database, sender: Uuid, group_id: Uuid, text: &str, at: DateTime<Utc>) -> Uuid {
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
    .id
}

fn admin_count(db: &Database, group_id: Uuid) -> usize {
    db.list_members(group_id)
        .unwrap()
        .iter()
        .filter(|m| m.role == Role::Admin)
        .count()
}

#[test]
fn group_lifecycle() {
    let db = Database::open_in_memory().unwrap();
    let ana = user(&db, "ana");
    let ben = user(&db, "ben");
    let cleo = user(&db, "cleo");
    befriend(&db, ana, ben);
    befriend(&db, ana, cleo);

    let group = db
        .create_group(
            ana,
            NewGroup {
                name: "climbing".into(),
                description: None,
                is_private: false,
                member_ids: vec![ben],
            },
            ts(0),
        )
        .unwrap();
    assert_eq!(group.member_count, 2);
    assert_eq!(admin_count(&db, group.id), 1);

    // early history, before cleo exists in the group
    group_message(&db, ana, group.id, "anyone up saturday?", ts(100));
    let replied = group_message(&db, ben, group.id, "yes!", ts(200));

    // cleo joins later; the floor hides what came before
    db.add_members(ana, group.id, &[cleo], ts(500)).unwrap();
    let visible_to_cleo = db.group_messages(cleo, group.id, 100, None).unwrap();
    assert!(visible_to_cleo
        .iter()
        .all(|m| m.created_at >= ts(500)));

    let welcome = group_message(&db, ana, group.id, "welcome cleo", ts(600));
    assert_eq!(db.group_unread_count(cleo, group.id).unwrap(), 1);
    db.mark_group_read(cleo, group.id, ts(700)).unwrap();
    assert_eq!(db.group_unread_count(cleo, group.id).unwrap(), 0);

    // reactions follow the same floor: ben's reply predates cleo's join
    assert!(matches!(
        db.react(cleo, replied, ReactionKind::Love, None, ts(800)),
        Err(StoreError::NotAMember)
    ));
    db.react(ana, welcome, ReactionKind::Love, None, ts(800)).unwrap();
    db.react(cleo, welcome, ReactionKind::Love, None, ts(810)).unwrap();
    let summary = db.reaction_summary(welcome, ana).unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].count, 2);
    assert!(summary[0].me);

    // promote, then the founder can step down and leave
    db.set_role(ana, group.id, ben, Role::Admin, ts(900)).unwrap();
    db.remove_member(ana, group.id, ana, ts(1000)).unwrap();
    assert_eq!(admin_count(&db, group.id), 1);
    assert_eq!(db.get_group(group.id).unwrap().unwrap().member_count, 2);

    // ben, now sole admin, is pinned
    assert!(matches!(
        db.remove_member(ben, group.id, ben, ts(1100)),
        Err(StoreError::LastAdminViolation)
    ));
}

#[test]
fn direct_send_is_contact_gated() {
    let db = Database::open_in_memory().unwrap();
    let ana = user(&db, "ana");
    let cleo = user(&db, "cleo");

    let attempt = NewMessage {
        sender_id: ana,
        conversation: ConversationRef::Direct(cleo),
        content: "hi".into(),
        kind: MessageKind::Text,
        file_id: None,
        file_name: None,
    };
    assert!(matches!(
        db.send(attempt.clone(), ts(10)),
        Err(StoreError::NotContacts)
    ));

    befriend(&db, ana, cleo);
    let sent = db.send(attempt, ts(20)).unwrap();

    assert_eq!(db.direct_unread_count(cleo, ana).unwrap(), 1);
    db.mark_direct_read(cleo, ana).unwrap();
    assert!(db.get_message(sent.id).unwrap().unwrap().is_read);
}

#[test]
fn admin_invariant_holds_across_churn() {
    let db = Database::open_in_memory().unwrap();
    let ana = user(&db, "ana");
    let ben = user(&db, "ben");
    let cleo = user(&db, "cleo");
    befriend(&db, ana, ben);
    befriend(&db, ana, cleo);

    let group = db
        .create_group(
            ana,
            NewGroup {
                name: "ops".into(),
                description: None,
                is_private: true,
                member_ids: vec![ben, cleo],
            },
            ts(0),
        )
        .unwrap();

    db.set_role(ana, group.id, ben, Role::Admin, ts(10)).unwrap();
    assert_eq!(admin_count(&db, group.id), 2);

    db.set_role(ben, group.id, ana, Role::Member, ts(20)).unwrap();
    assert_eq!(admin_count(&db, group.id), 1);

    // demoting the last admin is rejected, whoever asks
    assert!(matches!(
        db.set_role(ben, group.id, ben, Role::Member, ts(30)),
        Err(StoreError::LastAdminViolation)
    ));
    assert!(matches!(
        db.remove_member(ben, group.id, ben, ts(40)),
        Err(StoreError::LastAdminViolation)
    ));

    // admins can remove others freely
    db.remove_member(ben, group.id, cleo, ts(50)).unwrap();
    db.remove_member(ben, group.id, ana, ts(60)).unwrap();
    assert_eq!(admin_count(&db, group.id), 1);
    assert_eq!(db.get_group(group.id).unwrap().unwrap().member_count, 1);
}
