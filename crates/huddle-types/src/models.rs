use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Which conversation a message belongs to. Exactly one of the two —
/// the store rejects anything else with `InvalidTarget`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConversationRef {
    /// 1:1 conversation with the given user.
    Direct(Uuid),
    /// Group conversation.
    Group(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    pub is_private: bool,
    /// Denormalized; maintained transactionally with membership mutations.
    /// Never consulted for the sole-admin check.
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Emoji,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Emoji => "emoji",
            MessageKind::File => "file",
            MessageKind::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<MessageKind> {
        match s {
            "text" => Some(MessageKind::Text),
            "emoji" => Some(MessageKind::Emoji),
            "file" => Some(MessageKind::File),
            "system" => Some(MessageKind::System),
            _ => None,
        }
    }

    /// Only text and emoji messages can be edited.
    pub fn editable(&self) -> bool {
        matches!(self, MessageKind::Text | MessageKind::Emoji)
    }
}

/// Structured tag on system messages. Replaces content-string matching for
/// read-state exclusions: a `MemberAdded` message about a user never counts
/// as unread for that user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEventKind {
    GroupCreated,
    MemberAdded,
    MemberRemoved,
    MemberLeft,
    RoleChanged,
    GroupUpdated,
}

impl SystemEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemEventKind::GroupCreated => "group_created",
            SystemEventKind::MemberAdded => "member_added",
            SystemEventKind::MemberRemoved => "member_removed",
            SystemEventKind::MemberLeft => "member_left",
            SystemEventKind::RoleChanged => "role_changed",
            SystemEventKind::GroupUpdated => "group_updated",
        }
    }

    pub fn parse(s: &str) -> Option<SystemEventKind> {
        match s {
            "group_created" => Some(SystemEventKind::GroupCreated),
            "member_added" => Some(SystemEventKind::MemberAdded),
            "member_removed" => Some(SystemEventKind::MemberRemoved),
            "member_left" => Some(SystemEventKind::MemberLeft),
            "role_changed" => Some(SystemEventKind::RoleChanged),
            "group_updated" => Some(SystemEventKind::GroupUpdated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    /// Insertion sequence; tiebreaker for messages created in the same
    /// millisecond so ordering and pagination stay deterministic.
    pub seq: i64,
    pub sender_id: Uuid,
    pub conversation: ConversationRef,
    pub content: String,
    pub kind: MessageKind,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    /// Direct messages only; group read state lives in read records.
    pub is_read: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub system_kind: Option<SystemEventKind>,
    /// Users a system message is about (the added/removed/promoted members).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system_subjects: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    Love,
    Laugh,
    Wow,
    Sad,
    Angry,
    /// Arbitrary glyph carried alongside the row.
    Custom,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Love => "love",
            ReactionKind::Laugh => "laugh",
            ReactionKind::Wow => "wow",
            ReactionKind::Sad => "sad",
            ReactionKind::Angry => "angry",
            ReactionKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<ReactionKind> {
        match s {
            "like" => Some(ReactionKind::Like),
            "love" => Some(ReactionKind::Love),
            "laugh" => Some(ReactionKind::Laugh),
            "wow" => Some(ReactionKind::Wow),
            "sad" => Some(ReactionKind::Sad),
            "angry" => Some(ReactionKind::Angry),
            "custom" => Some(ReactionKind::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub kind: ReactionKind,
    pub glyph: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One bucket of the per-message reaction summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub kind: ReactionKind,
    pub glyph: Option<String>,
    pub count: usize,
    pub me: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRecord {
    pub group_id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Pending,
    Accepted,
}

impl ContactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactStatus::Pending => "pending",
            ContactStatus::Accepted => "accepted",
        }
    }

    pub fn parse(s: &str) -> Option<ContactStatus> {
        match s {
            "pending" => Some(ContactStatus::Pending),
            "accepted" => Some(ContactStatus::Accepted),
            _ => None,
        }
    }
}
