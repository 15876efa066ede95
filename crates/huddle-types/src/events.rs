use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageKind, ReactionGroup, Role, SystemEventKind};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A new message was committed to a conversation. Not emitted for
    /// system messages; those reach clients through MembershipChange.
    MessageCreate {
        id: Uuid,
        group_id: Option<Uuid>,
        receiver_id: Option<Uuid>,
        sender_id: Uuid,
        sender_username: String,
        /// Truncated content for notification surfaces.
        preview: String,
        kind: MessageKind,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A message was edited in place
    MessageEdit {
        id: Uuid,
        group_id: Option<Uuid>,
        content: String,
        edited_at: chrono::DateTime<chrono::Utc>,
    },

    /// A message was soft-deleted (content tombstoned)
    MessageDelete { id: Uuid, group_id: Option<Uuid> },

    /// The reaction summary of a message changed
    ReactionUpdate {
        message_id: Uuid,
        group_id: Option<Uuid>,
        reactions: Vec<ReactionGroup>,
    },

    /// Group membership or role changed
    MembershipChange {
        group_id: Uuid,
        kind: SystemEventKind,
        subject_ids: Vec<Uuid>,
        role: Option<Role>,
    },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        username: String,
        online: bool,
    },
}

impl GatewayEvent {
    /// Returns the group_id if this event is scoped to a group conversation.
    /// Events that return `None` are delivered to every connected client
    /// (direct-message events are additionally sent over the per-user channel).
    pub fn group_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { group_id, .. } => *group_id,
            Self::MessageEdit { group_id, .. } => *group_id,
            Self::MessageDelete { group_id, .. } => *group_id,
            Self::ReactionUpdate { group_id, .. } => *group_id,
            Self::MembershipChange { group_id, .. } => Some(*group_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Subscribe to events for specific groups. The server only forwards
    /// group-scoped events for groups the client has subscribed to.
    Subscribe { group_ids: Vec<Uuid> },
}
