use thiserror::Error;

/// Policy violations surfaced to the caller as typed failures. None of these
/// are retried internally; they are not transient faults.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("you are not a member of this group")]
    NotAMember,

    #[error("users are not contacts")]
    NotContacts,

    #[error("admin role required")]
    PermissionDenied,

    #[error("a group must keep at least one admin")]
    LastAdminViolation,

    #[error("only the sender can modify a message")]
    NotSender,

    #[error("message has been deleted")]
    AlreadyDeleted,

    #[error("this message type cannot be edited")]
    UnsupportedType,

    #[error("exactly one of receiver_id or group_id must be set")]
    InvalidTarget,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}
