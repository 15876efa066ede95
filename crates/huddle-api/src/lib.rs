pub mod auth;
pub mod contacts;
pub mod error;
pub mod groups;
pub mod messages;
pub mod middleware;
pub mod reactions;
