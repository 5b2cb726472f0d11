//! Domain models

mod message;
mod user;

pub use message::{Message, ReplySnapshot};
pub use user::{User, UserRole, DEFAULT_AVATAR};
