//! Murmur Core Library
//!
//! Domain models, error taxonomy, and SQLite storage for the Murmur
//! chat backend. The session hub and wire protocol live in `murmur-net`.

pub mod error;
pub mod models;
pub mod storage;

pub use error::{Error, Result};
pub use models::*;
pub use storage::{Database, MessageRepository, MessageStore, Storage, UserRepository, UserStore};
