//! Error types for Murmur Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User is banned")]
    Banned,

    #[error("Not the message owner")]
    Unauthorized,

    #[error("Message has no text or file content")]
    EmptyMessage,

    #[error("Replied-to message {0} no longer exists")]
    ReplyTargetNotFound(uuid::Uuid),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for failures the requester caused (bad input, missing rows,
    /// authorization) as opposed to collaborator failures.
    pub fn is_client_fault(&self) -> bool {
        !matches!(
            self,
            Error::Database(_) | Error::StoreUnavailable(_) | Error::Io(_) | Error::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
