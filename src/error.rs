use thiserror::Error;

use crate::limits::LimitExceeded;

/// Errors surfaced to the callers of the feed, RSS and attempt operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The resource does not exist or belongs to someone else.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    LimitExceeded(#[from] LimitExceeded),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
