//! Error types for cycleq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The queue gateway could not complete a receive/ack/extend call.
    #[error("queue transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown was observed while a cycle was waiting.
    #[error("cycle interrupted")]
    Interrupted,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
