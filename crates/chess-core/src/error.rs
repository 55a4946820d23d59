//! Rules engine error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Malformed move: {0}")]
    MalformedMove(String),

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Replay failed at move {index}: {reason}")]
    ReplayFailed { index: usize, reason: String },

    #[error("No rollback point available")]
    RollbackUnavailable,
}
