//! Session error types

use chess_core::RulesError;
use thiserror::Error;

/// Every rejection leaves the game state exactly as it was.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Game is over")]
    GameOver,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Moves are played by the engine in this mode")]
    AiControlled,

    #[error("AI vs AI requires aiVsAi mode")]
    WrongMode,

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("Move history is full ({0} plies)")]
    HistoryFull(usize),

    #[error("History reconstruction failed: {0}")]
    HistoryReconstruction(String),

    #[error("Session closed")]
    Closed,
}

impl From<RulesError> for SessionError {
    fn from(err: RulesError) -> Self {
        match err {
            RulesError::InvalidPosition(fen) => SessionError::InvalidPosition(fen),
            RulesError::MalformedMove(mv) | RulesError::IllegalMove(mv) => {
                SessionError::IllegalMove(mv)
            }
            other => SessionError::HistoryReconstruction(other.to_string()),
        }
    }
}
