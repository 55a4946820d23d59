pub mod error;
pub mod pgn;
pub mod rules;
pub mod types;

pub use error::RulesError;
pub use rules::{RollbackPoint, RulesEngine, ShakmatyRules, Transition};
pub use types::{
    position_key, CandidateMove, GameState, GameStatus, MoveRecord, Promotion, Side, STARTING_FEN,
};
