//! What the session shows to the outside: snapshots and pushed events.

use analysis_engine::{EngineObservation, Score};
use chess_core::{GameState, MoveRecord};
use serde::Serialize;

use crate::settings::Settings;

/// Complete read-only view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: GameState,
    pub status_text: String,
    pub played: Vec<MoveRecord>,
    /// Most recently undone move first
    pub redo_buffer: Vec<MoveRecord>,
    pub movetext: String,
    pub settings: Settings,
    pub ai_vs_ai_active: bool,
    pub ai_paused: bool,
    pub ai_thinking: bool,
    pub engine_ready: bool,
    pub evaluation: Option<EngineObservation>,
    /// Bumped on every state, mode or pause change
    pub generation: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Game state, history, mode or flags changed
    State { snapshot: Box<SessionSnapshot> },

    /// New engine progress for the current position
    Evaluation {
        observation: EngineObservation,
        white_to_move: bool,
        /// Score from White's side, e.g. for the `+0.45` / `-M2` label
        white_score: Option<Score>,
        score_text: Option<String>,
        /// Evaluation bar fill for White, 0..=100
        bar_percent: f64,
        generation: u64,
    },

    /// The engine played a move
    AiMove { record: MoveRecord },

    /// Something the player should know about that did not change the game
    Notice { message: String },
}
