//! Played-move log with a redo buffer.
//!
//! Undo rebuilds the position by replaying the remaining moves from the
//! initial position. If that replay fails the manager rolls the single
//! undone move back instead, and if that fails too the undo is abandoned
//! with the history untouched.

use std::collections::VecDeque;
use std::sync::Arc;

use chess_core::{position_key, GameState, MoveRecord, RollbackPoint, RulesEngine, Transition};
use tracing::{debug, warn};

use crate::error::SessionError;

/// Longest game the session keeps, in plies.
pub const MAX_MOVE_HISTORY_LENGTH: usize = 1000;

#[derive(Debug, Clone)]
struct PlayedMove {
    record: MoveRecord,
    rollback: RollbackPoint,
    /// Position after the move
    position: String,
}

/// Result of a successful undo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewind {
    pub record: MoveRecord,
    pub state: GameState,
    /// Set when replay failed and the rollback point was used instead
    pub used_fallback: bool,
}

pub struct MoveHistoryManager {
    rules: Arc<dyn RulesEngine>,
    initial_position: String,
    played: Vec<PlayedMove>,
    /// Most recently undone move first
    redo_buffer: VecDeque<MoveRecord>,
    capacity: usize,
}

impl MoveHistoryManager {
    pub fn new(rules: Arc<dyn RulesEngine>, initial_position: impl Into<String>) -> Self {
        Self::with_capacity(rules, initial_position, MAX_MOVE_HISTORY_LENGTH)
    }

    pub fn with_capacity(
        rules: Arc<dyn RulesEngine>,
        initial_position: impl Into<String>,
        capacity: usize,
    ) -> Self {
        Self {
            rules,
            initial_position: initial_position.into(),
            played: Vec::new(),
            redo_buffer: VecDeque::new(),
            capacity,
        }
    }

    pub fn initial_position(&self) -> &str {
        &self.initial_position
    }

    pub fn len(&self) -> usize {
        self.played.len()
    }

    pub fn is_empty(&self) -> bool {
        self.played.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.played.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn played(&self) -> Vec<MoveRecord> {
        self.played.iter().map(|p| p.record.clone()).collect()
    }

    pub fn redo_buffer(&self) -> Vec<MoveRecord> {
        self.redo_buffer.iter().cloned().collect()
    }

    /// How often the position of `fen` has occurred in this game,
    /// counting the initial position.
    pub fn occurrences(&self, fen: &str) -> usize {
        let key = position_key(fen);
        std::iter::once(self.initial_position.as_str())
            .chain(self.played.iter().map(|p| p.position.as_str()))
            .filter(|position| position_key(position) == key)
            .count()
    }

    /// Append an applied move. Clears the redo buffer.
    pub fn record_move(&mut self, transition: &Transition) -> Result<(), SessionError> {
        if self.is_full() {
            return Err(SessionError::HistoryFull(self.capacity));
        }
        self.played.push(PlayedMove {
            record: transition.record.clone(),
            rollback: transition.rollback.clone(),
            position: transition.state.position.clone(),
        });
        if !self.redo_buffer.is_empty() {
            debug!(dropped = self.redo_buffer.len(), "Redo buffer cleared");
            self.redo_buffer.clear();
        }
        Ok(())
    }

    /// Take back the last move. `Ok(None)` when nothing has been played.
    pub fn undo(&mut self) -> Result<Option<Rewind>, SessionError> {
        let Some(last) = self.played.pop() else {
            return Ok(None);
        };

        let remaining: Vec<MoveRecord> = self.played.iter().map(|p| p.record.clone()).collect();
        let replayed = self
            .rules
            .replay(&self.initial_position, &remaining)
            .and_then(|position| self.rules.game_state(&position));

        let (state, used_fallback) = match replayed {
            Ok(state) => (state, false),
            Err(replay_err) => {
                warn!(error = %replay_err, mv = %last.record.algebraic_notation, "Replay failed, rolling back one ply");
                let rolled_back = self
                    .rules
                    .rollback(&last.rollback)
                    .and_then(|position| self.rules.game_state(&position));
                match rolled_back {
                    Ok(state) => (state, true),
                    Err(rollback_err) => {
                        self.played.push(last);
                        return Err(SessionError::HistoryReconstruction(format!(
                            "{replay_err}; rollback: {rollback_err}"
                        )));
                    }
                }
            }
        };

        self.redo_buffer.push_front(last.record.clone());
        Ok(Some(Rewind {
            record: last.record,
            state,
            used_fallback,
        }))
    }

    /// Re-apply the most recently undone move from `current`.
    /// `Ok(None)` when the redo buffer is empty. A move that no longer
    /// applies is dropped from the buffer and reported as illegal.
    pub fn redo(&mut self, current: &str) -> Result<Option<Transition>, SessionError> {
        let Some(record) = self.redo_buffer.pop_front() else {
            return Ok(None);
        };

        match self.rules.validate_and_apply(current, &record.candidate()) {
            Ok(transition) => {
                self.played.push(PlayedMove {
                    record: transition.record.clone(),
                    rollback: transition.rollback.clone(),
                    position: transition.state.position.clone(),
                });
                Ok(Some(transition))
            }
            Err(e) => {
                warn!(error = %e, mv = %record.algebraic_notation, "Redo move no longer applies, discarded");
                Err(e.into())
            }
        }
    }

    /// Forget everything and start over from `initial_position`.
    pub fn reset(&mut self, initial_position: impl Into<String>) {
        self.initial_position = initial_position.into();
        self.played.clear();
        self.redo_buffer.clear();
    }
}
