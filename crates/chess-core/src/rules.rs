//! Rules capability consumed by the game session.
//!
//! The session never generates or checks moves itself; it asks a
//! [`RulesEngine`] to validate and apply a candidate, to classify a
//! position, to replay a move list and, as a last resort, to roll a single
//! move back. [`ShakmatyRules`] is the production implementation.

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position, Rank, Role, Square};

use crate::error::RulesError;
use crate::types::{CandidateMove, GameState, GameStatus, MoveRecord, Promotion, Side};

/// Position captured just before a move was applied. Handing it back to
/// [`RulesEngine::rollback`] restores that position without a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackPoint {
    previous: String,
}

impl RollbackPoint {
    pub fn new(previous: impl Into<String>) -> Self {
        Self {
            previous: previous.into(),
        }
    }

    pub fn previous(&self) -> &str {
        &self.previous
    }
}

/// Result of a successful `validate_and_apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub record: MoveRecord,
    pub state: GameState,
    pub rollback: RollbackPoint,
}

pub trait RulesEngine: Send + Sync {
    /// Validates `candidate` against `position` and returns the resulting state.
    fn validate_and_apply(
        &self,
        position: &str,
        candidate: &CandidateMove,
    ) -> Result<Transition, RulesError>;

    /// Classifies `position` (checkmate, stalemate, draw, check, ongoing).
    fn status(&self, position: &str) -> Result<GameStatus, RulesError>;

    fn side_to_move(&self, position: &str) -> Result<Side, RulesError>;

    /// Restores the position recorded in `point`.
    fn rollback(&self, point: &RollbackPoint) -> Result<String, RulesError>;

    /// Replays `moves` from `start`. Fails with the index of the first move
    /// that no longer applies.
    fn replay(&self, start: &str, moves: &[MoveRecord]) -> Result<String, RulesError> {
        let mut position = start.to_string();
        for (index, record) in moves.iter().enumerate() {
            let transition = self
                .validate_and_apply(&position, &record.candidate())
                .map_err(|e| RulesError::ReplayFailed {
                    index,
                    reason: e.to_string(),
                })?;
            position = transition.state.position;
        }
        Ok(position)
    }

    fn game_state(&self, position: &str) -> Result<GameState, RulesError> {
        Ok(GameState {
            position: position.to_string(),
            turn_color: self.side_to_move(position)?,
            status: self.status(position)?,
        })
    }
}

/// Standard chess rules backed by `shakmaty`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShakmatyRules;

impl ShakmatyRules {
    pub fn new() -> Self {
        Self
    }
}

impl RulesEngine for ShakmatyRules {
    fn validate_and_apply(
        &self,
        position: &str,
        candidate: &CandidateMove,
    ) -> Result<Transition, RulesError> {
        let pos = parse_position(position)?;

        let from: Square = candidate
            .from
            .parse()
            .map_err(|_| RulesError::MalformedMove(candidate.to_uci()))?;
        let to: Square = candidate
            .to
            .parse()
            .map_err(|_| RulesError::MalformedMove(candidate.to_uci()))?;

        // Promotion letters only matter for a pawn reaching the last rank;
        // when one is implied but missing it defaults to a queen.
        let promotion = if is_promotion_square(&pos, from, to) {
            Some(candidate.promotion.unwrap_or(Promotion::Queen))
        } else {
            None
        };

        let uci = UciMove::Normal {
            from,
            to,
            promotion: promotion.map(promotion_role),
        };
        let mv = uci
            .to_move(&pos)
            .map_err(|_| RulesError::IllegalMove(candidate.to_uci()))?;

        let san = San::from_move(&pos, mv.clone()).to_string();
        let mut next = pos.clone();
        next.play_unchecked(mv);

        let suffix = if next.is_checkmate() {
            "#"
        } else if next.is_check() {
            "+"
        } else {
            ""
        };

        let next_fen = render_fen(&next);
        Ok(Transition {
            record: MoveRecord {
                algebraic_notation: format!("{san}{suffix}"),
                from_square: candidate.from.clone(),
                to_square: candidate.to.clone(),
                promotion_piece: promotion,
            },
            state: GameState {
                position: next_fen,
                turn_color: side_of(next.turn()),
                status: classify(&next),
            },
            rollback: RollbackPoint::new(render_fen(&pos)),
        })
    }

    fn status(&self, position: &str) -> Result<GameStatus, RulesError> {
        Ok(classify(&parse_position(position)?))
    }

    fn side_to_move(&self, position: &str) -> Result<Side, RulesError> {
        Ok(side_of(parse_position(position)?.turn()))
    }

    fn rollback(&self, point: &RollbackPoint) -> Result<String, RulesError> {
        let pos = parse_position(point.previous())?;
        Ok(render_fen(&pos))
    }

    fn replay(&self, start: &str, moves: &[MoveRecord]) -> Result<String, RulesError> {
        let mut pos = parse_position(start)?;
        for (index, record) in moves.iter().enumerate() {
            let mv = to_legal_move(&pos, record).map_err(|reason| RulesError::ReplayFailed {
                index,
                reason,
            })?;
            pos.play_unchecked(mv);
        }
        Ok(render_fen(&pos))
    }
}

fn to_legal_move(pos: &Chess, record: &MoveRecord) -> Result<shakmaty::Move, String> {
    let from: Square = record
        .from_square
        .parse()
        .map_err(|_| format!("bad square {}", record.from_square))?;
    let to: Square = record
        .to_square
        .parse()
        .map_err(|_| format!("bad square {}", record.to_square))?;
    let uci = UciMove::Normal {
        from,
        to,
        promotion: record.promotion_piece.map(promotion_role),
    };
    uci.to_move(pos)
        .map_err(|_| format!("{} is not legal here", record.algebraic_notation))
}

fn parse_position(fen: &str) -> Result<Chess, RulesError> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| RulesError::InvalidPosition(format!("{fen}: {e}")))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| RulesError::InvalidPosition(format!("{fen}: {e}")))
}

fn render_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

fn classify(pos: &Chess) -> GameStatus {
    if pos.is_checkmate() {
        GameStatus::Checkmate
    } else if pos.is_stalemate() {
        GameStatus::Stalemate
    } else if pos.is_insufficient_material() || pos.halfmoves() >= 100 {
        GameStatus::DrawOther
    } else if pos.is_check() {
        GameStatus::Check
    } else {
        GameStatus::Ongoing
    }
}

fn is_promotion_square(pos: &Chess, from: Square, to: Square) -> bool {
    pos.board().role_at(from) == Some(Role::Pawn)
        && matches!(to.rank(), Rank::First | Rank::Eighth)
}

fn promotion_role(p: Promotion) -> Role {
    match p {
        Promotion::Queen => Role::Queen,
        Promotion::Rook => Role::Rook,
        Promotion::Bishop => Role::Bishop,
        Promotion::Knight => Role::Knight,
    }
}

fn side_of(color: Color) -> Side {
    match color {
        Color::White => Side::White,
        Color::Black => Side::Black,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::STARTING_FEN;

    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

    fn play(rules: &ShakmatyRules, fen: &str, uci: &str) -> Result<Transition, RulesError> {
        rules.validate_and_apply(fen, &uci.parse().unwrap())
    }

    #[test]
    fn test_apply_opening_move() {
        let rules = ShakmatyRules::new();
        let t = play(&rules, STARTING_FEN, "e2e4").unwrap();
        assert_eq!(t.record.algebraic_notation, "e4");
        assert_eq!(t.record.from_square, "e2");
        assert_eq!(t.record.to_square, "e4");
        assert_eq!(t.state.position, AFTER_E4);
        assert_eq!(t.state.turn_color, Side::Black);
        assert_eq!(t.state.status, GameStatus::Ongoing);
        assert_eq!(t.rollback.previous(), STARTING_FEN);
    }

    #[test]
    fn test_illegal_move_rejected() {
        let rules = ShakmatyRules::new();
        assert!(matches!(
            play(&rules, STARTING_FEN, "e2e5"),
            Err(RulesError::IllegalMove(_))
        ));
        assert!(matches!(
            play(&rules, STARTING_FEN, "e7e5"),
            Err(RulesError::IllegalMove(_))
        ));
    }

    #[test]
    fn test_invalid_position_rejected() {
        let rules = ShakmatyRules::new();
        assert!(matches!(
            rules.status("not a fen"),
            Err(RulesError::InvalidPosition(_))
        ));
    }

    #[test]
    fn test_promotion_defaults_to_queen() {
        let rules = ShakmatyRules::new();
        let fen = "8/4P3/8/8/8/8/k7/4K3 w - - 0 1";
        let t = play(&rules, fen, "e7e8").unwrap();
        assert_eq!(t.record.promotion_piece, Some(Promotion::Queen));
        assert_eq!(t.record.algebraic_notation, "e8=Q");

        let under = play(&rules, fen, "e7e8n").unwrap();
        assert_eq!(under.record.promotion_piece, Some(Promotion::Knight));
    }

    #[test]
    fn test_stray_promotion_letter_ignored() {
        let rules = ShakmatyRules::new();
        let t = play(&rules, STARTING_FEN, "g1f3q").unwrap();
        assert_eq!(t.record.algebraic_notation, "Nf3");
        assert_eq!(t.record.promotion_piece, None);
    }

    #[test]
    fn test_castling_in_king_two_square_form() {
        let rules = ShakmatyRules::new();
        let fen = "r3k2r/pppppppp/8/8/8/8/PPPPPPPP/R3K2R w KQkq - 0 1";
        let t = play(&rules, fen, "e1g1").unwrap();
        assert_eq!(t.record.algebraic_notation, "O-O");
    }

    #[test]
    fn test_checkmate_detected() {
        let rules = ShakmatyRules::new();
        let mut fen = STARTING_FEN.to_string();
        let mut last = None;
        for mv in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            let t = play(&rules, &fen, mv).unwrap();
            fen = t.state.position.clone();
            last = Some(t);
        }
        let last = last.unwrap();
        assert_eq!(last.record.algebraic_notation, "Qh4#");
        assert_eq!(last.state.status, GameStatus::Checkmate);
        assert!(last.state.is_terminal());
        assert_eq!(last.state.status_text(), "Checkmate, black wins");
    }

    #[test]
    fn test_stalemate_and_draw_detected() {
        let rules = ShakmatyRules::new();
        assert_eq!(
            rules.status("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap(),
            GameStatus::Stalemate
        );
        assert_eq!(
            rules.status("8/8/8/8/8/8/8/K6k w - - 0 1").unwrap(),
            GameStatus::DrawOther
        );
    }

    #[test]
    fn test_replay_reports_failing_index() {
        let rules = ShakmatyRules::new();
        let e4 = play(&rules, STARTING_FEN, "e2e4").unwrap().record;
        let e5 = play(&rules, AFTER_E4, "e7e5").unwrap().record;

        let fen = rules.replay(STARTING_FEN, &[e4.clone(), e5.clone()]).unwrap();
        assert_eq!(rules.side_to_move(&fen).unwrap(), Side::White);

        // e4 twice: the second one has no pawn on e2 for black
        let err = rules.replay(STARTING_FEN, &[e4.clone(), e4]).unwrap_err();
        assert!(matches!(err, RulesError::ReplayFailed { index: 1, .. }));
    }

    #[test]
    fn test_rollback_restores_previous_position() {
        let rules = ShakmatyRules::new();
        let t = play(&rules, STARTING_FEN, "d2d4").unwrap();
        assert_eq!(rules.rollback(&t.rollback).unwrap(), STARTING_FEN);
    }
}
