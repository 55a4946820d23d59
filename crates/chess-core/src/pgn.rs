//! PGN movetext rendering for the move list panel.

use crate::types::{GameState, GameStatus, MoveRecord, Side};

/// Render played moves as numbered movetext, e.g. `1. e4 e5 2. Nf3`.
pub fn movetext(moves: &[MoveRecord]) -> String {
    let mut out = String::new();
    for (i, pair) in moves.chunks(2).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{}. {}", i + 1, pair[0].algebraic_notation));
        if let Some(reply) = pair.get(1) {
            out.push(' ');
            out.push_str(&reply.algebraic_notation);
        }
    }
    out
}

/// PGN result token for the given state.
pub fn result_token(state: &GameState) -> &'static str {
    match (state.status, state.turn_color) {
        (GameStatus::Checkmate, Side::White) => "0-1",
        (GameStatus::Checkmate, Side::Black) => "1-0",
        (GameStatus::Stalemate | GameStatus::DrawOther, _) => "1/2-1/2",
        _ => "*",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(san: &str) -> MoveRecord {
        MoveRecord {
            algebraic_notation: san.to_string(),
            from_square: "a1".into(),
            to_square: "a2".into(),
            promotion_piece: None,
        }
    }

    #[test]
    fn test_movetext_numbering() {
        let moves: Vec<MoveRecord> = ["e4", "e5", "Nf3"].iter().map(|s| record(s)).collect();
        assert_eq!(movetext(&moves), "1. e4 e5 2. Nf3");
        assert_eq!(movetext(&[]), "");
    }

    #[test]
    fn test_result_token() {
        let mated = GameState {
            position: String::new(),
            turn_color: Side::White,
            status: GameStatus::Checkmate,
        };
        assert_eq!(result_token(&mated), "0-1");

        let ongoing = GameState {
            status: GameStatus::Check,
            ..mated
        };
        assert_eq!(result_token(&ongoing), "*");
    }
}
