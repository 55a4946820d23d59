use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RulesError;

/// Standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// `e2e4`, `e7e8q`. Promotion letter is case-insensitive.
static COORDINATE_MOVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-h][1-8])([a-h][1-8])([qrbnQRBN])?$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => write!(f, "white"),
            Side::Black => write!(f, "black"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    Ongoing,
    Check,
    Checkmate,
    Stalemate,
    DrawOther,
}

impl GameStatus {
    /// Check is reported but does not end the game.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GameStatus::Checkmate | GameStatus::Stalemate | GameStatus::DrawOther
        )
    }
}

/// Authoritative game state. Replaced wholesale on every accepted move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub position: String,
    pub turn_color: Side,
    pub status: GameStatus,
}

impl GameState {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Human-readable result line for a finished (or checked) position.
    pub fn status_text(&self) -> &'static str {
        match (self.status, self.turn_color) {
            (GameStatus::Checkmate, Side::White) => "Checkmate, black wins",
            (GameStatus::Checkmate, Side::Black) => "Checkmate, white wins",
            (GameStatus::Stalemate, _) => "Stalemate",
            (GameStatus::DrawOther, _) => "Draw",
            (GameStatus::Check, _) => "Check",
            (GameStatus::Ongoing, _) => "In progress",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Promotion {
    Queen,
    Rook,
    Bishop,
    Knight,
}

impl Promotion {
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'q' => Some(Promotion::Queen),
            'r' => Some(Promotion::Rook),
            'b' => Some(Promotion::Bishop),
            'n' => Some(Promotion::Knight),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Promotion::Queen => 'q',
            Promotion::Rook => 'r',
            Promotion::Bishop => 'b',
            Promotion::Knight => 'n',
        }
    }
}

/// A move as typed by a player or emitted by the engine, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateMove {
    pub from: String,
    pub to: String,
    pub promotion: Option<Promotion>,
}

impl CandidateMove {
    pub fn new(from: &str, to: &str, promotion: Option<Promotion>) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            promotion,
        }
    }

    /// Coordinate notation, e.g. `e7e8q`.
    pub fn to_uci(&self) -> String {
        match self.promotion {
            Some(p) => format!("{}{}{}", self.from, self.to, p.as_char()),
            None => format!("{}{}", self.from, self.to),
        }
    }
}

impl FromStr for CandidateMove {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = COORDINATE_MOVE_RE
            .captures(trimmed)
            .ok_or_else(|| RulesError::MalformedMove(trimmed.to_string()))?;

        let promotion = caps
            .get(3)
            .and_then(|m| m.as_str().chars().next())
            .and_then(Promotion::from_char);

        Ok(Self {
            from: caps[1].to_string(),
            to: caps[2].to_string(),
            promotion,
        })
    }
}

impl fmt::Display for CandidateMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci())
    }
}

/// A validated, played move. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub algebraic_notation: String,
    pub from_square: String,
    pub to_square: String,
    pub promotion_piece: Option<Promotion>,
}

impl MoveRecord {
    pub fn candidate(&self) -> CandidateMove {
        CandidateMove::new(&self.from_square, &self.to_square, self.promotion_piece)
    }
}

/// Strips move counters from a FEN, keeping placement, side, castling and ep.
/// Two positions with the same key are the same position for repetition and
/// lookup purposes.
pub fn position_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinate_move() {
        let mv: CandidateMove = "e2e4".parse().unwrap();
        assert_eq!(mv.from, "e2");
        assert_eq!(mv.to, "e4");
        assert_eq!(mv.promotion, None);

        let promo: CandidateMove = "e7e8N".parse().unwrap();
        assert_eq!(promo.promotion, Some(Promotion::Knight));
        assert_eq!(promo.to_uci(), "e7e8n");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "e2", "e2e9", "i2e4", "e2e4k", "e2e4qq", "(none)"] {
            assert!(
                matches!(bad.parse::<CandidateMove>(), Err(RulesError::MalformedMove(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_position_key() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
        assert_eq!(
            position_key(fen),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3"
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!GameStatus::Ongoing.is_terminal());
        assert!(!GameStatus::Check.is_terminal());
        assert!(GameStatus::Checkmate.is_terminal());
        assert!(GameStatus::Stalemate.is_terminal());
        assert!(GameStatus::DrawOther.is_terminal());
    }
}
