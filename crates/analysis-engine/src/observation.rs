//! Streamed evaluation snapshots and their presentation helpers.

use serde::{Deserialize, Serialize};

/// Evaluation bar range in centipawns.
pub const MAX_CENTIPAWN_EVAL: i32 = 800;

/// Engine evaluation score, from the side to move's perspective.
///
/// Mate: positive N = side to move mates in N, negative N = gets mated in N.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    Centipawns(i32),
    Mate(i32),
}

impl Score {
    /// Flip perspective.
    pub fn negate(self) -> Self {
        match self {
            Score::Centipawns(cp) => Score::Centipawns(-cp),
            Score::Mate(m) => Score::Mate(-m),
        }
    }

    /// Centipawns for comparison; mates map to large values, shorter mates larger.
    pub fn to_cp(self) -> i32 {
        match self {
            Score::Centipawns(cp) => cp,
            Score::Mate(m) if m > 0 => 10000 - m * 10,
            Score::Mate(m) => -10000 - m * 10,
        }
    }

    pub fn display(self) -> String {
        match self {
            Score::Centipawns(cp) => format!("{:+.2}", cp as f64 / 100.0),
            Score::Mate(m) if m > 0 => format!("+M{m}"),
            Score::Mate(m) => format!("-M{}", m.abs()),
        }
    }
}

/// Latest progress for one request. Later observations for the same request
/// supersede earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineObservation {
    pub request_id: u64,
    pub evaluation_centipawns: Option<i32>,
    pub mate_in_moves: Option<i32>,
    pub reached_depth: u32,
    pub principal_best_move: Option<String>,
    pub principal_variation: Vec<String>,
}

impl EngineObservation {
    pub fn score(&self) -> Option<Score> {
        match (self.mate_in_moves, self.evaluation_centipawns) {
            (Some(m), _) => Some(Score::Mate(m)),
            (None, Some(cp)) => Some(Score::Centipawns(cp)),
            (None, None) => None,
        }
    }

    /// Score from White's point of view, given who was to move.
    pub fn white_score(&self, white_to_move: bool) -> Option<Score> {
        self.score()
            .map(|s| if white_to_move { s } else { s.negate() })
    }

    /// Evaluation bar fill for White in percent (0..=100).
    pub fn white_bar_percent(&self, white_to_move: bool) -> f64 {
        let cp = self
            .white_score(white_to_move)
            .map(|s| s.to_cp())
            .unwrap_or(0)
            .clamp(-MAX_CENTIPAWN_EVAL, MAX_CENTIPAWN_EVAL);
        50.0 + (cp as f64 / MAX_CENTIPAWN_EVAL as f64) * 50.0
    }
}
