//! Player-facing settings, AI strength levels and orchestrator timings.

use std::env;
use std::time::Duration;

use chess_core::Side;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

/// Highest configurable AI level.
pub const MAX_AI_LEVEL: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "vsAI")]
    VsAi,
    #[serde(rename = "aiVsAi")]
    AiVsAi,
}

/// Search budget for one AI level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Strength {
    pub level: u8,
    pub depth: u8,
    pub think_time_ms: u64,
    pub label: &'static str,
}

pub const STRENGTH_LEVELS: [Strength; 6] = [
    Strength { level: 0, depth: 2, think_time_ms: 100, label: "Novice (ELO ~800)" },
    Strength { level: 1, depth: 5, think_time_ms: 200, label: "Beginner (ELO ~1200)" },
    Strength { level: 2, depth: 8, think_time_ms: 500, label: "Amateur (ELO ~1600)" },
    Strength { level: 3, depth: 12, think_time_ms: 1000, label: "Expert (ELO ~2000)" },
    Strength { level: 4, depth: 15, think_time_ms: 2000, label: "Master (ELO ~2400)" },
    Strength { level: 5, depth: 20, think_time_ms: 4000, label: "Grandmaster (ELO ~2800)" },
];

/// Strength for `level`; anything above the table clamps to the top level.
pub fn strength(level: u8) -> Strength {
    STRENGTH_LEVELS[level.min(MAX_AI_LEVEL) as usize]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub mode: Mode,

    /// Opponent level in vsAI mode
    #[validate(range(max = 5))]
    pub ai_level: u8,

    #[validate(range(max = 5))]
    pub white_ai_level: u8,

    #[validate(range(max = 5))]
    pub black_ai_level: u8,

    pub player_color: Side,
    pub board_orientation: Side,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: Mode::Local,
            ai_level: 1,
            white_ai_level: 1,
            black_ai_level: 2,
            player_color: Side::White,
            board_orientation: Side::White,
        }
    }
}

impl Settings {
    /// Level of the engine playing `side` under the current mode.
    pub fn level_for(&self, side: Side) -> u8 {
        match (self.mode, side) {
            (Mode::AiVsAi, Side::White) => self.white_ai_level,
            (Mode::AiVsAi, Side::Black) => self.black_ai_level,
            _ => self.ai_level,
        }
    }

    /// Same settings with every level inside the strength table.
    pub fn clamped(mut self) -> Self {
        self.ai_level = self.ai_level.min(MAX_AI_LEVEL);
        self.white_ai_level = self.white_ai_level.min(MAX_AI_LEVEL);
        self.black_ai_level = self.black_ai_level.min(MAX_AI_LEVEL);
        self
    }
}

/// Delays and depths the orchestrator runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimings {
    /// Quiet period after a position change before analysis starts
    pub debounce: Duration,

    /// Pacing before the engine answers a human move
    pub vs_ai_delay: Duration,

    /// Pacing between moves when two engines play
    pub ai_vs_ai_delay: Duration,

    pub analysis_depth: u8,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            vs_ai_delay: Duration::from_millis(600),
            ai_vs_ai_delay: Duration::from_millis(500),
            analysis_depth: 15,
        }
    }
}

impl SessionTimings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(fallback)
        };

        let timings = Self {
            debounce: millis("EVAL_DEBOUNCE_MS", defaults.debounce),
            vs_ai_delay: millis("AI_MOVE_DELAY_MS", defaults.vs_ai_delay),
            ai_vs_ai_delay: millis("AI_VS_AI_DELAY_MS", defaults.ai_vs_ai_delay),
            analysis_depth: env::var("ANALYSIS_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.analysis_depth),
        };

        info!(
            debounce_ms = timings.debounce.as_millis() as u64,
            analysis_depth = timings.analysis_depth,
            "Session timings loaded"
        );
        timings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_table() {
        assert_eq!(strength(0).depth, 2);
        assert_eq!(strength(0).think_time_ms, 100);
        assert_eq!(strength(3).depth, 12);
        assert_eq!(strength(5).think_time_ms, 4000);
        assert_eq!(strength(5).label, "Grandmaster (ELO ~2800)");
        // Out of range clamps to the strongest level
        assert_eq!(strength(9), strength(5));
    }

    #[test]
    fn test_level_for_side() {
        let mut settings = Settings::default();
        settings.mode = Mode::VsAi;
        settings.ai_level = 4;
        assert_eq!(settings.level_for(Side::Black), 4);

        settings.mode = Mode::AiVsAi;
        assert_eq!(settings.level_for(Side::White), 1);
        assert_eq!(settings.level_for(Side::Black), 2);
    }

    #[test]
    fn test_settings_wire_format() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["mode"], "local");
        assert_eq!(json["aiLevel"], 1);
        assert_eq!(json["blackAiLevel"], 2);
        assert_eq!(json["playerColor"], "white");

        let parsed: Settings =
            serde_json::from_str(r#"{"mode":"vsAI","playerColor":"black"}"#).unwrap();
        assert_eq!(parsed.mode, Mode::VsAi);
        assert_eq!(parsed.player_color, Side::Black);
        assert_eq!(parsed.white_ai_level, 1);
    }

    #[test]
    fn test_level_validation() {
        assert!(Settings::default().validate().is_ok());

        let too_strong = Settings {
            white_ai_level: 6,
            ..Settings::default()
        };
        assert!(too_strong.validate().is_err());
        assert_eq!(too_strong.clamped().white_ai_level, 5);
    }
}
