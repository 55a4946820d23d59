//! UCI line protocol: outbound commands and inbound line parsing.

use std::fmt;

use crate::error::EngineError;
use crate::observation::Score;

/// A command written to the engine, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Uci,
    IsReady,
    SetOption { name: String, value: String },
    Position { fen: String },
    Go(GoParams),
    Stop,
    Quit,
}

/// Parameters for the `go` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GoParams {
    pub depth: u8,
    pub movetime_ms: Option<u64>,
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::Uci => write!(f, "uci"),
            EngineCommand::IsReady => write!(f, "isready"),
            EngineCommand::SetOption { name, value } => {
                write!(f, "setoption name {name} value {value}")
            }
            EngineCommand::Position { fen } => write!(f, "position fen {fen}"),
            EngineCommand::Go(GoParams {
                depth,
                movetime_ms: Some(ms),
            }) => write!(f, "go movetime {ms} depth {depth}"),
            EngineCommand::Go(GoParams {
                depth,
                movetime_ms: None,
            }) => write!(f, "go depth {depth}"),
            EngineCommand::Stop => write!(f, "stop"),
            EngineCommand::Quit => write!(f, "quit"),
        }
    }
}

/// A line read from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLine {
    UciOk,
    ReadyOk,
    Info(InfoLine),
    /// Terminal line of a search. `None` when the engine has no legal move.
    BestMove(Option<String>),
    /// Anything we do not act on (`id`, `option`, `info string`, ...)
    Other,
}

/// A scored progress line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoLine {
    pub depth: u32,
    pub score: Score,
    pub pv: Vec<String>,
}

/// Parse one engine output line. Lines that look like a known message but
/// do not parse cleanly come back as `ProtocolAnomaly`.
pub fn parse_line(line: &str) -> Result<EngineLine, EngineError> {
    let trimmed = line.trim();
    let mut tokens = trimmed.split_whitespace();

    match tokens.next() {
        Some("uciok") => Ok(EngineLine::UciOk),
        Some("readyok") => Ok(EngineLine::ReadyOk),
        Some("bestmove") => {
            let mv = tokens
                .next()
                .ok_or_else(|| EngineError::ProtocolAnomaly(trimmed.to_string()))?;
            if mv == "(none)" || mv == "0000" {
                return Ok(EngineLine::BestMove(None));
            }
            if !is_coordinate_move(mv) {
                return Err(EngineError::ProtocolAnomaly(trimmed.to_string()));
            }
            Ok(EngineLine::BestMove(Some(mv.to_string())))
        }
        Some("info") => {
            // Only scored lines carry an evaluation; currmove/string/etc. are noise.
            if !trimmed.contains(" score ") {
                return Ok(EngineLine::Other);
            }
            let depth = parse_depth(trimmed)
                .ok_or_else(|| EngineError::ProtocolAnomaly(trimmed.to_string()))?;
            let score = match (parse_cp(trimmed), parse_mate(trimmed)) {
                (_, Some(mate)) => Score::Mate(mate),
                (Some(cp), None) => Score::Centipawns(cp),
                (None, None) => return Err(EngineError::ProtocolAnomaly(trimmed.to_string())),
            };
            let pv = parse_pv(trimmed);
            if pv.iter().any(|mv| !is_coordinate_move(mv)) {
                return Err(EngineError::ProtocolAnomaly(trimmed.to_string()));
            }
            Ok(EngineLine::Info(InfoLine { depth, score, pv }))
        }
        _ => Ok(EngineLine::Other),
    }
}

/// 4-5 character coordinate move: from, to and an optional promotion letter.
pub fn is_coordinate_move(mv: &str) -> bool {
    let b = mv.as_bytes();
    let square = |f: u8, r: u8| (b'a'..=b'h').contains(&f) && (b'1'..=b'8').contains(&r);
    match b.len() {
        4 => square(b[0], b[1]) && square(b[2], b[3]),
        5 => square(b[0], b[1]) && square(b[2], b[3]) && b"qrbnQRBN".contains(&b[4]),
        _ => false,
    }
}

/// Value following `key` in a whitespace separated line.
fn token_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == key && i + 1 < parts.len() {
            return Some(parts[i + 1]);
        }
    }
    None
}

/// Parse search depth from info line
fn parse_depth(line: &str) -> Option<u32> {
    token_after(line, "depth")?.parse().ok()
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    token_after(line, "cp")?.parse().ok()
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    token_after(line, "mate")?.parse().ok()
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in parts {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            // PV ends at next keyword or end of line
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}
