//! Engine configuration from environment variables

use std::env;
use std::time::Duration;

use tracing::info;

use crate::error::EngineError;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Path to the UCI engine binary
    pub stockfish_path: String,

    /// How long to wait for `readyok` before giving up
    pub handshake_timeout: Duration,

    /// `setoption name Threads`
    pub threads: u32,

    /// `setoption name Hash` in MB
    pub hash_mb: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stockfish_path: "/usr/local/bin/stockfish".to_string(),
            handshake_timeout: Duration::from_millis(10_000),
            threads: 1,
            hash_mb: 64,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, EngineError> {
        let defaults = Self::default();

        let stockfish_path = env::var("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path);
        if stockfish_path.trim().is_empty() {
            return Err(EngineError::Config("STOCKFISH_PATH is empty".into()));
        }

        let handshake_timeout = env::var("ENGINE_HANDSHAKE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.handshake_timeout);

        let threads = env::var("ENGINE_THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.threads);

        let hash_mb = env::var("ENGINE_HASH_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.hash_mb);

        info!(%stockfish_path, threads, hash_mb, "Engine config loaded");

        Ok(Self {
            stockfish_path,
            handshake_timeout,
            threads,
            hash_mb,
        })
    }
}
