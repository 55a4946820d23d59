//! Engine probe
//!
//! Runs one analysis against the configured engine and prints the final
//! observation. Useful for checking STOCKFISH_PATH on a new machine.
//!
//!   engine-probe [--fen "<fen>"] [--depth 15]

use std::time::Duration;

use analysis_engine::{AnalysisEngine, EngineConfig, EngineSession};
use tracing::{info, warn};

const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Value following `flag` on the command line
fn arg_value(flag: &str) -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let _ = dotenvy::dotenv();

    let fen = arg_value("--fen").unwrap_or_else(|| START_FEN.to_string());
    let depth: u8 = arg_value("--depth")
        .and_then(|d| d.parse().ok())
        .unwrap_or(15);

    let config = EngineConfig::from_env()?;
    let session = EngineSession::spawn(&config)?;
    session.initialize().await?;

    let mut observations = AnalysisEngine::observations(&session);
    let best = session.request_best_move(&fen, depth, 60_000);

    let chosen = tokio::time::timeout(Duration::from_secs(120), best).await;
    match chosen {
        Ok(Some(mv)) => {
            let obs = observations.borrow_and_update().clone();
            let score = obs
                .as_ref()
                .and_then(|o| o.score())
                .map(|s| s.display())
                .unwrap_or_else(|| "?".into());
            let reached = obs.map(|o| o.reached_depth).unwrap_or(0);
            info!(%fen, best = %mv, score = %score, depth = reached, "Analysis complete");
            println!("{mv} {score} depth {reached}");
        }
        Ok(None) => warn!(%fen, "Engine returned no move"),
        Err(_) => warn!(%fen, "Engine did not answer in time"),
    }

    session.shutdown();
    Ok(())
}
