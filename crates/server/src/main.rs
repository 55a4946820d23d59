use std::sync::Arc;

use analysis_engine::{AnalysisEngine, EngineConfig, EngineSession, OfflineEngine};
use chess_core::ShakmatyRules;
use game_session::{SessionOrchestrator, SessionTimings, Settings};
use server::clients::explorer::ExplorerClient;
use server::config::Config;
use server::opening_cache::{self, OpeningLookup};
use server::settings_store::MemorySettingsStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();

    // Engine is optional: the game stays playable without it
    let (engine, session_engine): (Arc<dyn AnalysisEngine>, Option<Arc<EngineSession>>) =
        match start_engine().await {
            Ok(session) => {
                let session = Arc::new(session);
                let engine: Arc<dyn AnalysisEngine> = session.clone();
                (engine, Some(session))
            }
            Err(e) => {
                tracing::error!("Engine unavailable, continuing without analysis: {e}");
                let engine: Arc<dyn AnalysisEngine> = Arc::new(OfflineEngine::new());
                (engine, None)
            }
        };

    let session = SessionOrchestrator::new(
        Arc::new(ShakmatyRules),
        engine,
        Settings::default(),
        SessionTimings::from_env(),
    )?
    .spawn();

    let cache = match &config.opening_cache_path {
        Some(path) if path.exists() => match opening_cache::load_cache(path) {
            Ok(cache) => {
                tracing::info!("Loaded {} cached opening positions", cache.len());
                cache
            }
            Err(e) => {
                tracing::warn!("Failed to load opening cache from {}: {e}", path.display());
                Default::default()
            }
        },
        _ => Default::default(),
    };
    let explorer = ExplorerClient::new(config.explorer_url.clone(), config.explorer_timeout)?;
    let openings = Arc::new(OpeningLookup::with_cache(explorer, cache));

    let app = server::router(
        session.clone(),
        Arc::new(MemorySettingsStore::new()),
        openings.clone(),
    );

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    session.shutdown().await;
    if let Some(path) = &config.opening_cache_path {
        match openings.save(path) {
            Ok(count) => tracing::info!("Saved {count} opening positions to {}", path.display()),
            Err(e) => tracing::warn!("Failed to save opening cache: {e}"),
        }
    }
    if let Some(engine) = session_engine {
        engine.shutdown();
    }
    Ok(())
}

async fn start_engine() -> anyhow::Result<EngineSession> {
    let config = EngineConfig::from_env()?;
    let engine = EngineSession::spawn(&config)?;
    engine.initialize().await?;
    tracing::info!(path = %config.stockfish_path, "Engine ready");
    Ok(engine)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
