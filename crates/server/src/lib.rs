pub mod clients;
pub mod config;
pub mod error;
pub mod opening_cache;
pub mod routes;
pub mod settings_store;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use game_session::SessionHandle;
use tower_http::cors::{Any, CorsLayer};

use crate::opening_cache::OpeningLookup;
use crate::settings_store::SettingsStore;

/// All HTTP and WebSocket routes over one live game session.
pub fn router(
    session: SessionHandle,
    settings: Arc<dyn SettingsStore>,
    openings: Arc<OpeningLookup>,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        // Settings
        .route("/api/settings", post(routes::settings::save_settings))
        .route("/api/settings/{session_id}", get(routes::settings::get_settings))
        // Opening stats
        .route("/api/openings", get(routes::openings::get_opening_stats))
        // Game
        .route("/api/game", get(routes::game::get_game))
        .route("/api/game/move", post(routes::game::make_move))
        .route("/api/game/undo", post(routes::game::undo))
        .route("/api/game/redo", post(routes::game::redo))
        .route("/api/game/reset", post(routes::game::reset))
        .route("/api/game/pause", post(routes::game::set_paused))
        .route("/api/game/ai-vs-ai", post(routes::game::set_ai_vs_ai))
        .route("/api/game/pgn", get(routes::game::get_pgn))
        .route("/api/game/ws", get(routes::game_ws::ws_handler))
        // Shared state
        .layer(Extension(session))
        .layer(Extension(settings))
        .layer(Extension(openings))
        .layer(cors)
}
