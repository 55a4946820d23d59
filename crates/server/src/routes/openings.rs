use std::sync::Arc;

use axum::{extract::Query, Extension, Json};
use game_session::SessionHandle;
use serde::Deserialize;

use crate::clients::explorer::OpeningStats;
use crate::error::AppError;
use crate::opening_cache::OpeningLookup;

#[derive(Deserialize)]
pub struct OpeningQuery {
    pub fen: Option<String>,
}

/// GET /api/openings?fen=...
/// Master-game statistics for `fen`, or for the current game position when
/// no FEN is given. Lookup failures come back as empty stats.
pub async fn get_opening_stats(
    Extension(openings): Extension<Arc<OpeningLookup>>,
    Extension(session): Extension<SessionHandle>,
    Query(q): Query<OpeningQuery>,
) -> Result<Json<OpeningStats>, AppError> {
    let fen = match q.fen {
        Some(fen) if !fen.trim().is_empty() => fen,
        _ => session.snapshot().await?.state.position,
    };

    Ok(Json(openings.stats(&fen).await))
}
