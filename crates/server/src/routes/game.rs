use axum::{Extension, Json};
use chess_core::{pgn, CandidateMove};
use game_session::{SessionError, SessionHandle, SessionSnapshot};
use serde::Deserialize;

use crate::error::AppError;

/// Either `{"uci": "e7e8q"}` or `{"from": "e7", "to": "e8", "promotion": "q"}`.
#[derive(Deserialize)]
pub struct MoveRequest {
    pub uci: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub promotion: Option<String>,
}

impl MoveRequest {
    pub fn candidate(&self) -> Result<CandidateMove, AppError> {
        let text = match (&self.uci, &self.from, &self.to) {
            (Some(uci), _, _) => uci.clone(),
            (None, Some(from), Some(to)) => format!(
                "{from}{to}{}",
                self.promotion.as_deref().unwrap_or_default()
            ),
            _ => {
                return Err(AppError::BadRequest(
                    "Expected uci or from/to".to_string(),
                ))
            }
        };
        text.parse::<CandidateMove>()
            .map_err(|e| AppError::from(SessionError::from(e)))
    }
}

#[derive(Deserialize)]
pub struct PauseRequest {
    pub paused: bool,
}

#[derive(Deserialize)]
pub struct AiVsAiRequest {
    pub active: bool,
}

/// GET /api/game
pub async fn get_game(
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session.snapshot().await?))
}

/// POST /api/game/move
pub async fn make_move(
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let candidate = req.candidate()?;
    Ok(Json(session.apply_move(candidate).await?))
}

/// POST /api/game/undo
pub async fn undo(
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session.undo().await?))
}

/// POST /api/game/redo
pub async fn redo(
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session.redo().await?))
}

/// POST /api/game/reset
pub async fn reset(
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session.reset().await?))
}

/// POST /api/game/pause
pub async fn set_paused(
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<PauseRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session.set_ai_paused(req.paused).await?))
}

/// POST /api/game/ai-vs-ai
pub async fn set_ai_vs_ai(
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<AiVsAiRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session.set_ai_vs_ai_active(req.active).await?))
}

/// GET /api/game/pgn
/// Movetext followed by the result token.
pub async fn get_pgn(Extension(session): Extension<SessionHandle>) -> Result<String, AppError> {
    let snapshot = session.snapshot().await?;
    let result = pgn::result_token(&snapshot.state);
    if snapshot.movetext.is_empty() {
        Ok(result.to_string())
    } else {
        Ok(format!("{} {result}", snapshot.movetext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uci: Option<&str>, from: Option<&str>, to: Option<&str>, promo: Option<&str>) -> MoveRequest {
        MoveRequest {
            uci: uci.map(String::from),
            from: from.map(String::from),
            to: to.map(String::from),
            promotion: promo.map(String::from),
        }
    }

    #[test]
    fn test_move_request_forms() {
        let c = request(Some("e2e4"), None, None, None).candidate().unwrap();
        assert_eq!(c.to_uci(), "e2e4");

        let c = request(None, Some("e7"), Some("e8"), Some("n")).candidate().unwrap();
        assert_eq!(c.to_uci(), "e7e8n");

        assert!(request(None, Some("e7"), None, None).candidate().is_err());
        assert!(request(Some("e9e4"), None, None, None).candidate().is_err());
    }
}
