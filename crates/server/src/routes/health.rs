use axum::{Extension, Json};
use game_session::SessionHandle;
use serde_json::{json, Value};

/// GET /health
pub async fn health_check(Extension(session): Extension<SessionHandle>) -> Json<Value> {
    let engine_ready = session
        .snapshot()
        .await
        .map(|s| s.engine_ready)
        .unwrap_or(false);
    Json(json!({
        "status": "ok",
        "sessionRunning": !session.is_closed(),
        "engineReady": engine_ready,
    }))
}
