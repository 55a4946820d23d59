use std::sync::Arc;

use axum::{extract::Path, Extension, Json};
use game_session::{SessionHandle, Settings};
use serde::Deserialize;
use validator::Validate;

use crate::error::AppError;
use crate::settings_store::{is_valid_session_id, SettingsStore, StoredSettings};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSettingsRequest {
    pub session_id: String,
    #[serde(flatten)]
    pub settings: Settings,
}

/// GET /api/settings/{session_id}
pub async fn get_settings(
    Extension(store): Extension<Arc<dyn SettingsStore>>,
    Path(session_id): Path<String>,
) -> Result<Json<StoredSettings>, AppError> {
    // Reject before touching storage
    if !is_valid_session_id(&session_id) {
        return Err(AppError::BadRequest("Invalid session ID format".into()));
    }

    store
        .load(&session_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Settings not found".into()))
}

/// POST /api/settings
/// Stores the settings and applies them to the running game.
pub async fn save_settings(
    Extension(store): Extension<Arc<dyn SettingsStore>>,
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<SaveSettingsRequest>,
) -> Result<Json<StoredSettings>, AppError> {
    if !is_valid_session_id(&req.session_id) {
        return Err(AppError::BadRequest("Invalid session ID format".into()));
    }
    req.settings
        .validate()
        .map_err(|e| AppError::BadRequest(format!("Invalid input: {e}")))?;

    let stored = store.save(&req.session_id, req.settings.clone());
    session.update_settings(req.settings).await?;

    tracing::info!(session_id = %stored.session_id, mode = ?stored.settings.mode, "Settings saved");
    Ok(Json(stored))
}
