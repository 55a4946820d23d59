use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use game_session::SessionError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Session(e) => {
                let status = match e {
                    SessionError::IllegalMove(_)
                    | SessionError::InvalidPosition(_)
                    | SessionError::WrongMode => StatusCode::BAD_REQUEST,
                    SessionError::GameOver
                    | SessionError::NotYourTurn
                    | SessionError::AiControlled
                    | SessionError::NothingToUndo
                    | SessionError::NothingToRedo
                    | SessionError::HistoryFull(_) => StatusCode::CONFLICT,
                    SessionError::HistoryReconstruction(_) => {
                        tracing::error!("Session error: {e}");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    SessionError::Closed => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.to_string())
            }
            AppError::Anyhow(e) => {
                tracing::error!("Unexpected error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(json!({ "detail": message }))).into_response()
    }
}
