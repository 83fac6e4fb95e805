//! Application error type mapping to HTTP responses.
//!
//! The bridge endpoints answer with plain-text bodies (clients match on the
//! message). The chat endpoint answers with `{error, message}` JSON.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use parley_types::error::{ChatError, RouteError, TransportError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// A posted message could not be delivered.
    Route(RouteError),
    /// A streaming session could not be opened.
    Transport(TransportError),
    /// A chat request failed before streaming started.
    Chat(ChatError),
}

impl From<RouteError> for AppError {
    fn from(e: RouteError) -> Self {
        AppError::Route(e)
    }
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        AppError::Transport(e)
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Route(e) => {
                let status = match e {
                    RouteError::MissingSessionId
                    | RouteError::UnknownSession(_)
                    | RouteError::Malformed(_) => StatusCode::BAD_REQUEST,
                    RouteError::Internal(ref detail) => {
                        tracing::error!(error = %detail, "message handling failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, e.to_string()).into_response()
            }
            AppError::Transport(e) => {
                tracing::error!(error = %e, "failed to open streaming session");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::Chat(e) => {
                tracing::error!(error = %e, "chat request failed");
                let body = json!({
                    "error": "Internal server error",
                    "message": e.to_string(),
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
