//! POST /messages?sessionId=<id>
//!
//! Hands the body to the named session. The response to the message itself
//! travels over that session's stream; this endpoint only acknowledges.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use crate::http::error::AppError;
use crate::state::BridgeState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

pub async fn post_message(
    State(state): State<BridgeState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), AppError> {
    let delivery = state
        .hub
        .router()
        .route(query.session_id.as_deref(), &body)
        .await?;
    tracing::debug!(?delivery, "message accepted");
    Ok((StatusCode::ACCEPTED, "Accepted"))
}
