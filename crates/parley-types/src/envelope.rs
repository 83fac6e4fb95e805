//! Uniform result envelope returned by every tool handler.
//!
//! ```json
//! { "success": false, "data": null, "message": "User with id 'u1' not found" }
//! ```
//!
//! Downstream failure modes are folded into this shape so the tool protocol
//! only has to know about `success`.

use serde::{Deserialize, Serialize};

/// `{success, data, message}` outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope<T = serde_json::Value> {
    pub success: bool,
    /// Always serialized, as `null` on failure.
    pub data: Option<T>,
    pub message: String,
}

impl<T> ResultEnvelope<T> {
    /// Successful outcome carrying `data`.
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: message.into(),
        }
    }

    /// Failed outcome with no data.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
        }
    }

    /// Protocol-level error flag derived from `success`.
    pub fn is_error(&self) -> bool {
        !self.success
    }
}
