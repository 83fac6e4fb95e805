use thiserror::Error;

use crate::envelope::ResultEnvelope;
use crate::llm::LlmError;
use crate::session::SessionId;

/// One field-level argument violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while invoking a catalog tool.
///
/// None of these escape the bridge: each is folded into a failed
/// [`ResultEnvelope`] through [`ToolError::into_envelope`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("Invalid arguments for '{tool}': {}", join_violations(.violations))]
    Validation {
        tool: String,
        violations: Vec<FieldViolation>,
    },

    #[error("{entity} with id '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Failed to {action}: {message}")]
    Upstream {
        action: &'static str,
        message: String,
    },

    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("Tool '{tool}' failed: {message}")]
    Internal { tool: String, message: String },
}

impl ToolError {
    pub fn into_envelope<T>(self) -> ResultEnvelope<T> {
        ResultEnvelope::failure(self.to_string())
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from the session registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session id '{0}' is already registered")]
    IdCollision(SessionId),

    #[error("could not allocate a unique session id after {0} attempts")]
    IdSpaceExhausted(u32),
}

/// Errors from one streaming transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("transport setup failed: {0}")]
    Setup(String),
}

/// Outcome of routing an inbound message to a session.
///
/// `Display` strings are the client-facing response bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("Session ID is required")]
    MissingSessionId,

    #[error("No transport found for sessionId")]
    UnknownSession(String),

    #[error("Invalid message: {0}")]
    Malformed(String),

    #[error("Internal server error")]
    Internal(String),
}

/// Errors from the downstream user directory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("{status} {reason}")]
    Status { status: u16, reason: String },

    #[error("{0}")]
    Network(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// Errors from a client-side tool session against a bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolSessionError {
    #[error("failed to connect to tool bridge: {0}")]
    Connect(String),

    #[error("tool protocol error: {0}")]
    Protocol(String),

    #[error("tool bridge returned error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("tool session is closed")]
    Closed,
}

/// Errors from one chat request.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid chat request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Setup(#[from] ToolSessionError),

    #[error(transparent)]
    Generation(#[from] LlmError),
}

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("failed to read config file {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid value '{value}' for {var}")]
    InvalidEnv { var: String, value: String },
}
