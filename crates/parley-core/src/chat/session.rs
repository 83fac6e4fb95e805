//! Client side of a tool bridge session.

use std::future::Future;

use parley_types::error::ToolSessionError;
use parley_types::protocol::{CallToolResult, ToolDefinition};
use serde_json::Value;

/// An open, initialized session against a tool bridge.
///
/// Implementations live in parley-infra (e.g., `SseToolSession`).
pub trait ToolSession: Send + Sync + 'static {
    /// Bridge-assigned session id.
    fn id(&self) -> &str;

    fn list_tools(&self) -> impl Future<Output = Result<Vec<ToolDefinition>, ToolSessionError>> + Send;

    fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> impl Future<Output = Result<CallToolResult, ToolSessionError>> + Send;

    /// End the session. Callers go through `ReleaseHandle`, which guarantees
    /// this runs at most once.
    fn close(&self) -> impl Future<Output = Result<(), ToolSessionError>> + Send;
}

/// Opens tool sessions.
pub trait ToolSessionConnector: Send + Sync + 'static {
    type Session: ToolSession;

    /// Connect and complete the protocol handshake. A failed connect leaves
    /// nothing open.
    fn connect(&self) -> impl Future<Output = Result<Self::Session, ToolSessionError>> + Send;
}
