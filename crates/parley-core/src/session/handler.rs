use std::future::Future;
use std::pin::Pin;

use parley_types::protocol::{JsonRpcRequest, JsonRpcResponse};
use parley_types::session::SessionId;

/// Handles protocol requests arriving on a streaming session.
///
/// One handler is shared by every session of a hub. Returning `None` means
/// the request was a notification and nothing is sent back.
pub trait ProtocolHandler: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        session_id: &'a SessionId,
        request: JsonRpcRequest,
    ) -> Pin<Box<dyn Future<Output = Option<JsonRpcResponse>> + Send + 'a>>;
}
