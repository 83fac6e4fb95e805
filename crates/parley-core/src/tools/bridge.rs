//! JSON-RPC front of the tool catalog.
//!
//! Answers `initialize`, `ping`, `tools/list`, and `tools/call` for every
//! session of a hub. Tool outcomes are wrapped as text content; a failed
//! envelope sets `isError` on the protocol result instead of producing a
//! JSON-RPC error.

use std::future::Future;
use std::pin::Pin;

use parley_types::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, METHOD_INITIALIZE, METHOD_PING,
    METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, PROTOCOL_VERSION, error_codes,
};
use parley_types::session::SessionId;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::catalog::ToolCatalog;
use crate::session::ProtocolHandler;

pub struct ToolBridge {
    catalog: ToolCatalog,
    server_info: Implementation,
}

impl ToolBridge {
    pub fn new(catalog: ToolCatalog, server_name: impl Into<String>) -> Self {
        Self {
            catalog,
            server_info: Implementation {
                name: server_name.into(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    fn initialize(&self) -> Result<Value, JsonRpcError> {
        to_result(&InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            server_info: self.server_info.clone(),
            capabilities: json!({ "tools": { "listChanged": false } }),
        })
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        to_result(&ListToolsResult {
            tools: self.catalog.definitions(),
        })
    }

    async fn call_tool(
        &self,
        session_id: &SessionId,
        params: Option<Value>,
    ) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = params
            .ok_or_else(|| JsonRpcError::new(error_codes::INVALID_PARAMS, "Missing params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| {
                    JsonRpcError::new(error_codes::INVALID_PARAMS, format!("Invalid params: {e}"))
                })
            })?;

        debug!(session_id = %session_id, tool = %params.name, "calling tool");
        let envelope = self.catalog.invoke(&params.name, params.arguments).await;
        info!(
            session_id = %session_id,
            tool = %params.name,
            success = envelope.success,
            "tool call finished"
        );
        to_result(&CallToolResult::from_envelope(&envelope))
    }
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()))
}

impl ProtocolHandler for ToolBridge {
    fn handle<'a>(
        &'a self,
        session_id: &'a SessionId,
        request: JsonRpcRequest,
    ) -> Pin<Box<dyn Future<Output = Option<JsonRpcResponse>> + Send + 'a>> {
        Box::pin(async move {
            if request.is_notification() {
                debug!(session_id = %session_id, method = %request.method, "notification");
                return None;
            }

            let outcome = match request.method.as_str() {
                METHOD_INITIALIZE => self.initialize(),
                METHOD_PING => Ok(json!({})),
                METHOD_TOOLS_LIST => self.list_tools(),
                METHOD_TOOLS_CALL => self.call_tool(session_id, request.params).await,
                other => Err(JsonRpcError::new(
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {other}"),
                )),
            };

            Some(match outcome {
                Ok(result) => JsonRpcResponse::success(request.id, result),
                Err(error) => JsonRpcResponse::failure(request.id, error),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_types::protocol::{CallToolResult, JsonRpcRequest};

    use super::*;
    use crate::tools::users::register_user_tools;
    use crate::tools::users::test_support::FakeDirectory;

    fn bridge(directory: Arc<FakeDirectory>) -> ToolBridge {
        let mut catalog = ToolCatalog::new();
        register_user_tools(&mut catalog, directory);
        ToolBridge::new(catalog, "parley-bridge")
    }

    async fn call(bridge: &ToolBridge, method: &str, params: Option<Value>) -> JsonRpcResponse {
        let session = SessionId::from("s1");
        bridge
            .handle(&session, JsonRpcRequest::new(1, method, params))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_server() {
        let bridge = bridge(Arc::new(FakeDirectory::default()));
        let response = call(&bridge, "initialize", Some(json!({}))).await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "parley-bridge");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn ping_is_empty_object() {
        let bridge = bridge(Arc::new(FakeDirectory::default()));
        let response = call(&bridge, "ping", None).await;
        assert_eq!(response.result.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let bridge = bridge(Arc::new(FakeDirectory::default()));
        let session = SessionId::from("s1");
        let response = bridge
            .handle(
                &session,
                JsonRpcRequest::notification("notifications/initialized", None),
            )
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn lists_user_tools() {
        let bridge = bridge(Arc::new(FakeDirectory::default()));
        let response = call(&bridge, "tools/list", None).await;
        let tools = response.result.unwrap()["tools"].clone();
        assert_eq!(tools.as_array().unwrap().len(), 3);
        assert_eq!(tools[1]["name"], "getUser");
        assert_eq!(tools[1]["inputSchema"]["type"], "object");
    }

    #[tokio::test]
    async fn missing_user_sets_is_error() {
        let bridge = bridge(Arc::new(FakeDirectory::default()));
        let response = call(
            &bridge,
            "tools/call",
            Some(json!({ "name": "getUser", "arguments": { "id": "u1" } })),
        )
        .await;
        assert!(response.error.is_none());
        let result: CallToolResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert!(result.is_error);
        let envelope = result.envelope().unwrap();
        assert_eq!(envelope.message, "User with id 'u1' not found");
        assert!(envelope.data.is_none());
    }

    #[tokio::test]
    async fn found_user_is_not_an_error() {
        let bridge = bridge(Arc::new(FakeDirectory::with_user("u1", "Ada")));
        let response = call(
            &bridge,
            "tools/call",
            Some(json!({ "name": "getUser", "arguments": { "id": "u1" } })),
        )
        .await;
        let result: CallToolResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert!(!result.is_error);
        assert!(result.text().contains("\"success\": true"));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let bridge = bridge(Arc::new(FakeDirectory::default()));
        let response = call(
            &bridge,
            "tools/call",
            Some(json!({ "name": "dropTables", "arguments": {} })),
        )
        .await;
        let result: CallToolResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert!(result.is_error);
        assert!(result.text().contains("dropTables"));
    }

    #[tokio::test]
    async fn bad_params_are_invalid_params() {
        let bridge = bridge(Arc::new(FakeDirectory::default()));
        let response = call(&bridge, "tools/call", Some(json!({ "arguments": {} }))).await;
        assert_eq!(response.error.unwrap().code, error_codes::INVALID_PARAMS);

        let response = call(&bridge, "tools/call", None).await;
        assert_eq!(response.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let bridge = bridge(Arc::new(FakeDirectory::default()));
        let response = call(&bridge, "resources/list", None).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(response.id, Some(json!(1)));
    }
}
