//! Axum routers with middleware.
//!
//! Middleware on both: permissive CORS and request tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use parley_core::chat::ToolSessionConnector;

use crate::http::handlers;
use crate::state::{BridgeState, ChatState};

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Tool bridge: `GET /sse`, `POST /messages`, `GET /health`.
pub fn build_bridge_router(state: BridgeState) -> Router {
    let post_endpoint = state.hub.settings().post_endpoint.clone();

    Router::new()
        .route("/sse", get(handlers::sse::open_stream))
        .route(&post_endpoint, post(handlers::messages::post_message))
        .route("/health", get(handlers::health::bridge_health))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Chat API: `POST /api/chat`, `GET /health`.
pub fn build_chat_router<C: ToolSessionConnector>(state: ChatState<C>) -> Router {
    Router::new()
        .route("/api/chat", post(handlers::chat::stream_chat::<C>))
        .route("/health", get(handlers::health::chat_health))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use futures_util::{StreamExt, stream};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use parley_core::chat::{ChatOrchestrator, ChatSettings, ToolSession};
    use parley_core::directory::UserDirectory;
    use parley_core::llm::{LlmProvider, LlmStream};
    use parley_infra::mcp::SseToolConnector;
    use parley_types::config::BridgeConfig;
    use parley_types::error::{DirectoryError, ToolSessionError};
    use parley_types::llm::{CompletionRequest, LlmError, StopReason, StreamEvent, Usage};
    use parley_types::protocol::{CallToolResult, ToolDefinition};
    use parley_types::user::NewUser;

    use super::*;

    /// In-memory directory that counts every call.
    #[derive(Default)]
    struct MemoryDirectory {
        users: Mutex<HashMap<String, Value>>,
        calls: AtomicUsize,
    }

    impl MemoryDirectory {
        fn with_user(id: &str, name: &str) -> Self {
            let directory = Self::default();
            directory
                .users
                .lock()
                .unwrap()
                .insert(id.to_string(), json!({ "_id": id, "name": name }));
            directory
        }
    }

    impl UserDirectory for MemoryDirectory {
        async fn add_user(&self, user: &NewUser) -> Result<Value, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut users = self.users.lock().unwrap();
            let id = format!("u{}", users.len() + 1);
            users.insert(id.clone(), json!({ "_id": id, "name": user.name }));
            Ok(json!(id))
        }

        async fn get_user(&self, id: &str) -> Result<Option<Value>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.users.lock().unwrap().get(id).cloned())
        }

        async fn delete_user(&self, id: &str) -> Result<Option<Value>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.users.lock().unwrap().remove(id))
        }
    }

    fn bridge_state(directory: MemoryDirectory, heartbeat_secs: u64) -> BridgeState {
        let config = BridgeConfig {
            heartbeat_secs,
            ..BridgeConfig::default()
        };
        BridgeState::with_directory(&config, Arc::new(directory))
    }

    async fn body_text(body: Body) -> String {
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Read SSE frames until one contains `needle`.
    async fn read_until(frames: &mut axum::body::BodyDataStream, needle: &str) -> String {
        let read = async {
            let mut seen = String::new();
            while let Some(frame) = frames.next().await {
                seen.push_str(&String::from_utf8_lossy(&frame.unwrap()));
                if seen.contains(needle) {
                    return seen;
                }
            }
            panic!("stream ended before {needle:?}; got {seen:?}");
        };
        tokio::time::timeout(Duration::from_secs(5), read)
            .await
            .expect("timed out waiting for SSE frame")
    }

    fn session_id_from(handshake: &str) -> String {
        let start = handshake.find("sessionId=").unwrap() + "sessionId=".len();
        handshake[start..]
            .chars()
            .take_while(|c| !c.is_whitespace())
            .collect()
    }

    async fn wait_for_empty(state: &BridgeState) {
        for _ in 0..100 {
            if state.hub.registry().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!(
            "registry still holds {} session(s)",
            state.hub.registry().len()
        );
    }

    // ---- bridge router --------------------------------------------------

    #[tokio::test]
    async fn post_without_session_id_is_rejected() {
        let app = build_bridge_router(bridge_state(MemoryDirectory::default(), 60));
        let response = app
            .oneshot(
                Request::post("/messages")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response.into_body()).await, "Session ID is required");
    }

    #[tokio::test]
    async fn post_to_unknown_session_is_rejected() {
        let app = build_bridge_router(bridge_state(MemoryDirectory::default(), 60));
        let response = app
            .oneshot(
                Request::post("/messages?sessionId=zzz")
                    .body(Body::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_text(response.into_body()).await,
            "No transport found for sessionId"
        );
    }

    #[tokio::test]
    async fn health_reports_registry_size() {
        let state = bridge_state(MemoryDirectory::default(), 60);
        let app = build_bridge_router(state.clone());

        let health = |app: Router| async move {
            let response = app
                .oneshot(Request::get("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            serde_json::from_str::<Value>(&body_text(response.into_body()).await).unwrap()
        };

        let body = health(app.clone()).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["activeConnections"], 0);
        assert!(body["timestamp"].is_string());

        let session = state.hub.open().await.unwrap();
        let body = health(app.clone()).await;
        assert_eq!(body["activeConnections"], 1);
        assert_eq!(body["sessions"][0]["id"], session.id().as_str());

        drop(session);
        assert_eq!(health(app).await["activeConnections"], 0);
    }

    #[tokio::test]
    async fn sse_handshake_then_message_round_trip() {
        let state = bridge_state(MemoryDirectory::default(), 60);
        let app = build_bridge_router(state.clone());

        let response = app
            .clone()
            .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/event-stream"
        );

        let mut frames = response.into_body().into_data_stream();
        let handshake = read_until(&mut frames, "sessionId=").await;
        assert!(handshake.contains("event: endpoint"));
        assert!(handshake.contains("data: /messages?sessionId="));
        let session_id = session_id_from(&handshake);
        assert!(state.hub.registry().contains(&session_id));

        let call = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": { "name": "getUser", "arguments": { "id": "u1" } }
        });
        let posted = app
            .oneshot(
                Request::post(format!("/messages?sessionId={session_id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(call.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(posted.status(), StatusCode::ACCEPTED);

        let message = read_until(&mut frames, "event: message").await;
        assert!(message.contains("\"id\":7"));
        assert!(message.contains("User with id 'u1' not found"));
        assert!(message.contains("\"isError\":true"));

        drop(frames);
        assert!(state.hub.registry().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_client_error() {
        let state = bridge_state(MemoryDirectory::default(), 60);
        let session = state.hub.open().await.unwrap();
        let app = build_bridge_router(state.clone());

        let response = app
            .oneshot(
                Request::post(format!("/messages?sessionId={}", session.id()))
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(state.hub.registry().contains(session.id().as_str()));
    }

    #[tokio::test]
    async fn sse_client_lists_and_calls_tools_end_to_end() {
        let state = bridge_state(MemoryDirectory::with_user("u1", "Ada"), 1);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(axum::serve(listener, build_bridge_router(state.clone())).into_future());

        let connector = SseToolConnector::new(
            &format!("http://{addr}/sse"),
            Duration::from_secs(5),
            None,
        )
        .unwrap();
        let session = connector.connect().await.unwrap();
        assert!(state.hub.registry().contains(session.id()));

        let mut names: Vec<String> = session
            .list_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        names.sort();
        assert_eq!(names, ["addUser", "deleteUser", "getUser"]);

        let found = session.call_tool("getUser", json!({ "id": "u1" })).await.unwrap();
        assert!(!found.is_error);
        assert_eq!(found.envelope().unwrap().data, Some(json!({ "_id": "u1", "name": "Ada" })));

        let invalid = session
            .call_tool("addUser", json!({ "name": "Bo", "email": "not-an-email", "password": "secret1" }))
            .await
            .unwrap();
        assert!(invalid.is_error);
        assert!(invalid.text().contains("email"));

        session.close().await.unwrap();
        wait_for_empty(&state).await;
    }

    // ---- chat router ----------------------------------------------------

    type Script = Vec<Result<StreamEvent, LlmError>>;

    struct ScriptedProvider {
        steps: Mutex<VecDeque<Script>>,
    }

    impl ScriptedProvider {
        fn new(steps: Vec<Script>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
            }
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn stream(&self, _request: CompletionRequest) -> LlmStream {
            let script = self.steps.lock().unwrap().pop_front().unwrap_or_default();
            Box::pin(stream::iter(script))
        }
    }

    struct CountingSession {
        closes: Arc<AtomicUsize>,
    }

    impl ToolSession for CountingSession {
        fn id(&self) -> &str {
            "fake-session"
        }

        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolSessionError> {
            Ok(Vec::new())
        }

        async fn call_tool(&self, _name: &str, _arguments: Value) -> Result<CallToolResult, ToolSessionError> {
            Err(ToolSessionError::Closed)
        }

        async fn close(&self) -> Result<(), ToolSessionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingConnector {
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ToolSessionConnector for CountingConnector {
        type Session = CountingSession;

        async fn connect(&self) -> Result<CountingSession, ToolSessionError> {
            if self.fail {
                return Err(ToolSessionError::Connect("connection refused".into()));
            }
            Ok(CountingSession {
                closes: Arc::clone(&self.closes),
            })
        }
    }

    fn settings() -> ChatSettings {
        ChatSettings {
            model: "test-model".into(),
            system_prompt: None,
            max_tokens: 256,
            temperature: None,
            max_steps: 3,
        }
    }

    fn chat_app<C: ToolSessionConnector>(connector: C, provider: ScriptedProvider) -> Router {
        build_chat_router(ChatState {
            orchestrator: ChatOrchestrator::new(Arc::new(connector), Arc::new(provider), settings()),
        })
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::post("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn text(delta: &str) -> Result<StreamEvent, LlmError> {
        Ok(StreamEvent::TextDelta {
            text: delta.to_string(),
        })
    }

    fn finish(reason: StopReason) -> Vec<Result<StreamEvent, LlmError>> {
        vec![
            Ok(StreamEvent::MessageDelta { stop_reason: reason }),
            Ok(StreamEvent::Usage(Usage {
                input_tokens: 10,
                output_tokens: 4,
            })),
            Ok(StreamEvent::Done),
        ]
    }

    #[tokio::test]
    async fn chat_streams_data_parts_and_releases_session() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut script = vec![Ok(StreamEvent::Connected), text("Hel"), text("lo")];
        script.extend(finish(StopReason::EndTurn));
        let app = chat_app(
            CountingConnector {
                closes: Arc::clone(&closes),
                fail: false,
            },
            ScriptedProvider::new(vec![script]),
        );

        let response = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-vercel-ai-data-stream"], "v1");

        let body = body_text(response.into_body()).await;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "0:\"Hel\"");
        assert_eq!(lines[1], "0:\"lo\"");
        assert!(lines[2].starts_with("e:"));
        assert!(lines[3].starts_with("d:"));
        assert!(lines[3].contains("\"finishReason\":\"stop\""));
        assert_eq!(lines.len(), 4);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn chat_generation_error_ends_with_error_part() {
        let closes = Arc::new(AtomicUsize::new(0));
        let app = chat_app(
            CountingConnector {
                closes: Arc::clone(&closes),
                fail: false,
            },
            ScriptedProvider::new(vec![vec![
                text("partial"),
                Err(LlmError::Stream("connection reset".into())),
            ]]),
        );

        let response = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_text(response.into_body()).await;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "0:\"partial\"");
        assert!(lines[1].starts_with("3:"));
        assert!(lines[1].contains("connection reset"));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn chat_malformed_body_is_json_500() {
        let closes = Arc::new(AtomicUsize::new(0));
        let app = chat_app(
            CountingConnector {
                closes: Arc::clone(&closes),
                fail: false,
            },
            ScriptedProvider::new(Vec::new()),
        );

        let response = app.oneshot(chat_request("{\"messages\": 42}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_text(response.into_body()).await).unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn chat_bridge_unreachable_is_json_500() {
        let app = chat_app(
            CountingConnector {
                closes: Arc::new(AtomicUsize::new(0)),
                fail: true,
            },
            ScriptedProvider::new(Vec::new()),
        );

        let response = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"hi"}]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&body_text(response.into_body()).await).unwrap();
        assert!(body["message"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn chat_health_is_ok() {
        let app = chat_app(
            CountingConnector {
                closes: Arc::new(AtomicUsize::new(0)),
                fail: false,
            },
            ScriptedProvider::new(Vec::new()),
        );
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response.into_body()).await).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn chat_calls_bridge_tools_end_to_end() {
        let bridge = bridge_state(MemoryDirectory::with_user("u1", "Ada"), 1);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(axum::serve(listener, build_bridge_router(bridge.clone())).into_future());

        let connector = SseToolConnector::new(
            &format!("http://{addr}/sse"),
            Duration::from_secs(5),
            Some(Duration::from_secs(5)),
        )
        .unwrap();

        let mut first = vec![Ok(StreamEvent::ToolUseComplete {
            id: "call_1".into(),
            name: "getUser".into(),
            input: json!({ "id": "u1" }),
        })];
        first.extend(finish(StopReason::ToolUse));
        let mut second = vec![text("Ada is u1.")];
        second.extend(finish(StopReason::EndTurn));

        let app = chat_app(connector, ScriptedProvider::new(vec![first, second]));
        let response = app
            .oneshot(chat_request(r#"{"messages":[{"role":"user","content":"who is u1?"}]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_text(response.into_body()).await;
        let lines: Vec<&str> = body.lines().collect();
        assert!(lines[0].starts_with("9:"));
        assert!(lines[0].contains("\"toolName\":\"getUser\""));
        assert!(lines[1].starts_with("a:"));
        assert!(lines[1].contains("Ada"));
        assert!(lines.iter().any(|l| *l == "0:\"Ada is u1.\""));
        assert!(lines.last().unwrap().starts_with("d:"));

        wait_for_empty(&bridge).await;
    }
}
