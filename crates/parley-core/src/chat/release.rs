//! One-shot release of a transient tool session.
//!
//! Every terminal path of a chat request (normal finish, generation error,
//! setup failure, caller disconnect) goes through [`ReleaseHandle::release`].
//! An atomic swap picks the first caller; later callers see the session
//! already released and do nothing. Close failures are logged, never raised.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use super::session::ToolSession;

/// Which terminal path released the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseTrigger {
    Finished,
    GenerationError,
    SetupFailed,
    CallerDisconnected,
}

impl fmt::Display for ReleaseTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseTrigger::Finished => write!(f, "finished"),
            ReleaseTrigger::GenerationError => write!(f, "generation_error"),
            ReleaseTrigger::SetupFailed => write!(f, "setup_failed"),
            ReleaseTrigger::CallerDisconnected => write!(f, "caller_disconnected"),
        }
    }
}

struct Inner<S> {
    session: S,
    released: AtomicBool,
}

/// Shared handle to a session that must be closed exactly once.
pub struct ReleaseHandle<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for ReleaseHandle<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ToolSession> ReleaseHandle<S> {
    pub fn new(session: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn session(&self) -> &S {
        &self.inner.session
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Close the session if nobody has yet. Returns `true` for the one call
    /// that performed the close.
    pub async fn release(&self, trigger: ReleaseTrigger) -> bool {
        if self.inner.released.swap(true, Ordering::AcqRel) {
            debug!(
                session_id = self.inner.session.id(),
                %trigger,
                "tool session already released"
            );
            return false;
        }

        match self.inner.session.close().await {
            Ok(()) => info!(
                session_id = self.inner.session.id(),
                %trigger,
                "tool session closed"
            ),
            Err(e) => warn!(
                session_id = self.inner.session.id(),
                %trigger,
                error = %e,
                "failed to close tool session"
            ),
        }
        true
    }

    /// Guard that releases with [`ReleaseTrigger::CallerDisconnected`] if it
    /// is dropped before any other path released the session.
    pub fn release_on_drop(&self) -> ReleaseOnDrop<S> {
        ReleaseOnDrop {
            handle: Some(self.clone()),
        }
    }
}

pub struct ReleaseOnDrop<S: ToolSession> {
    handle: Option<ReleaseHandle<S>>,
}

impl<S: ToolSession> Drop for ReleaseOnDrop<S> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.is_released() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    handle.release(ReleaseTrigger::CallerDisconnected).await;
                });
            }
            Err(_) => warn!(
                session_id = handle.session().id(),
                "no runtime to release tool session on drop"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::AtomicUsize;

    use parley_types::error::ToolSessionError;
    use parley_types::protocol::{CallToolResult, ContentBlock, ToolDefinition};
    use serde_json::{Value, json};

    use super::*;

    /// Counts closes; optionally fails `list_tools` or `close`, or leaves
    /// `list_tools` pending forever.
    #[derive(Default)]
    pub(crate) struct FakeSession {
        pub(crate) closes: Arc<AtomicUsize>,
        pub(crate) calls: Arc<AtomicUsize>,
        pub(crate) fail_list: bool,
        pub(crate) hang_list: bool,
        pub(crate) fail_close: bool,
    }

    impl ToolSession for FakeSession {
        fn id(&self) -> &str {
            "fake-session"
        }

        async fn list_tools(&self) -> Result<Vec<ToolDefinition>, ToolSessionError> {
            if self.hang_list {
                std::future::pending::<()>().await;
            }
            if self.fail_list {
                return Err(ToolSessionError::Protocol("tools/list timed out".into()));
            }
            Ok(vec![ToolDefinition {
                name: "getUser".into(),
                description: "Get a user by id from the database".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "id": { "type": "string" } },
                    "required": ["id"]
                }),
            }])
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Value,
        ) -> Result<CallToolResult, ToolSessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CallToolResult {
                content: vec![ContentBlock::Text {
                    text: json!({ "tool": name, "arguments": arguments }).to_string(),
                }],
                is_error: false,
            })
        }

        async fn close(&self) -> Result<(), ToolSessionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(ToolSessionError::Closed)
            } else {
                Ok(())
            }
        }
    }
}
