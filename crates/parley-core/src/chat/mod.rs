//! Chat streaming: per request, open a transient tool session against the
//! bridge, stream generation that may call tools through it, and release the
//! session exactly once.

pub mod orchestrator;
pub mod release;
pub mod session;

pub use orchestrator::{ChatEvent, ChatOrchestrator, ChatSettings, ChatStream};
pub use release::{ReleaseHandle, ReleaseTrigger};
pub use session::{ToolSession, ToolSessionConnector};
