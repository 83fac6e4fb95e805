//! Tool invocation bridge: typed tools, the catalog, the user tools, and the
//! protocol handler that exposes them over streaming sessions.

pub mod bridge;
pub mod catalog;
pub mod schema;
pub mod users;

pub use bridge::ToolBridge;
pub use catalog::{Tool, ToolCatalog};
pub use users::register_user_tools;
