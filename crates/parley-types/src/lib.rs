//! Shared domain types for Parley.
//!
//! This crate contains the types that cross crate boundaries: streaming
//! session identity and status, the uniform tool result envelope, the
//! JSON-RPC tool protocol, LLM request/stream shapes, configuration, and the
//! error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod envelope;
pub mod error;
pub mod llm;
pub mod protocol;
pub mod session;
pub mod user;
