//! Session transport, tool bridge, and chat orchestration for Parley.
//!
//! This crate defines the "ports" (traits) that the infrastructure layer
//! implements -- `UserDirectory`, `LlmProvider`, `ToolSession` -- and the
//! logic that runs on top of them. It depends only on `parley-types`, never
//! on `parley-infra` or any HTTP crate.

pub mod chat;
pub mod directory;
pub mod llm;
pub mod session;
pub mod tools;
