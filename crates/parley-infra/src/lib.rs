//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`: the
//! reqwest-backed user directory, the OpenAI-compatible streaming provider,
//! and the SSE client for tool bridge sessions. Also loads `config.toml`.

pub mod config;
pub mod directory;
pub mod llm;
pub mod mcp;
