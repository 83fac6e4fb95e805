//! HTTP layer for Parley.
//!
//! Two axum routers: the tool bridge (`/sse`, `/messages`, `/health`) and the
//! chat API (`/api/chat`, `/health`). Both allow any origin.

pub mod data_stream;
pub mod error;
pub mod handlers;
pub mod router;
