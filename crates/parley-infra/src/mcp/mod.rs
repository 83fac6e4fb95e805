//! Tool bridge protocol clients.

pub mod sse_client;

pub use sse_client::{SseToolConnector, SseToolSession};
