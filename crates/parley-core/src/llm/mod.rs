//! Generation provider port and stream instrumentation.

pub mod provider;
pub mod span;

pub use provider::{LlmProvider, LlmStream};
pub use span::StreamInSpan;
