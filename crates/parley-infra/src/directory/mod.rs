//! User directory adapters.

pub mod http;

pub use http::HttpUserDirectory;
