//! Transport adapters binding the sker MCP host engine's
//! [`sker_core::Dispatcher`] to the MCP SDK (`rmcp`), the black-box
//! JSON-RPC framing spec.md §1 treats as an external collaborator.
//!
//! - [`stdio::StdioTransport`] — the default transport, serving over the
//!   host process's own stdin/stdout.
//! - [`http::HttpTransport`] — the optional HTTP transport (feature
//!   `http`), built on the SDK's streamable-HTTP server support and
//!   `axum` as the listener.

mod handler;

#[cfg(feature = "stdio")]
pub mod stdio;

#[cfg(feature = "http")]
pub mod http;

pub use handler::SkerServerHandler;

#[cfg(feature = "stdio")]
pub use stdio::StdioTransport;

#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportConfig};
