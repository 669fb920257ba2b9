//! # sker-core
//!
//! Protocol-agnostic foundation for the sker MCP host engine: the error
//! taxonomy, the wire-shaped request/response envelopes, the per-request
//! context, and the `Dispatcher`/`Transport` traits that tie a transport
//! adapter to the registration framework in `sker-framework`.
//!
//! ## Layers
//!
//! - [`error`] — [`SkerError`](error::SkerError), the single error type
//!   carried from a handler all the way back to a JSON-RPC response.
//! - [`protocol`] — [`InboundRequest`](protocol::InboundRequest) and
//!   [`OutboundResponse`](protocol::OutboundResponse).
//! - [`context`] — [`RequestContext`](context::RequestContext), threaded
//!   through the middleware chain for a single call.
//! - [`dispatcher`] / [`transport`] — the seam a transport adapter and the
//!   registration framework meet at.

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod transport;

pub use context::RequestContext;
pub use dispatcher::Dispatcher;
pub use error::{SkerError, SkerResult, codes};
pub use protocol::{InboundRequest, OutboundResponse, RequestKind};
pub use transport::Transport;

/// Common imports for crates building on `sker-core`.
pub mod prelude {
    pub use super::{
        Dispatcher, InboundRequest, OutboundResponse, RequestContext, RequestKind, SkerError,
        SkerResult, Transport,
    };
}
