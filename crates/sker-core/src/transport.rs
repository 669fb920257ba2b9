//! Transport abstraction implemented by `sker-transport`'s adapters.

use async_trait::async_trait;
use std::sync::Arc;

use crate::dispatcher::Dispatcher;

/// A running transport loop: reads inbound calls from its wire format,
/// hands each to the [`Dispatcher`], and writes the response back.
///
/// Out of scope for this crate: JSON-RPC framing itself is owned by the
/// external MCP SDK the transport wraps (see `sker-transport`).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Runs the transport loop until the server is shut down or the
    /// transport's channel closes.
    async fn serve(&self, dispatcher: Arc<dyn Dispatcher>) -> crate::error::SkerResult<()>;
}
