//! The dispatch seam between a transport and the registration framework.

use async_trait::async_trait;

use crate::error::SkerResult;
use crate::protocol::InboundRequest;

/// Implemented by the registration framework (`sker-framework`'s
/// `PluginManager`) and driven by a transport adapter.
///
/// A transport never interprets `name`/`arguments` itself; it only frames
/// bytes on the wire into an [`InboundRequest`] and frames the resulting
/// `serde_json::Value` back out.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Routes a single inbound call to its registered handler and runs it
    /// through that handler's middleware and error-handler chain.
    async fn dispatch(&self, request: InboundRequest) -> SkerResult<serde_json::Value>;

    /// Lists the currently registered tool/resource/prompt descriptors, in
    /// the shape the MCP `list_tools`/`list_resources`/`list_prompts`
    /// calls expect.
    fn list(&self, kind: crate::protocol::RequestKind) -> Vec<serde_json::Value>;
}
