//! Wire-shaped request/response types.
//!
//! These are intentionally thin: framing (reading a line of stdio,
//! parsing an HTTP body) is the transport's job, not this crate's.

use serde::{Deserialize, Serialize};

/// The three handler families MCP exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Tool,
    Resource,
    Prompt,
}

impl RequestKind {
    /// Short label used in logs and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Resource => "resource",
            Self::Prompt => "prompt",
        }
    }
}

/// A decoded, transport-agnostic inbound call.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Correlates this call with its response; transports surface it back.
    pub id: serde_json::Value,
    /// Which handler family this call targets.
    pub kind: RequestKind,
    /// Tool name, resource URI, or prompt name.
    pub name: String,
    /// Raw arguments object, validated against the handler's input schema
    /// before the handler runs.
    pub arguments: serde_json::Value,
}

/// A dispatch result ready for the transport to frame and send.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundResponse {
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

impl OutboundResponse {
    /// Builds a successful response envelope.
    pub fn ok(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Builds a failure response envelope from a [`crate::error::SkerError`].
    pub fn err(id: serde_json::Value, error: &crate::error::SkerError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.to_rpc_error()),
        }
    }
}
