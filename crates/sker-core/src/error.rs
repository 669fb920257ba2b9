//! Unified error taxonomy for the sker MCP host engine.
//!
//! Every failure that can reach a client is represented as a [`SkerError`]
//! variant so that the JSON-RPC error code and payload are derived once,
//! here, instead of re-derived at each call site.

use thiserror::Error;

/// The protocol-level error codes a [`SkerError`] maps onto.
///
/// These follow the JSON-RPC 2.0 reserved range plus the MCP-specific
/// codes used for permission and conflict failures.
pub mod codes {
    /// Malformed request payload or schema violation.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Requested tool/resource/prompt name has no registered handler.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Handler raised a domain error that isn't a transport failure.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Request exceeded its configured handler timeout.
    pub const TIMEOUT: i64 = -32001;
    /// Plugin-level permission check rejected the call.
    pub const PERMISSION_DENIED: i64 = -32002;
    /// Registration-time name/URI collision.
    pub const CONFLICT: i64 = -32003;
}

/// Unified error type returned by handlers, middleware and the dispatcher.
#[derive(Debug, Error)]
pub enum SkerError {
    /// Input failed schema validation before the handler ran.
    #[error("invalid params: {0}")]
    Validation(String),

    /// No handler is registered for the requested kind/name.
    #[error("not found: {kind} '{name}'")]
    NotFound {
        /// `tool`, `resource`, or `prompt`.
        kind: &'static str,
        /// The requested handler name or URI.
        name: String,
    },

    /// A plugin boundary or isolation check rejected the call.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The handler did not complete within its configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A registration-time conflict (duplicate name, circular dependency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other failure, including handler-raised errors not covered above.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SkerError {
    /// The JSON-RPC error code this variant maps onto.
    pub fn code(&self) -> i64 {
        match self {
            Self::Validation(_) => codes::INVALID_PARAMS,
            Self::NotFound { .. } => codes::METHOD_NOT_FOUND,
            Self::Permission(_) => codes::PERMISSION_DENIED,
            Self::Timeout(_) => codes::TIMEOUT,
            Self::Conflict(_) => codes::CONFLICT,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// The `data.code` string a client can match on without parsing the
    /// numeric JSON-RPC code (§6 — "custom app errors ... with a
    /// `data.code` string").
    pub fn data_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Permission(_) => "PERMISSION_DENIED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Builds the `{code, message, data}` triple sent back over the wire.
    pub fn to_rpc_error(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
            "data": { "code": self.data_code() },
        })
    }

    /// Shorthand for [`SkerError::NotFound`] over a tool name.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "tool",
            name: name.into(),
        }
    }

    /// Shorthand for [`SkerError::NotFound`] over a resource URI.
    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "resource",
            name: uri.into(),
        }
    }

    /// Shorthand for [`SkerError::NotFound`] over a prompt name.
    pub fn prompt_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "prompt",
            name: name.into(),
        }
    }
}

impl From<serde_json::Error> for SkerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result type used throughout the dispatch path.
pub type SkerResult<T> = Result<T, SkerError>;
