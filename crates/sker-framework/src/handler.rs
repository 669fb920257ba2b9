//! The handler metadata model: what gets registered for a tool, resource,
//! or prompt, and the boxed callable the dispatcher invokes.

use std::sync::Arc;

use sker_core::{RequestContext, SkerError, SkerResult};
use tower::util::BoxCloneSyncService;

use crate::error_chain::ErrorHandlerChain;

/// One input parameter of a handler's schema, used to build the JSON
/// Schema surfaced to clients and to validate incoming arguments.
#[derive(Debug, Clone)]
pub struct InputParam {
    pub name: String,
    pub description: Option<String>,
    pub required: bool,
    /// JSON Schema fragment describing this parameter's type.
    pub schema: serde_json::Value,
}

/// The boxed, cloneable service a [`HandlerDescriptor`] resolves to.
///
/// Built once at registration time by composing the plugin's middleware
/// layers around the raw handler callable — see
/// [`crate::middleware::MiddlewareExecutor`].
pub type HandlerService = BoxCloneSyncService<Arc<RequestContext>, serde_json::Value, sker_core::SkerError>;

/// A single registered tool, resource, or prompt.
///
/// Immutable once installed in the [`crate::registry::Registry`]: the
/// middleware chain is baked into `service` at construction time (§4.9 —
/// "build once per descriptor, do not rebuild per request"), and
/// `error_handlers` is this handler's own priority-ordered recovery chain,
/// consulted by [`crate::manager::PluginManager`] only for failures this
/// descriptor's `service` itself raises.
#[derive(Clone)]
pub struct HandlerDescriptor {
    pub kind: sker_core::RequestKind,
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
    pub owner_plugin: String,
    pub service: HandlerService,
    pub error_handlers: Arc<ErrorHandlerChain>,
}

impl HandlerDescriptor {
    /// Builds a descriptor with an empty error-handler chain; use
    /// [`HandlerDescriptor::with_error_handlers`] to attach one.
    pub fn new(
        kind: sker_core::RequestKind,
        name: impl Into<String>,
        description: Option<String>,
        input_schema: serde_json::Value,
        owner_plugin: impl Into<String>,
        service: HandlerService,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            description,
            input_schema,
            owner_plugin: owner_plugin.into(),
            service,
            error_handlers: Arc::new(ErrorHandlerChain::new()),
        }
    }

    pub fn with_error_handlers(mut self, chain: ErrorHandlerChain) -> Self {
        self.error_handlers = Arc::new(chain);
        self
    }

    /// Builds the `list_tools`/`list_resources`/`list_prompts` entry for
    /// this handler.
    pub fn manifest_entry(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }

    /// Validates `arguments` against this handler's `input_schema` before
    /// a call is allowed to reach the middleware chain. Mirrors the
    /// "validation" built-in middleware's contract (§4.9) but runs as an
    /// explicit dispatcher step (§4.11 step 3) so a schema failure never
    /// needs to unwind through handler-specific middleware first.
    pub fn validate_arguments(&self, arguments: &serde_json::Value) -> SkerResult<()> {
        if self.input_schema.is_null() {
            return Ok(());
        }
        let validator = jsonschema::validator_for(&self.input_schema)
            .map_err(|e| SkerError::Internal(format!("invalid input schema: {e}")))?;
        let errors: Vec<String> = validator
            .iter_errors(arguments)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SkerError::Validation(errors.join("; ")))
        }
    }

    /// Runs this handler's full middleware chain.
    pub async fn invoke(&self, ctx: Arc<RequestContext>) -> SkerResult<serde_json::Value> {
        use tower::Service;
        let mut service = self.service.clone();
        std::future::poll_fn(|cx| service.poll_ready(cx)).await?;
        service.call(ctx).await
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("owner_plugin", &self.owner_plugin)
            .finish_non_exhaustive()
    }
}
