//! Per-request context threaded through the middleware and handler chain.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::protocol::{InboundRequest, RequestKind};

/// State carried alongside a single in-flight request.
///
/// A `RequestContext` is created once per inbound call by the dispatcher
/// and handed down through the middleware chain to the handler. Middleware
/// can stash typed extensions (e.g. an authenticated principal) for
/// downstream middleware and the handler to read back.
pub struct RequestContext {
    /// Generated once per request; distinct from the JSON-RPC `id`, which
    /// the client controls and may reuse.
    pub request_id: Uuid,
    pub kind: RequestKind,
    pub name: String,
    pub arguments: serde_json::Value,
    /// The plugin that owns the handler for this request, if dispatch has
    /// resolved one yet.
    pub plugin_name: RwLock<Option<String>>,
    /// Cooperative cancellation signal for this request (§5: "Every
    /// request carries a cancel token with reasons {clientDisconnected,
    /// timeout, shutdown}"). The dispatcher never forcibly terminates a
    /// running handler or middleware; it calls `cancel.cancel()` on
    /// timeout or shutdown and leaves well-behaved long-running work
    /// (handlers, the cache single-flight guard, circuit-breaker probes)
    /// to observe `cancel.is_cancelled()`/`cancel.cancelled()` at their
    /// own suspension points.
    pub cancel: CancellationToken,
    extensions: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl RequestContext {
    /// Builds a fresh context for an inbound request, with a cancellation
    /// token that starts uncancelled.
    pub fn new(request: &InboundRequest) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            kind: request.kind,
            name: request.name.clone(),
            arguments: request.arguments.clone(),
            plugin_name: RwLock::new(None),
            cancel: CancellationToken::new(),
            extensions: RwLock::new(HashMap::new()),
        }
    }

    /// Stores a typed extension value, overwriting any previous value of
    /// the same type.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
        self.extensions
            .write()
            .insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Retrieves a previously stored extension value, if present.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.extensions
            .read()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Opens a `tracing::Span` carrying this request's `request_id`, kind
    /// and name — the automatic equivalent of spec §4.2's
    /// `child(context)`/`setRequestContext(requestId, userId?)`. Meant to
    /// be entered once, by the dispatcher, around the whole
    /// middleware-and-handler call: every event logged on that task
    /// afterwards inherits `request_id` without the logging call site
    /// having to attach it itself.
    ///
    /// The `user_id` field is left [`tracing::field::Empty`] here, since
    /// authentication is a framework-level concern this crate doesn't
    /// know about; callers that do (the dispatcher, once a `Principal`
    /// extension has been attached) should `span.record("user_id", ...)`
    /// before entering it.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "request",
            request_id = %self.request_id,
            kind = ?self.kind,
            name = %self.name,
            user_id = tracing::field::Empty,
        )
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
