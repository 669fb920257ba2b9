//! The error-handler chain: when a handler or middleware returns a
//! [`SkerError`], the first applicable, highest-priority handler decides
//! how to recover.

use std::sync::Arc;

use sker_core::{RequestContext, SkerError};

/// What an error handler decides to do with a failure it claims.
pub enum RecoveryStrategy {
    /// Replace the error with a successful result (e.g. serve stale cache
    /// data, or a default value).
    Recover(serde_json::Value),
    /// Replace the error with a different error (e.g. translate an
    /// internal error into a validation error for the client).
    Remap(SkerError),
    /// Leave the original error untouched and let the chain try the next
    /// handler.
    Continue,
}

/// One entry in the error-handler chain.
pub struct ErrorHandlerEntry {
    pub name: String,
    /// Lower values are tried first (§3, §4.10 — "consulted in ascending
    /// priority").
    pub priority: i32,
    pub predicate: Arc<dyn Fn(&SkerError) -> bool + Send + Sync>,
    pub handle: Arc<dyn Fn(&SkerError, &RequestContext) -> RecoveryStrategy + Send + Sync>,
}

impl std::fmt::Debug for ErrorHandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandlerEntry")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// An ordered set of [`ErrorHandlerEntry`] tried in ascending priority
/// order; the first whose predicate matches decides the outcome.
#[derive(Default)]
pub struct ErrorHandlerChain {
    entries: Vec<ErrorHandlerEntry>,
}

impl ErrorHandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: ErrorHandlerEntry) {
        self.entries.push(entry);
        self.entries.sort_by_key(|e| e.priority);
    }

    /// Resolves an error through the chain. Falls back to returning the
    /// original error unchanged if no handler claims it.
    pub fn resolve(
        &self,
        error: SkerError,
        ctx: &RequestContext,
    ) -> Result<serde_json::Value, SkerError> {
        for entry in &self.entries {
            if !(entry.predicate)(&error) {
                continue;
            }
            match (entry.handle)(&error, ctx) {
                RecoveryStrategy::Recover(value) => return Ok(value),
                RecoveryStrategy::Remap(remapped) => return Err(remapped),
                RecoveryStrategy::Continue => continue,
            }
        }
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sker_core::protocol::{InboundRequest, RequestKind};

    fn ctx() -> RequestContext {
        RequestContext::new(&InboundRequest {
            id: serde_json::json!(1),
            kind: RequestKind::Tool,
            name: "sum".into(),
            arguments: serde_json::json!({}),
        })
    }

    #[test]
    fn lower_priority_handler_runs_first() {
        let mut chain = ErrorHandlerChain::new();
        chain.add(ErrorHandlerEntry {
            name: "low".into(),
            priority: 0,
            predicate: Arc::new(|_| true),
            handle: Arc::new(|_, _| RecoveryStrategy::Recover(serde_json::json!("low"))),
        });
        chain.add(ErrorHandlerEntry {
            name: "high".into(),
            priority: 10,
            predicate: Arc::new(|_| true),
            handle: Arc::new(|_, _| RecoveryStrategy::Recover(serde_json::json!("high"))),
        });
        let ctx = ctx();
        let result = chain.resolve(SkerError::Internal("boom".into()), &ctx);
        assert_eq!(result.unwrap(), serde_json::json!("low"));
    }

    #[test]
    fn non_matching_predicate_falls_through_to_next_handler() {
        let mut chain = ErrorHandlerChain::new();
        chain.add(ErrorHandlerEntry {
            name: "validation-only".into(),
            priority: 0,
            predicate: Arc::new(|err| matches!(err, SkerError::Validation(_))),
            handle: Arc::new(|_, _| RecoveryStrategy::Recover(serde_json::json!("validation"))),
        });
        chain.add(ErrorHandlerEntry {
            name: "catch-all".into(),
            priority: 10,
            predicate: Arc::new(|_| true),
            handle: Arc::new(|_, _| RecoveryStrategy::Recover(serde_json::json!("catch-all"))),
        });
        let ctx = ctx();
        let result = chain.resolve(SkerError::Internal("boom".into()), &ctx);
        assert_eq!(result.unwrap(), serde_json::json!("catch-all"));
    }

    #[test]
    fn unclaimed_error_passes_through() {
        let chain = ErrorHandlerChain::new();
        let ctx = ctx();
        let result = chain.resolve(SkerError::Internal("boom".into()), &ctx);
        assert!(result.is_err());
    }
}
