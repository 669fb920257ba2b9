//! The onion-model middleware chain.
//!
//! A middleware is a function from one [`HandlerService`] to another —
//! the same shape `tower::Layer::layer` takes, kept as a plain closure
//! here rather than a generic `Layer` impl since every link in the chain
//! already shares one concrete, boxed service type.

pub mod builtin;

use std::sync::Arc;

use crate::handler::HandlerService;

/// A single link in a handler's middleware chain.
#[derive(Clone)]
pub struct MiddlewareEntry {
    pub name: String,
    /// Lower values run closer to the transport (outermost); higher
    /// values run closer to the handler (innermost).
    pub priority: i32,
    pub wrap: Arc<dyn Fn(HandlerService) -> HandlerService + Send + Sync>,
}

impl std::fmt::Debug for MiddlewareEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareEntry")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Builds the composed service for one handler from its middleware
/// entries, in priority order.
#[derive(Default, Clone)]
pub struct MiddlewareExecutor {
    entries: Vec<MiddlewareEntry>,
}

impl MiddlewareExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: MiddlewareEntry) {
        self.entries.push(entry);
    }

    /// Wraps `inner` so the lowest-priority entry ends up outermost and
    /// sees the request first (§4.9 — "lower priority runs outermost"; two
    /// entries with equal priority run in list order). The enter order is
    /// `entries` stably sorted ascending by priority; wraps are applied in
    /// the reverse of that order so the first entry to enter ends up the
    /// outermost layer.
    pub fn build(&self, inner: HandlerService) -> HandlerService {
        let mut enter_order: Vec<&MiddlewareEntry> = self.entries.iter().collect();
        enter_order.sort_by_key(|entry| entry.priority);
        let mut service = inner;
        for entry in enter_order.into_iter().rev() {
            service = (entry.wrap)(service);
        }
        service
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sker_core::RequestContext;
    use tower::service_fn;
    use tower::util::BoxCloneSyncService;

    fn tracing_entry(name: &'static str, priority: i32, log: Arc<Mutex<Vec<String>>>) -> MiddlewareEntry {
        MiddlewareEntry {
            name: name.into(),
            priority,
            wrap: Arc::new(move |inner: HandlerService| {
                let log = Arc::clone(&log);
                let mut inner = inner;
                BoxCloneSyncService::new(service_fn(move |ctx: Arc<RequestContext>| {
                    let log = Arc::clone(&log);
                    let mut inner = inner.clone();
                    async move {
                        log.lock().push(format!("{name}.enter"));
                        use tower::Service;
                        std::future::poll_fn(|cx| inner.poll_ready(cx)).await?;
                        let result = inner.call(ctx).await;
                        log.lock().push(format!("{name}.exit"));
                        result
                    }
                }))
            }),
        }
    }

    #[tokio::test]
    async fn entries_nest_in_ascending_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut executor = MiddlewareExecutor::new();
        executor.add(tracing_entry("B", 20, Arc::clone(&log)));
        executor.add(tracing_entry("A", 10, Arc::clone(&log)));

        let handler_log = Arc::clone(&log);
        let handler = BoxCloneSyncService::new(service_fn(move |_ctx: Arc<RequestContext>| {
            let log = Arc::clone(&handler_log);
            async move {
                log.lock().push("H.enter".to_string());
                log.lock().push("H.exit".to_string());
                Ok::<_, sker_core::SkerError>(serde_json::json!(null))
            }
        }));

        let mut service = executor.build(handler);
        use tower::Service;
        std::future::poll_fn(|cx| service.poll_ready(cx)).await.unwrap();
        service
            .call(Arc::new(RequestContext::new(&sker_core::InboundRequest {
                id: serde_json::json!(1),
                kind: sker_core::RequestKind::Tool,
                name: "x".into(),
                arguments: serde_json::json!({}),
            })))
            .await
            .unwrap();

        let observed = log.lock().clone();
        assert_eq!(
            observed,
            vec![
                "A.enter", "B.enter", "H.enter", "H.exit", "B.exit", "A.exit"
            ]
        );
    }
}
