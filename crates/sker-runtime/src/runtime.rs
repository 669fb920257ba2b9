//! Application Lifecycle (C13): orchestrates start/stop of every other
//! component in dependency order and drives graceful shutdown.
//!
//! Unlike the other components, the lifecycle owns no state of its own
//! beyond the ordered list of steps it was handed — each step is a pair
//! of start/stop closures contributed by whoever is assembling the host
//! process (typically the `skerd` binary, wiring Config Resolver →
//! Logger Factory → root Container → Plugin Loader → Dispatcher →
//! Hot-Reload Watcher in that order, per spec.md §2's start-up sequence).

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::error::RuntimeResult;

/// `Stopped → Starting → Running → Stopping → Stopped`, with a terminal
/// `Error` branch reachable only from `Starting` (spec.md §4.13).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

/// Broadcast to every [`ApplicationLifecycle::subscribe`] callback as the
/// state machine advances.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Starting,
    Started,
    Stopping,
    Stopped,
    Error(String),
}

/// Opaque handle returned by [`ApplicationLifecycle::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type StartFn = Box<dyn Fn() -> BoxFuture<'static, RuntimeResult<()>> + Send + Sync>;
type StopFn = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;
type Subscriber = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// One component the lifecycle brings up and tears down, in the order
/// steps were added via [`ApplicationLifecycle::add_step`].
pub struct LifecycleStep {
    name: String,
    start: StartFn,
    stop: StopFn,
}

impl LifecycleStep {
    /// Builds a step from plain async closures, e.g.
    /// `LifecycleStep::new("config", || async { .. }, || async { .. })`.
    pub fn new<F, Fut, G, GFut>(name: impl Into<String>, start: F, stop: G) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RuntimeResult<()>> + Send + 'static,
        G: Fn() -> GFut + Send + Sync + 'static,
        GFut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            start: Box::new(move || Box::pin(start())),
            stop: Box::new(move || Box::pin(stop())),
        }
    }
}

impl std::fmt::Debug for LifecycleStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleStep").field("name", &self.name).finish()
    }
}

/// Orchestrates an ordered list of [`LifecycleStep`]s through the
/// `Stopped → Starting → Running → Stopping → Stopped` state machine.
///
/// `start()` and `stop()` are idempotent and serialized: a concurrent
/// second caller waits on the same underlying mutex and then observes
/// whatever state the first caller already reached, rather than
/// re-running the steps.
pub struct ApplicationLifecycle {
    steps: RwLock<Vec<LifecycleStep>>,
    state: RwLock<LifecycleState>,
    started: Mutex<Vec<usize>>,
    start_lock: Mutex<()>,
    stop_lock: Mutex<()>,
    subscribers: RwLock<Vec<(u64, Subscriber)>>,
    next_subscriber_id: AtomicU64,
}

impl ApplicationLifecycle {
    pub fn new() -> Self {
        Self {
            steps: RwLock::new(Vec::new()),
            state: RwLock::new(LifecycleState::Stopped),
            started: Mutex::new(Vec::new()),
            start_lock: Mutex::new(()),
            stop_lock: Mutex::new(()),
            subscribers: RwLock::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(0),
        }
    }

    /// Appends a step. Only meaningful while `Stopped` — steps describe
    /// a fixed startup order, not something reshaped mid-flight.
    pub async fn add_step(&self, step: LifecycleStep) {
        self.steps.write().await.push(step);
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    pub async fn subscribe(&self, f: impl Fn(&LifecycleEvent) + Send + Sync + 'static) -> SubscriptionId {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.write().await.push((id, Box::new(f)));
        SubscriptionId(id)
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().await.retain(|(sid, _)| *sid != id.0);
    }

    async fn emit(&self, event: LifecycleEvent) {
        for (_, subscriber) in self.subscribers.read().await.iter() {
            subscriber(&event);
        }
    }

    /// Runs every step's `start` in order. On the first failure, steps
    /// already started are stopped in reverse order, the state becomes
    /// `Error`, and the triggering error is returned.
    ///
    /// A call made while already `Running` is a no-op; one made while
    /// another `start()` is in flight waits for it to finish and then
    /// inherits its outcome.
    pub async fn start(&self) -> RuntimeResult<()> {
        let _guard = self.start_lock.lock().await;
        if *self.state.read().await == LifecycleState::Running {
            return Ok(());
        }

        *self.state.write().await = LifecycleState::Starting;
        self.emit(LifecycleEvent::Starting).await;

        let steps = self.steps.read().await;
        let mut started = Vec::new();
        for (idx, step) in steps.iter().enumerate() {
            info!(step = %step.name, "starting lifecycle step");
            if let Err(err) = (step.start)().await {
                error!(step = %step.name, %err, "lifecycle step failed to start, rolling back");
                for &done in started.iter().rev() {
                    let step: &LifecycleStep = &steps[done];
                    (step.stop)().await;
                }
                *self.state.write().await = LifecycleState::Error;
                self.emit(LifecycleEvent::Error(err.to_string())).await;
                return Err(err);
            }
            started.push(idx);
        }
        drop(steps);

        *self.started.lock().await = started;
        *self.state.write().await = LifecycleState::Running;
        self.emit(LifecycleEvent::Started).await;
        Ok(())
    }

    /// Stops every successfully started step in reverse order. A call
    /// made while already `Stopped` is a no-op; concurrent callers
    /// serialize on the same mutex.
    pub async fn stop(&self) -> RuntimeResult<()> {
        let _guard = self.stop_lock.lock().await;
        if *self.state.read().await == LifecycleState::Stopped {
            return Ok(());
        }

        *self.state.write().await = LifecycleState::Stopping;
        self.emit(LifecycleEvent::Stopping).await;

        let steps = self.steps.read().await;
        let mut started = self.started.lock().await;
        for &idx in started.iter().rev() {
            let step = &steps[idx];
            info!(step = %step.name, "stopping lifecycle step");
            (step.stop)().await;
        }
        started.clear();
        drop(started);
        drop(steps);

        *self.state.write().await = LifecycleState::Stopped;
        self.emit(LifecycleEvent::Stopped).await;
        Ok(())
    }

    /// Runs `start()`, waits for `shutdown`, then `stop()` — the
    /// top-level loop a binary entrypoint drives.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }

    /// Resolves when Ctrl+C, or SIGTERM on Unix, is received.
    pub async fn wait_for_shutdown_signal() {
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    warn!(%err, "failed to install SIGTERM handler, falling back to Ctrl+C only");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received Ctrl+C, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("received Ctrl+C, shutting down");
        }
    }
}

impl Default for ApplicationLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::AtomicBool;

    fn ok_step(name: &'static str, log: Arc<SyncMutex<Vec<String>>>) -> LifecycleStep {
        let start_log = Arc::clone(&log);
        let stop_log = Arc::clone(&log);
        LifecycleStep::new(
            name,
            move || {
                let log = Arc::clone(&start_log);
                async move {
                    log.lock().push(format!("{name}.start"));
                    Ok(())
                }
            },
            move || {
                let log = Arc::clone(&stop_log);
                async move {
                    log.lock().push(format!("{name}.stop"));
                }
            },
        )
    }

    fn failing_step(name: &'static str, log: Arc<SyncMutex<Vec<String>>>) -> LifecycleStep {
        let start_log = Arc::clone(&log);
        LifecycleStep::new(
            name,
            move || {
                let log = Arc::clone(&start_log);
                async move {
                    log.lock().push(format!("{name}.start"));
                    Err(RuntimeError(format!("{name} failed")))
                }
            },
            move || async move {},
        )
    }

    #[tokio::test]
    async fn start_then_stop_runs_steps_in_order_then_reverse() {
        let log = Arc::new(SyncMutex::new(Vec::new()));
        let lifecycle = ApplicationLifecycle::new();
        lifecycle.add_step(ok_step("a", Arc::clone(&log))).await;
        lifecycle.add_step(ok_step("b", Arc::clone(&log))).await;

        lifecycle.start().await.unwrap();
        assert_eq!(lifecycle.state().await, LifecycleState::Running);
        lifecycle.stop().await.unwrap();
        assert_eq!(lifecycle.state().await, LifecycleState::Stopped);

        assert_eq!(log.lock().clone(), vec!["a.start", "b.start", "b.stop", "a.stop"]);
    }

    #[tokio::test]
    async fn failed_step_rolls_back_and_enters_error_state() {
        let log = Arc::new(SyncMutex::new(Vec::new()));
        let lifecycle = ApplicationLifecycle::new();
        lifecycle.add_step(ok_step("a", Arc::clone(&log))).await;
        lifecycle.add_step(failing_step("b", Arc::clone(&log))).await;
        lifecycle.add_step(ok_step("c", Arc::clone(&log))).await;

        let err = lifecycle.start().await.unwrap_err();
        assert_eq!(err.0, "b failed");
        assert_eq!(lifecycle.state().await, LifecycleState::Error);
        assert_eq!(log.lock().clone(), vec!["a.start", "b.start", "a.stop"]);
    }

    #[tokio::test]
    async fn start_is_idempotent_once_running() {
        let log = Arc::new(SyncMutex::new(Vec::new()));
        let lifecycle = ApplicationLifecycle::new();
        lifecycle.add_step(ok_step("a", Arc::clone(&log))).await;

        lifecycle.start().await.unwrap();
        lifecycle.start().await.unwrap();
        assert_eq!(log.lock().clone(), vec!["a.start"]);
    }

    #[tokio::test]
    async fn stop_is_idempotent_when_already_stopped() {
        let lifecycle = ApplicationLifecycle::new();
        lifecycle.stop().await.unwrap();
        assert_eq!(lifecycle.state().await, LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn subscribers_observe_every_transition() {
        let lifecycle = ApplicationLifecycle::new();
        let log = Arc::new(SyncMutex::new(Vec::new()));
        let seen = Arc::clone(&log);
        lifecycle
            .subscribe(move |event| {
                seen.lock().push(format!("{event:?}"));
            })
            .await;

        lifecycle.start().await.unwrap();
        lifecycle.stop().await.unwrap();

        let events = log.lock().clone();
        assert_eq!(events, vec!["Starting", "Started", "Stopping", "Stopped"]);
    }

    #[tokio::test]
    async fn unsubscribed_callback_stops_receiving_events() {
        let lifecycle = ApplicationLifecycle::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        let id = lifecycle.subscribe(move |_| fired_clone.store(true, Ordering::SeqCst)).await;
        lifecycle.unsubscribe(id).await;

        lifecycle.start().await.unwrap();
        assert!(!fired.load(Ordering::SeqCst));
    }
}
