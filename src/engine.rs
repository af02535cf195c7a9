//! The auto-press loop and its start/stop state machine.
//!
//! A [`PressSequenceEngine`] is `Stopped` until [`start`] spawns a single
//! background task on the tokio runtime. The task walks the configured
//! sequence forever, pressing, holding and releasing one key at a time,
//! until it is cancelled or the sequence becomes empty.
//!
//! Cancellation is cooperative. The loop checks it before every press,
//! after every release and while waiting out the inter-key delay. A hold
//! is never cut short, so a pressed key is always released before the
//! task exits.
//!
//! Restarting during that final hold queues the new run behind the old
//! task, so at most one loop touches the injector at a time.
//!
//! [`start`]: PressSequenceEngine::start

use crate::config::SharedConfig;
use crate::error::{KapError, Result};
use crate::key_sender::KeyInjector;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives a notification each time the engine flips between running
/// (`true`) and stopped (`false`).
///
/// Observers are invoked while the engine's run lock is held and must not
/// call back into the engine.
pub trait StateObserver: Send + Sync {
    fn on_state_changed(&self, running: bool);

    /// An observer reporting `true` here is dropped before the next
    /// notification.
    fn is_closed(&self) -> bool {
        false
    }
}

impl StateObserver for mpsc::UnboundedSender<bool> {
    fn on_state_changed(&self, running: bool) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(running);
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

struct ActiveRun {
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct RunState {
    generation: u64,
    active: Option<ActiveRun>,
    tasks: Vec<JoinHandle<()>>,
}

struct Shared {
    injector: Arc<dyn KeyInjector>,
    config: SharedConfig,
    rng: Mutex<StdRng>,
    observers: Mutex<Vec<Arc<dyn StateObserver>>>,
    state: Mutex<RunState>,
    /// Held by a loop task for its whole life. A run started while the
    /// previous one is still finishing a hold queues here.
    loop_gate: tokio::sync::Mutex<()>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, running: bool) {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|observer| !observer.is_closed());
        for observer in observers.iter() {
            observer.on_state_changed(running);
        }
    }

    /// Ends the run identified by `generation` unless `stop()` already did.
    fn finish(&self, generation: u64) {
        let mut state = self.lock_state();
        let current = state
            .active
            .as_ref()
            .is_some_and(|run| run.generation == generation);
        if current {
            state.active = None;
            info!(generation, "press loop ended");
            self.notify(false);
        }
    }

    async fn press_loop(&self, token: &CancellationToken) {
        loop {
            let (mut order, shuffle) = self
                .config
                .read(|config| (config.sequence.clone(), config.shuffle));
            if order.is_empty() {
                info!("key sequence is empty, stopping");
                return;
            }
            if shuffle {
                order.shuffle(&mut *self.lock_rng());
            }
            debug!(?order, "starting pass");

            for key in &order {
                if token.is_cancelled() {
                    return;
                }

                self.press_key(key).await;

                if token.is_cancelled() {
                    return;
                }

                let delay = self
                    .config
                    .read(|config| config.next_delay(&mut *self.lock_rng()));
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// Press, hold, release. Failures are logged and swallowed.
    async fn press_key(&self, key: &str) {
        if let Err(e) = self.injector.press(key) {
            warn!(key, error = %e, "key press failed, skipping");
            return;
        }
        debug!(key, "pressed");

        let hold = self.config.read(|config| config.hold_duration);
        tokio::time::sleep(hold).await;

        if let Err(e) = self.injector.release(key) {
            warn!(key, error = %e, "key release failed");
        }
    }
}

/// Calls [`Shared::finish`] when the loop task ends, including by panic.
struct FinishGuard {
    shared: Arc<Shared>,
    generation: u64,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.shared.finish(self.generation);
    }
}

/// Start/stop state machine around the auto-press loop.
///
/// Cloning yields another handle to the same engine, so a hotkey thread
/// and a UI can both drive it.
#[derive(Clone)]
pub struct PressSequenceEngine {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl PressSequenceEngine {
    /// Creates a stopped engine that spawns its loop on the current tokio
    /// runtime.
    pub fn new(injector: Arc<dyn KeyInjector>, config: SharedConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| KapError::runtime(format!("no tokio runtime: {}", e)))?;
        Ok(Self::with_runtime(injector, config, runtime))
    }

    /// Creates a stopped engine that spawns its loop on `runtime`.
    pub fn with_runtime(
        injector: Arc<dyn KeyInjector>,
        config: SharedConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                injector,
                config,
                rng: Mutex::new(StdRng::from_os_rng()),
                observers: Mutex::new(Vec::new()),
                state: Mutex::new(RunState::default()),
                loop_gate: tokio::sync::Mutex::new(()),
            }),
            runtime,
        }
    }

    /// Replaces the random source used for shuffling and random delays.
    pub fn with_rng(self, rng: StdRng) -> Self {
        *self.shared.lock_rng() = rng;
        self
    }

    pub fn config(&self) -> &SharedConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock_state().active.is_some()
    }

    pub fn subscribe(&self, observer: Arc<dyn StateObserver>) {
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Channel flavour of [`subscribe`](Self::subscribe).
    pub fn watch_state(&self) -> mpsc::UnboundedReceiver<bool> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(Arc::new(tx));
        rx
    }

    /// Starts the loop. Does nothing if it is already running or the
    /// sequence is empty.
    pub fn start(&self) {
        let mut state = self.shared.lock_state();
        self.start_locked(&mut state);
    }

    /// Requests the loop to stop. Does nothing if it is not running.
    pub fn stop(&self) {
        let mut state = self.shared.lock_state();
        self.stop_locked(&mut state);
    }

    pub fn toggle(&self) {
        let mut state = self.shared.lock_state();
        if state.active.is_some() {
            self.stop_locked(&mut state);
        } else {
            self.start_locked(&mut state);
        }
    }

    /// Stops the engine and waits until every loop task has exited, so no
    /// key is left held down.
    pub async fn shutdown(&self) {
        let tasks = {
            let mut state = self.shared.lock_state();
            self.stop_locked(&mut state);
            std::mem::take(&mut state.tasks)
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "press loop task failed");
            }
        }
    }

    fn start_locked(&self, state: &mut RunState) {
        if state.active.is_some() {
            return;
        }
        if self.shared.config.read(|config| config.sequence.is_empty()) {
            debug!("start ignored: key sequence is empty");
            return;
        }

        state.generation += 1;
        let generation = state.generation;
        let token = CancellationToken::new();
        state.active = Some(ActiveRun {
            generation,
            token: token.clone(),
        });
        state.tasks.retain(|task| !task.is_finished());

        info!(generation, "press loop started");
        self.shared.notify(true);

        let guard = FinishGuard {
            shared: Arc::clone(&self.shared),
            generation,
        };
        let task = self.runtime.spawn(async move {
            {
                let _gate = guard.shared.loop_gate.lock().await;
                guard.shared.press_loop(&token).await;
            }
            drop(guard);
        });
        state.tasks.push(task);
    }

    fn stop_locked(&self, state: &mut RunState) {
        let Some(run) = state.active.take() else {
            return;
        };
        run.token.cancel();
        info!(generation = run.generation, "press loop stopping");
        self.shared.notify(false);
    }
}
