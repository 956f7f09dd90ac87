//! [`EngineHandle`]: lifecycle wrapper around an [`Engine`].
//!
//! The handle owns the engine and its progress listeners and enforces:
//!
//! - **idempotent load**: concurrent or repeated [`load`](EngineHandle::load)
//!   calls share one underlying attempt; a failure is recorded and returned
//!   to every caller, never retried.
//! - **serialized operations**: commands and file operations queue behind a
//!   single async lock, so the engine never sees two at once.
//! - **terminate once**: [`terminate`](EngineHandle::terminate) releases the
//!   engine the first time and is a no-op afterwards. Dropping the handle
//!   terminates it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::engine::{render_args, Engine};
use crate::progress::{ProgressListeners, SubscriptionId};

/// Lifecycle state of an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
    /// Load failed; carries the recorded cause.
    Failed(String),
    /// Released. Absorbing.
    Terminated,
}

impl EngineState {
    pub fn name(&self) -> &'static str {
        match self {
            EngineState::Unloaded => "unloaded",
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::Failed(_) => "failed",
            EngineState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Failed(cause) => write!(f, "failed ({cause})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Owning wrapper around a media engine.
pub struct EngineHandle {
    engine: Arc<dyn Engine>,
    state: Mutex<EngineState>,
    load_outcome: OnceCell<Result<(), String>>,
    ops: tokio::sync::Mutex<()>,
    listeners: Arc<ProgressListeners>,
    terminated: AtomicBool,
}

impl EngineHandle {
    /// Wrap an engine. Nothing is loaded until [`load`](Self::load).
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            state: Mutex::new(EngineState::Unloaded),
            load_outcome: OnceCell::new(),
            ops: tokio::sync::Mutex::new(()),
            listeners: Arc::new(ProgressListeners::new()),
            terminated: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state.lock().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.lock() == EngineState::Ready
    }

    /// Name of the wrapped engine.
    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Transition unless already terminated.
    fn transition(&self, next: EngineState) {
        let mut state = self.state.lock();
        if *state != EngineState::Terminated {
            tracing::debug!("engine {}: {} -> {}", self.engine.name(), *state, next);
            *state = next;
        }
    }

    /// Load the engine, waiting for an in-flight load if there is one.
    ///
    /// Resolves immediately once `Ready`. A failed load is reported as
    /// [`st_core::Error::EngineLoad`] on this and every later call.
    pub async fn load(&self) -> st_core::Result<()> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(st_core::Error::EngineLoad("engine was terminated".into()));
        }

        let outcome = self
            .load_outcome
            .get_or_init(|| async {
                self.transition(EngineState::Loading);
                tracing::info!("Loading {} engine", self.engine.name());
                match self.engine.load().await {
                    Ok(()) => {
                        self.transition(EngineState::Ready);
                        tracing::info!("{} engine ready", self.engine.name());
                        Ok(())
                    }
                    Err(e) => {
                        let cause = match e {
                            st_core::Error::EngineLoad(cause) => cause,
                            other => other.to_string(),
                        };
                        tracing::error!("{} engine failed to load: {cause}", self.engine.name());
                        self.transition(EngineState::Failed(cause.clone()));
                        Err(cause)
                    }
                }
            })
            .await;

        match outcome {
            Ok(()) if self.terminated.load(Ordering::SeqCst) => Err(st_core::Error::EngineLoad(
                "engine was terminated".into(),
            )),
            Ok(()) => Ok(()),
            Err(cause) => Err(st_core::Error::EngineLoad(cause.clone())),
        }
    }

    fn ensure_ready(&self) -> st_core::Result<()> {
        let state = self.state.lock();
        if *state == EngineState::Ready {
            Ok(())
        } else {
            Err(st_core::Error::EngineNotReady {
                state: state.name().to_string(),
            })
        }
    }

    /// Register a progress listener for engine commands.
    pub fn subscribe(&self, listener: impl Fn(f64) + Send + Sync + 'static) -> SubscriptionId {
        self.listeners.subscribe(listener)
    }

    /// Remove a progress listener.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Number of registered progress listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Run one command. Calls made while another operation is in flight wait
    /// their turn.
    pub async fn execute(&self, args: &[String]) -> st_core::Result<()> {
        let _turn = self.ops.lock().await;
        self.ensure_ready()?;

        let command = render_args(args);
        tracing::debug!("exec: {command}");

        let listeners = Arc::clone(&self.listeners);
        let emit = move |p: f64| listeners.emit(p);
        self.engine.exec(args, &emit).await.map_err(|e| match e {
            st_core::Error::EngineExec { .. } => e,
            other => st_core::Error::exec(command, other.to_string()),
        })
    }

    /// Write a virtual file.
    pub async fn write_file(&self, name: &str, data: Bytes) -> st_core::Result<()> {
        let _turn = self.ops.lock().await;
        self.ensure_ready()?;
        self.engine.write_file(name, data).await
    }

    /// Read a virtual file.
    pub async fn read_file(&self, name: &str) -> st_core::Result<Bytes> {
        let _turn = self.ops.lock().await;
        self.ensure_ready()?;
        self.engine.read_file(name).await
    }

    /// Delete a virtual file.
    pub async fn delete_file(&self, name: &str) -> st_core::Result<()> {
        let _turn = self.ops.lock().await;
        self.ensure_ready()?;
        self.engine.delete_file(name).await
    }

    /// Release the engine. Safe to call any number of times.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Terminating {} engine", self.engine.name());
        *self.state.lock() = EngineState::Terminated;
        self.listeners.clear();
        self.engine.terminate();
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("engine", &self.engine.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
