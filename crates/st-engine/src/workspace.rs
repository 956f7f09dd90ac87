//! Workspace management over the engine's virtual file store.
//!
//! A [`Workspace`] tracks every virtual name it stages or expects a command
//! to produce, so a run can return the store to empty no matter how it ends.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;

use crate::handle::EngineHandle;

/// A tracked virtual file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceEntry {
    pub virtual_name: String,
    /// Zero until the bytes have been written or read back.
    pub byte_length: usize,
}

/// Virtual file bookkeeping on top of an [`EngineHandle`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use st_engine::{EngineHandle, Workspace};
///
/// # async fn example(engine: Arc<EngineHandle>) -> st_core::Result<()> {
/// let ws = Workspace::new(engine);
/// ws.stage("input.mp4", bytes::Bytes::from_static(b"...")).await?;
/// // ... run a command that writes output1.mp4 ...
/// let clip = ws.materialize("output1.mp4").await?;
/// ws.purge("output1.mp4").await?;
/// ws.purge("input.mp4").await?;
/// assert!(ws.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct Workspace {
    engine: Arc<EngineHandle>,
    entries: Mutex<BTreeMap<String, WorkspaceEntry>>,
}

impl Workspace {
    pub fn new(engine: Arc<EngineHandle>) -> Self {
        Self {
            engine,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// The engine this workspace lives in.
    pub fn engine(&self) -> &Arc<EngineHandle> {
        &self.engine
    }

    fn track(&self, name: &str, byte_length: usize) {
        self.entries.lock().insert(
            name.to_string(),
            WorkspaceEntry {
                virtual_name: name.to_string(),
                byte_length,
            },
        );
    }

    /// Write `bytes` under `name`, replacing any previous content.
    ///
    /// Fails with [`st_core::Error::Workspace`] if the engine is not ready.
    pub async fn stage(&self, name: &str, bytes: Bytes) -> st_core::Result<()> {
        let len = bytes.len();
        self.engine
            .write_file(name, bytes)
            .await
            .map_err(|e| match e {
                st_core::Error::EngineNotReady { state } => {
                    st_core::Error::workspace(name, format!("cannot stage: engine is {state}"))
                }
                other => other,
            })?;
        self.track(name, len);
        tracing::debug!("staged {name} ({len} bytes)");
        Ok(())
    }

    /// Run a command that writes `outputs`.
    ///
    /// The outputs are tracked before the command runs, so a command that
    /// fails halfway still gets its partial files purged.
    pub async fn run(&self, args: &[String], outputs: &[&str]) -> st_core::Result<()> {
        for name in outputs {
            self.entries
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| WorkspaceEntry {
                    virtual_name: name.to_string(),
                    byte_length: 0,
                });
        }
        self.engine.execute(args).await
    }

    /// Read back the bytes of a produced file.
    ///
    /// Fails with [`st_core::Error::NotFound`] if no command produced `name`.
    pub async fn materialize(&self, name: &str) -> st_core::Result<Bytes> {
        match self.engine.read_file(name).await {
            Ok(bytes) => {
                self.track(name, bytes.len());
                Ok(bytes)
            }
            Err(e) if e.is_not_found() => Err(st_core::Error::not_found("virtual file", name)),
            Err(st_core::Error::EngineNotReady { state }) => Err(st_core::Error::workspace(
                name,
                format!("cannot read: engine is {state}"),
            )),
            Err(e) => Err(e),
        }
    }

    /// Delete `name`. Absent names are not an error.
    ///
    /// An engine that is no longer ready holds no files, so purging against
    /// it only drops the bookkeeping.
    pub async fn purge(&self, name: &str) -> st_core::Result<()> {
        let result = match self.engine.delete_file(name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(st_core::Error::EngineNotReady { state }) => {
                tracing::debug!("purge {name}: engine is {state}, nothing to delete");
                Ok(())
            }
            Err(e) => Err(e),
        };
        if result.is_ok() {
            self.entries.lock().remove(name);
            tracing::debug!("purged {name}");
        }
        result
    }

    /// Purge every tracked entry, continuing past failures.
    ///
    /// Returns the first failure, if any.
    pub async fn purge_all(&self) -> st_core::Result<()> {
        let names: Vec<String> = self.entries.lock().keys().cloned().collect();
        let mut first_error = None;
        for name in names {
            if let Err(e) = self.purge(&name).await {
                tracing::warn!("Failed to purge {name}: {e}");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Snapshot of the tracked entries, ordered by name.
    pub fn entries(&self) -> Vec<WorkspaceEntry> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn ready_workspace() -> (Arc<MemoryEngine>, Workspace) {
        let engine = Arc::new(MemoryEngine::new());
        let handle = Arc::new(EngineHandle::new(engine.clone()));
        handle.load().await.unwrap();
        (engine, Workspace::new(handle))
    }

    #[tokio::test]
    async fn stage_requires_ready_engine() {
        let handle = Arc::new(EngineHandle::new(Arc::new(MemoryEngine::new())));
        let ws = Workspace::new(handle);
        let err = ws
            .stage("input.mp4", Bytes::from_static(b"abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, st_core::Error::Workspace { .. }), "got: {err}");
        assert!(ws.is_empty());
    }

    #[tokio::test]
    async fn stage_overwrites() {
        let (engine, ws) = ready_workspace().await;
        ws.stage("input.mp4", Bytes::from_static(b"one")).await.unwrap();
        ws.stage("input.mp4", Bytes::from_static(b"three")).await.unwrap();
        assert_eq!(
            ws.entries(),
            vec![WorkspaceEntry {
                virtual_name: "input.mp4".into(),
                byte_length: 5,
            }]
        );
        assert_eq!(engine.files(), vec!["input.mp4".to_string()]);
    }

    #[tokio::test]
    async fn materialize_unknown_name_is_not_found() {
        let (_engine, ws) = ready_workspace().await;
        let err = ws.materialize("output1.mp4").await.unwrap_err();
        assert!(matches!(err, st_core::Error::NotFound { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn run_materialize_purge_cycle() {
        let (engine, ws) = ready_workspace().await;
        ws.stage("input.mp4", Bytes::from_static(b"movie")).await.unwrap();
        ws.run(
            &argv(&["-i", "input.mp4", "-ss", "0", "-t", "3", "-c", "copy", "output1.mp4"]),
            &["output1.mp4"],
        )
        .await
        .unwrap();
        assert_eq!(ws.len(), 2);

        let clip = ws.materialize("output1.mp4").await.unwrap();
        assert!(!clip.is_empty());

        ws.purge("output1.mp4").await.unwrap();
        ws.purge("input.mp4").await.unwrap();
        assert!(ws.is_empty());
        assert!(engine.files().is_empty());
    }

    #[tokio::test]
    async fn purge_is_idempotent() {
        let (_engine, ws) = ready_workspace().await;
        ws.purge("never-there.mp4").await.unwrap();
        ws.stage("a", Bytes::new()).await.unwrap();
        ws.purge("a").await.unwrap();
        ws.purge("a").await.unwrap();
        assert!(ws.is_empty());
    }

    #[tokio::test]
    async fn failed_run_output_is_still_purged() {
        let engine = Arc::new(MemoryEngine::new().failing_exec("bad.mp4"));
        let handle = Arc::new(EngineHandle::new(engine.clone()));
        handle.load().await.unwrap();
        let ws = Workspace::new(handle);

        ws.stage("input.mp4", Bytes::from_static(b"x")).await.unwrap();
        let result = ws
            .run(&argv(&["-i", "input.mp4", "-t", "1", "bad.mp4"]), &["bad.mp4"])
            .await;
        assert!(result.is_err());
        assert_eq!(ws.len(), 2);

        ws.purge_all().await.unwrap();
        assert!(ws.is_empty());
        assert!(engine.files().is_empty());
    }

    #[tokio::test]
    async fn purge_after_terminate_drops_bookkeeping() {
        let (_engine, ws) = ready_workspace().await;
        ws.stage("input.mp4", Bytes::from_static(b"x")).await.unwrap();
        ws.engine().terminate();
        ws.purge_all().await.unwrap();
        assert!(ws.is_empty());
    }
}
