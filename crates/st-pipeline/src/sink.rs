//! Output sinks: where finished segments go.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use st_core::config::OutputConfig;

/// A produced segment handed to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentOutput {
    pub index: usize,
    /// E.g. `segment_1.mp4`.
    pub suggested_name: String,
    pub bytes: Bytes,
}

/// Consumer of produced segments.
///
/// Called once per successful segment, in index order. An error marks that
/// segment as failed.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn accept(&self, output: SegmentOutput) -> st_core::Result<()>;
}

/// Writes each segment to `dir/<suggested name>`.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    overwrite: bool,
    written: Mutex<Vec<PathBuf>>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            dir: dir.into(),
            overwrite,
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.dir.clone(), config.overwrite)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths written so far, in order.
    pub fn written(&self) -> Vec<PathBuf> {
        self.written.lock().clone()
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true);
        if self.overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options.open(path).await?;
        file.write_all(bytes).await?;
        file.flush().await
    }
}

#[async_trait]
impl OutputSink for DirectorySink {
    async fn accept(&self, output: SegmentOutput) -> st_core::Result<()> {
        let path = self.dir.join(&output.suggested_name);
        self.write(&path, &output.bytes).await.map_err(|e| {
            let message = if e.kind() == std::io::ErrorKind::AlreadyExists {
                format!("{} already exists", path.display())
            } else {
                format!("failed to write {}: {e}", path.display())
            };
            st_core::Error::sink(&output.suggested_name, message)
        })?;
        tracing::info!("Wrote {} ({} bytes)", path.display(), output.bytes.len());
        self.written.lock().push(path);
        Ok(())
    }
}

/// Keeps every segment in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    outputs: Mutex<Vec<SegmentOutput>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> Vec<SegmentOutput> {
        self.outputs.lock().clone()
    }

    /// Suggested names in delivery order.
    pub fn names(&self) -> Vec<String> {
        self.outputs
            .lock()
            .iter()
            .map(|o| o.suggested_name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.outputs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.lock().is_empty()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn accept(&self, output: SegmentOutput) -> st_core::Result<()> {
        self.outputs.lock().push(output);
        Ok(())
    }
}
