//! In-memory [`Engine`] for tests.
//!
//! Understands the stream-copy trim command shape
//! (`-i <in> -ss <start> -t <dur> -c copy <out>`), writes a small textual
//! "clip" describing what was cut, and records every call. Load, write and
//! exec failures can be scripted.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::engine::{render_args, Engine, ProgressFn};

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Load,
    Write(String),
    Exec(Vec<String>),
    Read(String),
    Delete(String),
    Terminate,
}

/// What a fake clip says about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipInfo {
    pub source: String,
    pub start: f64,
    pub duration: f64,
}

impl ClipInfo {
    /// Decode the bytes produced by [`MemoryEngine`] for a trim command.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        let mut parts = text.strip_prefix("clip;")?.split(';');
        let source = parts.next()?.strip_prefix("src=")?.to_string();
        let start = parts.next()?.strip_prefix("ss=")?.parse().ok()?;
        let duration = parts.next()?.strip_prefix("t=")?.parse().ok()?;
        Some(Self {
            source,
            start,
            duration,
        })
    }
}

/// Scriptable in-memory engine.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    files: Mutex<BTreeMap<String, Bytes>>,
    calls: Mutex<Vec<EngineCall>>,
    load_attempts: AtomicUsize,
    terminations: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    load_delay: Duration,
    exec_delay: Duration,
    load_failure: Option<String>,
    exec_failures: Mutex<HashSet<String>>,
    write_failures: Mutex<HashSet<String>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `load` take at least `delay`.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Make every `exec` take at least `delay`.
    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }

    /// Make `load` fail with `message`.
    pub fn failing_load(mut self, message: impl Into<String>) -> Self {
        self.load_failure = Some(message.into());
        self
    }

    /// Make any command writing `output` fail.
    pub fn failing_exec(self, output: impl Into<String>) -> Self {
        self.exec_failures.lock().insert(output.into());
        self
    }

    /// Make writing `name` fail.
    pub fn failing_write(self, name: impl Into<String>) -> Self {
        self.write_failures.lock().insert(name.into());
        self
    }

    /// Names currently stored.
    pub fn files(&self) -> Vec<String> {
        self.files.lock().keys().cloned().collect()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    /// Argument vectors of every `exec` call, in order.
    pub fn exec_calls(&self) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                EngineCall::Exec(args) => Some(args.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Highest number of `exec` calls observed running at once.
    pub fn max_concurrent_execs(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }

    async fn trim(&self, args: &[String], progress: ProgressFn<'_>) -> st_core::Result<()> {
        let command = render_args(args);
        let trim = TrimArgs::parse(args)
            .ok_or_else(|| st_core::Error::exec(&command, "unsupported command"))?;

        progress(0.0);
        if !self.exec_delay.is_zero() {
            tokio::time::sleep(self.exec_delay).await;
        }

        let input_len = self
            .files
            .lock()
            .get(&trim.input)
            .map(|b| b.len())
            .ok_or_else(|| st_core::Error::exec(&command, format!("{}: No such file", trim.input)))?;

        if self.exec_failures.lock().contains(&trim.output) {
            return Err(st_core::Error::exec(&command, "simulated failure"));
        }
        if !trim.duration.is_finite() || trim.duration < 0.0 {
            return Err(st_core::Error::exec(
                &command,
                format!("invalid duration {}", trim.duration),
            ));
        }

        progress(0.5);
        let body = format!(
            "clip;src={};ss={};t={};bytes={input_len}",
            trim.input, trim.start, trim.duration
        );
        self.files.lock().insert(trim.output, Bytes::from(body));
        progress(1.0);
        Ok(())
    }
}

struct TrimArgs {
    input: String,
    start: f64,
    duration: f64,
    output: String,
}

impl TrimArgs {
    fn parse(args: &[String]) -> Option<Self> {
        let output = args.last()?.clone();
        let value_of = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
        };
        Some(Self {
            input: value_of("-i")?.clone(),
            start: value_of("-ss").map_or(Some(0.0), |v| v.parse().ok())?,
            duration: value_of("-t")?.parse().ok()?,
            output,
        })
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> st_core::Result<()> {
        self.load_attempts.fetch_add(1, Ordering::SeqCst);
        self.record(EngineCall::Load);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        match self.load_failure {
            Some(ref message) => Err(st_core::Error::EngineLoad(message.clone())),
            None => Ok(()),
        }
    }

    async fn write_file(&self, name: &str, data: Bytes) -> st_core::Result<()> {
        self.record(EngineCall::Write(name.to_string()));
        if self.write_failures.lock().contains(name) {
            return Err(std::io::Error::other(format!("simulated write failure for {name}")).into());
        }
        self.files.lock().insert(name.to_string(), data);
        Ok(())
    }

    async fn exec(&self, args: &[String], progress: ProgressFn<'_>) -> st_core::Result<()> {
        self.record(EngineCall::Exec(args.to_vec()));
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let result = self.trim(args, progress).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn read_file(&self, name: &str) -> st_core::Result<Bytes> {
        self.record(EngineCall::Read(name.to_string()));
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| st_core::Error::not_found("virtual file", name))
    }

    async fn delete_file(&self, name: &str) -> st_core::Result<()> {
        self.record(EngineCall::Delete(name.to_string()));
        match self.files.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(st_core::Error::not_found("virtual file", name)),
        }
    }

    fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.record(EngineCall::Terminate);
        self.files.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn trim_writes_clip() {
        let engine = MemoryEngine::new();
        engine
            .write_file("input.mp4", Bytes::from_static(b"movie"))
            .await
            .unwrap();
        engine
            .exec(
                &argv(&["-i", "input.mp4", "-ss", "4", "-t", "2.5", "-c", "copy", "out.mp4"]),
                &|_| {},
            )
            .await
            .unwrap();

        let clip = ClipInfo::parse(&engine.read_file("out.mp4").await.unwrap()).unwrap();
        assert_eq!(clip.source, "input.mp4");
        assert_eq!(clip.start, 4.0);
        assert_eq!(clip.duration, 2.5);
    }

    #[tokio::test]
    async fn negative_duration_fails() {
        let engine = MemoryEngine::new();
        engine.write_file("in", Bytes::new()).await.unwrap();
        let err = engine
            .exec(&argv(&["-i", "in", "-ss", "5", "-t", "-2", "out"]), &|_| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid duration"));
    }

    #[tokio::test]
    async fn missing_input_fails() {
        let engine = MemoryEngine::new();
        let err = engine
            .exec(&argv(&["-i", "in", "-t", "1", "out"]), &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, st_core::Error::EngineExec { .. }));
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let engine = MemoryEngine::new();
        assert!(engine.delete_file("nope").await.unwrap_err().is_not_found());
    }
}
