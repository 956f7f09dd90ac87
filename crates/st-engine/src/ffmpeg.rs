//! [`FfmpegEngine`]: an [`Engine`] backed by the ffmpeg CLI.
//!
//! Loading resolves and sanity-checks the ffmpeg binary and creates a private
//! temporary directory. Virtual names are plain file names inside that
//! directory, and every command runs with it as the working directory, so an
//! argument vector like `-i input.mp4 ... output1.mp4` resolves entirely
//! within the workspace.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;

use st_core::config::EngineConfig;

use crate::command::ToolCommand;
use crate::engine::{render_args, Engine, ProgressFn};
use crate::tools::ToolRegistry;

/// Arguments placed before every command.
const BASE_ARGS: &[&str] = &["-hide_banner", "-nostats", "-y", "-progress", "pipe:2"];

struct Loaded {
    ffmpeg: PathBuf,
    dir: TempDir,
}

/// Engine running each command as an ffmpeg child process.
pub struct FfmpegEngine {
    tools: ToolRegistry,
    config: EngineConfig,
    loaded: Mutex<Option<Loaded>>,
}

impl FfmpegEngine {
    pub fn new(tools: ToolRegistry, config: EngineConfig) -> Self {
        Self {
            tools,
            config,
            loaded: Mutex::new(None),
        }
    }

    /// Discover ffmpeg according to `config` and build an engine around it.
    pub fn discover(config: &EngineConfig) -> Self {
        Self::new(ToolRegistry::discover(config), config.clone())
    }

    /// Directory backing the virtual files, once loaded.
    pub fn workspace_dir(&self) -> Option<PathBuf> {
        self.loaded
            .lock()
            .as_ref()
            .map(|l| l.dir.path().to_path_buf())
    }

    fn resolve(&self, name: &str) -> st_core::Result<PathBuf> {
        validate_virtual_name(name)?;
        self.loaded
            .lock()
            .as_ref()
            .map(|l| l.dir.path().join(name))
            .ok_or_else(|| st_core::Error::EngineNotReady {
                state: "unloaded".into(),
            })
    }
}

/// Reject names that could escape the workspace directory.
pub fn validate_virtual_name(name: &str) -> st_core::Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(st_core::Error::Validation(format!(
            "invalid virtual file name {name:?}"
        )));
    }
    Ok(())
}

/// The output duration requested with `-t`, if any.
pub fn requested_duration(args: &[String]) -> Option<f64> {
    args.iter()
        .rposition(|a| a == "-t")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Turns ffmpeg `-progress` output into fractions of the expected duration.
#[derive(Debug, Default)]
pub struct ProgressParser {
    expected: Option<f64>,
}

impl ProgressParser {
    /// `expected` is the output duration in seconds; when unknown it is taken
    /// from the first `Duration:` line ffmpeg prints for the input.
    pub fn new(expected: Option<f64>) -> Self {
        Self { expected }
    }

    /// Feed one stderr line; returns a progress fraction when the line
    /// carries one.
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Duration:") {
            if self.expected.is_none() {
                let clock = rest.split(',').next().unwrap_or_default();
                self.expected = st_core::parse_timestamp(clock).filter(|d| *d > 0.0);
            }
            return None;
        }

        // Both keys carry microseconds.
        let micros = line
            .strip_prefix("out_time_us=")
            .or_else(|| line.strip_prefix("out_time_ms="));
        if let Some(value) = micros {
            let expected = self.expected?;
            let us: i64 = value.trim().parse().ok()?;
            return Some(us as f64 / 1_000_000.0 / expected);
        }

        if line == "progress=end" {
            return Some(1.0);
        }

        None
    }
}

#[async_trait]
impl Engine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn load(&self) -> st_core::Result<()> {
        let ffmpeg = self
            .tools
            .require("ffmpeg")
            .map_err(|e| st_core::Error::EngineLoad(e.to_string()))?
            .path
            .clone();

        let mut cmd = ToolCommand::new(ffmpeg.clone());
        cmd.arg("-version").timeout(self.config.load_timeout());
        let output = cmd
            .execute()
            .await
            .map_err(|e| st_core::Error::EngineLoad(e.to_string()))?;
        if let Some(version) = output.stdout.lines().next() {
            tracing::info!("{version}");
        }

        let dir = tempfile::Builder::new()
            .prefix("segtrim-")
            .tempdir()
            .map_err(|e| {
                st_core::Error::EngineLoad(format!("failed to create workspace directory: {e}"))
            })?;
        tracing::debug!("ffmpeg workspace at {}", dir.path().display());

        *self.loaded.lock() = Some(Loaded { ffmpeg, dir });
        Ok(())
    }

    async fn write_file(&self, name: &str, data: Bytes) -> st_core::Result<()> {
        let path = self.resolve(name)?;
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn exec(&self, args: &[String], progress: ProgressFn<'_>) -> st_core::Result<()> {
        let (ffmpeg, dir) = {
            let loaded = self.loaded.lock();
            let l = loaded.as_ref().ok_or_else(|| st_core::Error::EngineNotReady {
                state: "unloaded".into(),
            })?;
            (l.ffmpeg.clone(), l.dir.path().to_path_buf())
        };

        let command = render_args(args);
        let mut cmd = ToolCommand::new(ffmpeg);
        cmd.args(BASE_ARGS.iter().copied());
        cmd.args(args.iter().cloned());
        cmd.current_dir(dir).timeout(self.config.exec_timeout());

        let mut parser = ProgressParser::new(requested_duration(args));
        cmd.execute_with_stderr_lines(|line| {
            if let Some(fraction) = parser.feed(line) {
                progress(fraction);
            }
        })
        .await
        .map(|_| ())
        .map_err(|e| match e {
            st_core::Error::Tool { message, .. } => st_core::Error::exec(command, message),
            other => other,
        })
    }

    async fn read_file(&self, name: &str) -> st_core::Result<Bytes> {
        let path = self.resolve(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(st_core::Error::not_found("virtual file", name))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_file(&self, name: &str) -> st_core::Result<()> {
        let path = self.resolve(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(st_core::Error::not_found("virtual file", name))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn terminate(&self) {
        if let Some(loaded) = self.loaded.lock().take() {
            let path = loaded.dir.path().to_path_buf();
            if let Err(e) = loaded.dir.close() {
                tracing::warn!("Failed to remove ffmpeg workspace {}: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::EngineHandle;
    use std::sync::Arc;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn virtual_names_must_be_plain() {
        assert!(validate_virtual_name("input.mp4").is_ok());
        assert!(validate_virtual_name("").is_err());
        assert!(validate_virtual_name("..").is_err());
        assert!(validate_virtual_name("../etc/passwd").is_err());
        assert!(validate_virtual_name("a\\b").is_err());
    }

    #[test]
    fn requested_duration_reads_last_t() {
        let args = argv(&["-i", "in", "-ss", "5", "-t", "2.5", "-c", "copy", "out"]);
        assert_eq!(requested_duration(&args), Some(2.5));
        assert_eq!(requested_duration(&argv(&["-t", "0", "out"])), None);
        assert_eq!(requested_duration(&argv(&["-t", "-2", "out"])), None);
        assert_eq!(requested_duration(&argv(&["-i", "in", "out"])), None);
    }

    #[test]
    fn parser_uses_requested_duration() {
        let mut p = ProgressParser::new(Some(4.0));
        assert_eq!(p.feed("frame=10"), None);
        assert_eq!(p.feed("out_time_us=1000000"), Some(0.25));
        assert_eq!(p.feed("out_time_ms=3000000"), Some(0.75));
        assert_eq!(p.feed("out_time_us=N/A"), None);
        assert_eq!(p.feed("progress=end"), Some(1.0));
    }

    #[test]
    fn parser_falls_back_to_input_duration() {
        let mut p = ProgressParser::new(None);
        assert_eq!(p.feed("out_time_us=500000"), None);
        assert_eq!(
            p.feed("  Duration: 00:00:10.00, start: 0.000000, bitrate: 1000 kb/s"),
            None
        );
        assert_eq!(p.feed("out_time_us=5000000"), Some(0.5));
    }

    #[tokio::test]
    async fn load_without_ffmpeg_fails() {
        let engine = FfmpegEngine::new(ToolRegistry::default(), EngineConfig::default());
        let err = engine.load().await.unwrap_err();
        assert!(matches!(err, st_core::Error::EngineLoad(_)), "got: {err}");
        assert!(engine.workspace_dir().is_none());
    }

    #[tokio::test]
    async fn file_ops_before_load_are_not_ready() {
        let engine = FfmpegEngine::new(ToolRegistry::default(), EngineConfig::default());
        let err = engine.read_file("x.mp4").await.unwrap_err();
        assert!(matches!(err, st_core::Error::EngineNotReady { .. }));
    }

    /// End-to-end against a real ffmpeg; skipped when ffmpeg is unavailable.
    #[tokio::test]
    async fn trims_a_generated_clip() {
        let tools = ToolRegistry::discover(&EngineConfig::default());
        let Ok(ffmpeg) = tools.require("ffmpeg").map(|t| t.path.clone()) else {
            eprintln!("ffmpeg not found; skipping");
            return;
        };

        let src_dir = tempfile::tempdir().unwrap();
        let mut generate = ToolCommand::new(ffmpeg);
        generate.args([
            "-hide_banner", "-y", "-f", "lavfi", "-i",
            "testsrc=duration=4:size=160x120:rate=10", "-c:v", "mpeg4", "src.mp4",
        ]);
        generate.current_dir(src_dir.path());
        if generate.execute().await.is_err() {
            eprintln!("could not generate test clip; skipping");
            return;
        }
        let source = std::fs::read(src_dir.path().join("src.mp4")).unwrap();

        let engine = Arc::new(FfmpegEngine::new(tools, EngineConfig::default()));
        let handle = EngineHandle::new(engine.clone());
        handle.load().await.unwrap();
        let dir = engine.workspace_dir().unwrap();

        handle
            .write_file("input.mp4", Bytes::from(source))
            .await
            .unwrap();

        let fractions = Arc::new(Mutex::new(Vec::new()));
        let sink = fractions.clone();
        handle.subscribe(move |p| sink.lock().push(p));
        handle
            .execute(&argv(&[
                "-i", "input.mp4", "-ss", "1", "-t", "2", "-c", "copy", "output1.mp4",
            ]))
            .await
            .unwrap();

        let clip = handle.read_file("output1.mp4").await.unwrap();
        assert!(!clip.is_empty());
        assert!(fractions.lock().iter().all(|p| (0.0..=1.0).contains(p)));

        let err = handle
            .execute(&argv(&["-i", "missing.mp4", "-t", "1", "-c", "copy", "x.mp4"]))
            .await
            .unwrap_err();
        assert!(matches!(err, st_core::Error::EngineExec { .. }));

        handle.delete_file("output1.mp4").await.unwrap();
        assert!(handle.delete_file("output1.mp4").await.unwrap_err().is_not_found());

        handle.terminate();
        assert!(!dir.exists());
    }
}
