//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! engine, pipeline and output sections. Every section defaults sensibly so a
//! completely empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.engine.exec_timeout_secs == 0 {
            warnings.push("engine.exec_timeout_secs is 0; every command will time out".into());
        }
        if self.engine.load_timeout_secs == 0 {
            warnings.push("engine.load_timeout_secs is 0; the engine can never load".into());
        }

        for (key, path) in [
            ("engine.ffmpeg_path", &self.engine.ffmpeg_path),
            ("engine.ffprobe_path", &self.engine.ffprobe_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "{key} {} does not exist; falling back to PATH",
                        p.display()
                    ));
                }
            }
        }

        if self.pipeline.input_name.trim().is_empty() {
            warnings.push("pipeline.input_name is empty".into());
        }
        if self.pipeline.input_name.contains(['/', '\\']) {
            warnings.push("pipeline.input_name must be a plain file name".into());
        }
        if self.pipeline.output_prefix.trim().is_empty() {
            warnings.push("pipeline.output_prefix is empty".into());
        }
        if self.pipeline.default_segment_count == 0 {
            warnings.push("pipeline.default_segment_count is 0; sessions start empty".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Engine backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Override for the ffmpeg executable; `PATH` is searched otherwise.
    pub ffmpeg_path: Option<PathBuf>,
    /// Override for the ffprobe executable.
    pub ffprobe_path: Option<PathBuf>,
    /// Upper bound for a single engine command.
    pub exec_timeout_secs: u64,
    /// Upper bound for engine initialization.
    pub load_timeout_secs: u64,
}

impl EngineConfig {
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            exec_timeout_secs: 3600,
            load_timeout_secs: 30,
        }
    }
}

/// What the pipeline does after a segment fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failed segment.
    #[default]
    Abort,
    /// Record the failure and keep going with the remaining segments.
    Continue,
}

/// Extraction pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub failure_policy: FailurePolicy,
    /// Clear the segment list and source after a failed run too.
    pub clear_on_failure: bool,
    /// Virtual name the source is staged under.
    pub input_name: String,
    /// Prefix of suggested output names (`{prefix}_{n}.{ext}`).
    pub output_prefix: String,
    /// Extension used for virtual outputs and suggested names.
    pub output_extension: String,
    /// Number of placeholder segments a fresh session starts with.
    pub default_segment_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Abort,
            clear_on_failure: true,
            input_name: "input.mp4".into(),
            output_prefix: "segment".into(),
            output_extension: "mp4".into(),
            default_segment_count: 3,
        }
    }
}

/// Where finished segments are written by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Replace existing files instead of failing.
    pub overwrite: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            overwrite: false,
        }
    }
}
