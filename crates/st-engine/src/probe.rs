//! Source duration probing via `ffprobe`.
//!
//! A [`st_core::SourceFile`] only learns its duration once something has
//! decoded it; this is that something.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe the container duration of `path` in seconds.
pub async fn probe_duration(tools: &ToolRegistry, path: &Path) -> st_core::Result<f64> {
    let ffprobe = tools.require("ffprobe")?;

    let mut cmd = ToolCommand::new(ffprobe.path.clone());
    cmd.timeout(PROBE_TIMEOUT);
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format"]);
    cmd.arg(path.to_string_lossy().as_ref());

    let output = cmd.execute().await?;
    let duration = parse_duration_json(&output.stdout)?;
    tracing::debug!("Probed {}: {duration:.3}s", path.display());
    Ok(duration)
}

/// Extract `format.duration` from ffprobe JSON output.
pub fn parse_duration_json(json: &str) -> st_core::Result<f64> {
    let parsed: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| st_core::Error::tool("ffprobe", format!("invalid JSON output: {e}")))?;

    let raw = parsed
        .format
        .and_then(|f| f.duration)
        .ok_or_else(|| st_core::Error::tool("ffprobe", "no duration in format section"))?;

    match raw.trim().parse::<f64>() {
        Ok(d) if d.is_finite() && d >= 0.0 => Ok(d),
        _ => Err(st_core::Error::tool(
            "ffprobe",
            format!("unparseable duration {raw:?}"),
        )),
    }
}
