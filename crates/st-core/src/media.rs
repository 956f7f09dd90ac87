//! Media-domain types shared across crates.

use std::path::Path;

use bytes::Bytes;
use serde::Serialize;

use crate::error::{Error, Result};

/// A source video supplied by the caller.
///
/// The bytes are opaque to segtrim; only the engine decodes them. The total
/// duration is unknown until something has decoded the file, so it starts as
/// `None` and is filled in later via [`SourceFile::set_duration`].
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    bytes: Bytes,
    duration: Option<f64>,
}

impl SourceFile {
    /// Wrap an in-memory buffer.
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            duration: None,
        }
    }

    /// Read a source file from disk. The duration is left unknown.
    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());
        Ok(Self::new(name, bytes))
    }

    /// Builder: attach a known duration.
    pub fn with_duration(mut self, seconds: f64) -> Result<Self> {
        self.set_duration(seconds)?;
        Ok(self)
    }

    /// Record the decoded duration in seconds.
    pub fn set_duration(&mut self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(Error::Validation(format!(
                "duration must be a finite, non-negative number of seconds (got {seconds})"
            )));
        }
        self.duration = Some(seconds);
        Ok(())
    }

    /// Original file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Total duration in seconds, once known.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Size of the source in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Lightweight description for logs and reports.
    pub fn summary(&self) -> SourceSummary {
        SourceSummary {
            name: self.name.clone(),
            byte_len: self.bytes.len(),
            duration: self.duration,
        }
    }
}

/// Metadata of a [`SourceFile`] without its bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub byte_len: usize,
    pub duration: Option<f64>,
}

/// Render seconds as `m:ss`, truncating fractions.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let whole = seconds.floor() as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}

/// Parse a clock value: plain seconds (`12.5`), `MM:SS(.f)` or
/// `HH:MM:SS(.f)`. Returns `None` for anything else, including negatives.
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut total = 0.0;
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    for (i, part) in parts.iter().enumerate() {
        let value: f64 = part.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        // Only the last component may carry a fraction or exceed 59.
        if i + 1 < parts.len() && (value.fract() != 0.0 || (i > 0 && value >= 60.0)) {
            return None;
        }
        total = total * 60.0 + value;
    }
    Some(total)
}
