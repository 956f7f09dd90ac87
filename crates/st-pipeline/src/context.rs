//! Progress reporting for a pipeline run.

/// One progress report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    /// Index of the segment being processed.
    pub index: usize,
    /// Number of segments in the run.
    pub total: usize,
    /// Rounded progress of the current command (0 -- 100).
    pub percent: u8,
    /// Progress across the whole run (0.0 -- 100.0).
    pub overall: f32,
}

impl ProgressUpdate {
    /// Attribute a raw engine fraction to segment `index` of `total`.
    pub fn new(index: usize, total: usize, fraction: f64) -> Self {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let overall = if total == 0 {
            100.0
        } else {
            ((index as f64 + fraction) / total as f64 * 100.0) as f32
        };
        Self {
            index,
            total,
            percent: (fraction * 100.0).round() as u8,
            overall,
        }
    }
}

/// Sender for reporting progress out of a run.
///
/// Wraps a callback; delivery is fire-and-forget.
pub struct ProgressSender {
    callback: Box<dyn Fn(ProgressUpdate) + Send + Sync>,
}

impl ProgressSender {
    /// Create a new sender from the given callback.
    pub fn new(callback: impl Fn(ProgressUpdate) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Create a no-op sender that discards all progress reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    /// Report progress.
    pub fn send(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

impl Default for ProgressSender {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}
