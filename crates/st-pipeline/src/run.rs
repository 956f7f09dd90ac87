//! Run state and the report returned by a finished run.

use serde::Serialize;

use st_core::RunId;

/// Externally visible state of the pipeline. Fresh per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Staging,
    /// `percent` is the progress of the current command.
    Running { index: usize, percent: u8 },
    Completed,
    Failed { reason: String, completed: Vec<usize> },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed { .. })
    }
}

/// Fine-grained step of the orchestration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "index", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Staging,
    Executing(usize),
    Retrieving(usize),
    Emitting(usize),
    Failed(usize),
    Finalizing,
}

/// A segment that reached the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmittedSegment {
    pub index: usize,
    pub name: String,
    pub byte_len: usize,
}

/// A segment that did not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentFailure {
    pub index: usize,
    pub error: String,
}

/// Outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    /// In delivery order.
    pub emitted: Vec<EmittedSegment>,
    pub failures: Vec<SegmentFailure>,
    /// Set when the final purge could not empty the workspace.
    pub cleanup_error: Option<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Indices of the emitted segments.
    pub fn completed(&self) -> Vec<usize> {
        self.emitted.iter().map(|s| s.index).collect()
    }

    pub fn first_failure(&self) -> Option<&SegmentFailure> {
        self.failures.first()
    }

    /// Display message for a failed run.
    pub fn reason(&self) -> Option<&str> {
        match &self.status {
            RunStatus::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_tagged() {
        let json = serde_json::to_value(RunStatus::Running {
            index: 1,
            percent: 40,
        })
        .unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["percent"], 40);

        let json = serde_json::to_value(Phase::Executing(2)).unwrap();
        assert_eq!(json["phase"], "executing");
        assert_eq!(json["index"], 2);
    }

    #[test]
    fn report_helpers() {
        let report = RunReport {
            run_id: RunId::new(),
            status: RunStatus::Failed {
                reason: "boom".into(),
                completed: vec![0],
            },
            emitted: vec![EmittedSegment {
                index: 0,
                name: "segment_1.mp4".into(),
                byte_len: 3,
            }],
            failures: vec![SegmentFailure {
                index: 1,
                error: "boom".into(),
            }],
            cleanup_error: None,
        };
        assert!(!report.is_success());
        assert_eq!(report.completed(), vec![0]);
        assert_eq!(report.first_failure().map(|f| f.index), Some(1));
        assert_eq!(report.reason(), Some("boom"));
        assert!(report.status.is_terminal());
    }
}
