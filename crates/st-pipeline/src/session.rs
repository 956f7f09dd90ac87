//! [`ExtractionSession`]: the editable state in front of a pipeline.
//!
//! A session holds the selected source and the segment list the user is
//! editing, and submits them to an [`ExtractionPipeline`]. After a run the
//! list goes back to placeholders and the source is cleared.

use std::sync::Arc;

use st_core::config::PipelineConfig;
use st_core::{Error, Result, SessionId, SourceFile};

use crate::pipeline::ExtractionPipeline;
use crate::run::RunReport;
use crate::segment::{SegmentList, SegmentSpec};
use crate::sink::OutputSink;

pub struct ExtractionSession {
    id: SessionId,
    pipeline: Arc<ExtractionPipeline>,
    segments: SegmentList,
    source: Option<SourceFile>,
    default_count: usize,
    clear_on_failure: bool,
}

impl ExtractionSession {
    /// A session starting with the configured number of placeholders.
    pub fn new(pipeline: Arc<ExtractionPipeline>) -> Self {
        let PipelineConfig {
            default_segment_count,
            clear_on_failure,
            ..
        } = *pipeline.config();
        Self {
            id: SessionId::new(),
            pipeline,
            segments: SegmentList::placeholders(default_segment_count),
            source: None,
            default_count: default_segment_count,
            clear_on_failure,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn pipeline(&self) -> &Arc<ExtractionPipeline> {
        &self.pipeline
    }

    pub fn segments(&self) -> &SegmentList {
        &self.segments
    }

    pub fn source(&self) -> Option<&SourceFile> {
        self.source.as_ref()
    }

    /// Select a source, replacing any previous one.
    ///
    /// If the source already knows its duration the segments are clamped to
    /// it; otherwise the duration is unknown until [`set_duration`](Self::set_duration).
    pub fn select_source(&mut self, source: SourceFile) -> Result<()> {
        match source.duration() {
            Some(duration) => self.segments.set_duration(duration)?,
            None => self.segments.clear_duration(),
        }
        tracing::debug!("session {}: selected {}", self.id.short(), source.name());
        self.source = Some(source);
        Ok(())
    }

    /// Record the decoded duration of the selected source.
    pub fn set_duration(&mut self, seconds: f64) -> Result<()> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| Error::Validation("no source selected".into()))?;
        source.set_duration(seconds)?;
        self.segments.set_duration(seconds)
    }

    pub fn edit_start(&mut self, index: usize, raw: &str) -> Result<()> {
        self.segments.edit_start(index, raw)
    }

    pub fn edit_end(&mut self, index: usize, raw: &str) -> Result<()> {
        self.segments.edit_end(index, raw)
    }

    /// Replace the whole segment list.
    pub fn set_segments(&mut self, specs: impl IntoIterator<Item = SegmentSpec>) {
        self.segments.replace(specs);
    }

    /// Append a placeholder segment; returns its index.
    pub fn add_segment(&mut self) -> usize {
        self.segments.add()
    }

    pub fn remove_segment(&mut self, index: usize) -> Result<SegmentSpec> {
        self.segments.remove(index)
    }

    /// Placeholders again, no source.
    pub fn reset(&mut self) {
        self.segments.reset(self.default_count);
        self.source = None;
    }

    /// Run the pipeline over the current segments.
    ///
    /// The session is reset after a successful run. After a failed one it is
    /// reset only when `clear_on_failure` is set. A rejected submission
    /// ([`Error::Busy`], no source) leaves it untouched.
    pub async fn submit(&mut self, sink: &dyn OutputSink) -> Result<RunReport> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| Error::Validation("no source selected".into()))?;
        let specs = self.segments.specs().to_vec();

        let result = self.pipeline.run(source, &specs, sink).await;
        let clear = match &result {
            Ok(report) => report.is_success() || self.clear_on_failure,
            Err(Error::Busy(_)) => false,
            Err(_) => self.clear_on_failure,
        };
        if clear {
            self.reset();
        }
        result
    }
}

impl std::fmt::Debug for ExtractionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionSession")
            .field("id", &self.id)
            .field("segments", &self.segments)
            .field("source", &self.source.as_ref().map(SourceFile::summary))
            .finish_non_exhaustive()
    }
}
