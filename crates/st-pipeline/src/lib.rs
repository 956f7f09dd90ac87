//! st-pipeline: segment extraction orchestration.
//!
//! [`ExtractionPipeline`] stages a source into an engine once, trims every
//! [`SegmentSpec`] with a stream-copy command, hands each clip to an
//! [`OutputSink`] and leaves the engine's workspace empty.
//! [`ExtractionSession`] keeps the editable segment list and source in front
//! of it.

pub mod context;
pub mod pipeline;
pub mod run;
pub mod segment;
pub mod session;
pub mod sink;

pub use context::{ProgressSender, ProgressUpdate};
pub use pipeline::ExtractionPipeline;
pub use run::{EmittedSegment, Phase, RunReport, RunStatus, SegmentFailure};
pub use segment::{SegmentList, SegmentSpec};
pub use session::ExtractionSession;
pub use sink::{DirectorySink, MemorySink, OutputSink, SegmentOutput};
