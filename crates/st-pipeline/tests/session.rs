//! Session editing and submission.

use std::sync::Arc;

use bytes::Bytes;

use st_core::config::PipelineConfig;
use st_core::SourceFile;
use st_engine::{ClipInfo, EngineHandle, MemoryEngine};
use st_pipeline::{ExtractionPipeline, ExtractionSession, MemorySink, SegmentList, SegmentSpec};

fn session_with(engine: MemoryEngine, config: PipelineConfig) -> (Arc<MemoryEngine>, ExtractionSession) {
    let engine = Arc::new(engine);
    let handle = Arc::new(EngineHandle::new(engine.clone()));
    let pipeline = Arc::new(ExtractionPipeline::new(handle, config));
    (engine, ExtractionSession::new(pipeline))
}

fn session() -> (Arc<MemoryEngine>, ExtractionSession) {
    session_with(MemoryEngine::new(), PipelineConfig::default())
}

fn movie() -> SourceFile {
    SourceFile::new("movie.mp4", Bytes::from_static(b"frames"))
}

#[tokio::test]
async fn starts_with_three_placeholders() {
    let (_engine, session) = session();
    assert_eq!(session.segments(), &SegmentList::placeholders(3));
    assert!(session.source().is_none());
}

#[tokio::test]
async fn submit_requires_a_source() {
    let (engine, mut session) = session();
    let err = session.submit(&MemorySink::new()).await.unwrap_err();
    assert!(matches!(err, st_core::Error::Validation(_)));
    assert_eq!(engine.load_attempts(), 0);
}

#[tokio::test]
async fn set_duration_requires_a_source() {
    let (_engine, mut session) = session();
    assert!(session.set_duration(10.0).is_err());
}

#[tokio::test]
async fn duration_arrival_clamps_earlier_edits() {
    let (_engine, mut session) = session();
    session.select_source(movie()).unwrap();
    session.edit_start(2, "5").unwrap();
    session.edit_end(2, "12").unwrap();
    assert_eq!(session.segments().specs()[2].end, 12.0);

    session.set_duration(10.0).unwrap();
    assert_eq!(session.segments().specs()[2], SegmentSpec::new(2, 5.0, 10.0));
    assert_eq!(session.source().and_then(SourceFile::duration), Some(10.0));

    session.edit_start(0, "-2").unwrap();
    session.edit_end(0, "99").unwrap();
    assert_eq!(session.segments().specs()[0], SegmentSpec::new(0, 0.0, 10.0));
}

#[tokio::test]
async fn replacing_the_source_resets_the_duration() {
    let (_engine, mut session) = session();
    session
        .select_source(movie().with_duration(10.0).unwrap())
        .unwrap();
    assert_eq!(session.segments().duration(), Some(10.0));

    session
        .select_source(SourceFile::new("other.mp4", Bytes::new()))
        .unwrap();
    assert_eq!(session.segments().duration(), None);
    assert_eq!(session.source().map(SourceFile::name), Some("other.mp4"));
}

#[tokio::test]
async fn successful_submit_resets_the_session() {
    let (engine, mut session) = session();
    session.select_source(movie()).unwrap();
    session.set_duration(10.0).unwrap();
    for (i, (start, end)) in [("0", "3"), ("4", "4"), ("5", "12")].iter().enumerate() {
        session.edit_start(i, start).unwrap();
        session.edit_end(i, end).unwrap();
    }

    let sink = MemorySink::new();
    let report = session.submit(&sink).await.unwrap();

    assert!(report.is_success());
    let durations: Vec<f64> = sink
        .outputs()
        .iter()
        .map(|o| ClipInfo::parse(&o.bytes).unwrap().duration)
        .collect();
    assert_eq!(durations, vec![3.0, 0.0, 5.0]);
    assert!(engine.files().is_empty());

    assert!(session.source().is_none());
    assert_eq!(session.segments(), &SegmentList::placeholders(3));
}

#[tokio::test]
async fn failed_submit_clears_by_default() {
    let (_engine, mut session) = session_with(
        MemoryEngine::new().failing_exec("output1.mp4"),
        PipelineConfig::default(),
    );
    session.select_source(movie()).unwrap();
    session.edit_end(0, "2").unwrap();

    let report = session.submit(&MemorySink::new()).await.unwrap();
    assert!(!report.is_success());
    assert!(session.source().is_none());
    assert_eq!(session.segments(), &SegmentList::placeholders(3));
}

#[tokio::test]
async fn failed_submit_can_keep_the_edits() {
    let config = PipelineConfig {
        clear_on_failure: false,
        ..PipelineConfig::default()
    };
    let (_engine, mut session) =
        session_with(MemoryEngine::new().failing_exec("output1.mp4"), config);
    session.select_source(movie()).unwrap();
    session.edit_end(0, "2").unwrap();

    let report = session.submit(&MemorySink::new()).await.unwrap();
    assert!(!report.is_success());
    assert_eq!(session.source().map(SourceFile::name), Some("movie.mp4"));
    assert_eq!(session.segments().specs()[0].end, 2.0);
}

#[tokio::test]
async fn load_failure_is_returned() {
    let config = PipelineConfig {
        clear_on_failure: false,
        ..PipelineConfig::default()
    };
    let (_engine, mut session) = session_with(MemoryEngine::new().failing_load("no engine"), config);
    session.select_source(movie()).unwrap();

    let sink = MemorySink::new();
    let err = session.submit(&sink).await.unwrap_err();
    assert!(matches!(err, st_core::Error::EngineLoad(_)));
    assert!(sink.is_empty());
    assert!(session.source().is_some());
}

#[tokio::test]
async fn segment_count_follows_config() {
    let config = PipelineConfig {
        default_segment_count: 5,
        ..PipelineConfig::default()
    };
    let (_engine, mut session) = session_with(MemoryEngine::new(), config);
    assert_eq!(session.segments().len(), 5);

    assert_eq!(session.add_segment(), 5);
    session.remove_segment(0).unwrap();
    assert_eq!(session.segments().len(), 5);
    assert!(session.remove_segment(9).is_err());

    session.reset();
    assert_eq!(session.segments(), &SegmentList::placeholders(5));
}
