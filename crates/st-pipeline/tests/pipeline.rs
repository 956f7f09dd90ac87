//! Extraction pipeline tests against the in-memory engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use st_core::config::{FailurePolicy, PipelineConfig};
use st_core::events::{EventBus, RunEvent};
use st_core::SourceFile;
use st_engine::{ClipInfo, EngineCall, EngineHandle, MemoryEngine};
use st_pipeline::{
    ExtractionPipeline, MemorySink, OutputSink, Phase, ProgressSender, ProgressUpdate, RunStatus,
    SegmentList, SegmentOutput, SegmentSpec,
};

fn setup(engine: MemoryEngine, config: PipelineConfig) -> (Arc<MemoryEngine>, ExtractionPipeline) {
    let engine = Arc::new(engine);
    let handle = Arc::new(EngineHandle::new(engine.clone()));
    (engine, ExtractionPipeline::new(handle, config))
}

fn source() -> SourceFile {
    SourceFile::new("holiday.mp4", Bytes::from_static(b"0123456789"))
}

fn specs(ranges: &[(f64, f64)]) -> Vec<SegmentSpec> {
    ranges
        .iter()
        .enumerate()
        .map(|(i, &(start, end))| SegmentSpec::new(i, start, end))
        .collect()
}

fn clip_durations(sink: &MemorySink) -> Vec<f64> {
    sink.outputs()
        .iter()
        .map(|o| ClipInfo::parse(&o.bytes).unwrap().duration)
        .collect()
}

#[tokio::test]
async fn every_spec_yields_one_output_in_order() {
    let (engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    let sink = MemorySink::new();

    let report = pipeline
        .run(&source(), &specs(&[(0.0, 2.0), (2.0, 5.0), (7.5, 9.0)]), &sink)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(
        sink.names(),
        vec!["segment_1.mp4", "segment_2.mp4", "segment_3.mp4"]
    );
    assert_eq!(report.completed(), vec![0, 1, 2]);
    assert_eq!(clip_durations(&sink), vec![2.0, 3.0, 1.5]);
    assert!(engine.files().is_empty());
    assert_eq!(engine.max_concurrent_execs(), 1);

    assert_eq!(
        engine.exec_calls()[1],
        vec!["-i", "input.mp4", "-ss", "2", "-t", "3", "-c", "copy", "output2.mp4"]
    );
}

#[tokio::test]
async fn input_is_staged_once_and_purged_last() {
    let (engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    let sink = MemorySink::new();
    pipeline
        .run(&source(), &specs(&[(0.0, 1.0), (1.0, 2.0)]), &sink)
        .await
        .unwrap();

    let calls = engine.calls();
    let writes: Vec<_> = calls
        .iter()
        .filter(|c| matches!(c, EngineCall::Write(_)))
        .collect();
    assert_eq!(writes, vec![&EngineCall::Write("input.mp4".into())]);

    let deletes: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            EngineCall::Delete(name) => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(deletes.first(), Some(&"output1.mp4"));
    assert!(deletes.contains(&"input.mp4"));
    let first_input_delete = calls
        .iter()
        .position(|c| *c == EngineCall::Delete("input.mp4".into()))
        .unwrap();
    let last_exec = calls
        .iter()
        .rposition(|c| matches!(c, EngineCall::Exec(_)))
        .unwrap();
    assert!(first_input_delete > last_exec);
}

#[tokio::test]
async fn clamped_list_scenario() {
    let mut list = SegmentList::from_specs(specs(&[(0.0, 3.0), (4.0, 4.0), (5.0, 12.0)]));
    list.set_duration(10.0).unwrap();
    assert_eq!(list.specs()[2], SegmentSpec::new(2, 5.0, 10.0));

    let (engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    let sink = MemorySink::new();
    let report = pipeline.run(&source(), list.specs(), &sink).await.unwrap();

    assert!(report.is_success());
    assert_eq!(clip_durations(&sink), vec![3.0, 0.0, 5.0]);
    assert!(engine.files().is_empty());
}

#[tokio::test]
async fn zero_length_segment_is_attempted() {
    let (engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    let sink = MemorySink::new();
    let report = pipeline
        .run(&source(), &specs(&[(4.0, 4.0)]), &sink)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(engine.exec_calls().len(), 1);
    assert_eq!(engine.exec_calls()[0][5], "0");
    assert_eq!(clip_durations(&sink), vec![0.0]);
}

#[tokio::test]
async fn inverted_range_fails_in_the_engine() {
    let (engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    let sink = MemorySink::new();
    let report = pipeline
        .run(&source(), &specs(&[(8.0, 5.0)]), &sink)
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(engine.exec_calls()[0][5], "-3");
    let failure = report.first_failure().unwrap();
    assert_eq!(failure.index, 0);
    assert!(failure.error.contains("invalid duration"), "{}", failure.error);
    assert!(sink.is_empty());
    assert!(engine.files().is_empty());
}

#[tokio::test]
async fn failure_aborts_and_keeps_earlier_outputs() {
    let (engine, pipeline) = setup(
        MemoryEngine::new().failing_exec("output2.mp4"),
        PipelineConfig::default(),
    );
    let sink = MemorySink::new();
    let report = pipeline
        .run(&source(), &specs(&[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]), &sink)
        .await
        .unwrap();

    assert_eq!(sink.names(), vec!["segment_1.mp4"]);
    assert_eq!(engine.exec_calls().len(), 2);
    match &report.status {
        RunStatus::Failed { reason, completed } => {
            assert!(reason.contains("simulated failure"), "{reason}");
            assert_eq!(completed, &vec![0]);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(engine.files().is_empty());
    assert!(engine
        .calls()
        .contains(&EngineCall::Delete("input.mp4".into())));
    assert_eq!(pipeline.status(), report.status);
}

#[tokio::test]
async fn continue_policy_runs_remaining_segments() {
    let config = PipelineConfig {
        failure_policy: FailurePolicy::Continue,
        ..PipelineConfig::default()
    };
    let (engine, pipeline) = setup(MemoryEngine::new().failing_exec("output2.mp4"), config);
    let sink = MemorySink::new();
    let report = pipeline
        .run(&source(), &specs(&[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]), &sink)
        .await
        .unwrap();

    assert_eq!(sink.names(), vec!["segment_1.mp4", "segment_3.mp4"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
    assert_eq!(
        report.status,
        RunStatus::Failed {
            reason: report.failures[0].error.clone(),
            completed: vec![0, 2],
        }
    );
    assert!(engine.files().is_empty());
}

#[tokio::test]
async fn load_failure_touches_nothing() {
    let (engine, pipeline) = setup(
        MemoryEngine::new().failing_load("wasm core missing"),
        PipelineConfig::default(),
    );
    let sink = MemorySink::new();
    let err = pipeline
        .run(&source(), &specs(&[(0.0, 1.0)]), &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, st_core::Error::EngineLoad(_)), "got: {err}");
    assert!(sink.is_empty());
    assert_eq!(engine.calls(), vec![EngineCall::Load]);
    assert!(matches!(pipeline.status(), RunStatus::Failed { .. }));
    assert!(!pipeline.is_busy());

    // Not retried.
    let _ = pipeline.run(&source(), &specs(&[(0.0, 1.0)]), &sink).await;
    assert_eq!(engine.load_attempts(), 1);
}

#[tokio::test]
async fn known_source_duration_clamps_specs() {
    let (engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    let sink = MemorySink::new();
    let source = source().with_duration(10.0).unwrap();

    let report = pipeline
        .run(&source, &specs(&[(0.0, 3.0), (4.0, 4.0), (5.0, 12.0)]), &sink)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(
        engine.exec_calls()[2],
        vec!["-i", "input.mp4", "-ss", "5", "-t", "5", "-c", "copy", "output3.mp4"]
    );
    assert_eq!(clip_durations(&sink), vec![3.0, 0.0, 5.0]);
}

#[tokio::test]
async fn staging_failure_runs_nothing() {
    let (engine, pipeline) = setup(
        MemoryEngine::new().failing_write("input.mp4"),
        PipelineConfig::default(),
    );
    let sink = MemorySink::new();

    let report = pipeline
        .run(&source(), &specs(&[(0.0, 1.0), (1.0, 2.0)]), &sink)
        .await
        .unwrap();

    assert!(!report.is_success());
    assert!(report.completed().is_empty());
    assert!(matches!(report.status, RunStatus::Failed { .. }));
    assert!(matches!(pipeline.status(), RunStatus::Failed { .. }));
    assert!(report.reason().unwrap().contains("simulated write failure"));
    assert!(sink.is_empty());
    assert!(engine.exec_calls().is_empty());
    assert!(engine.files().is_empty());
    assert!(!pipeline.is_busy());
}

#[tokio::test]
async fn cancelled_run_releases_progress_subscription() {
    let (_engine, pipeline) = setup(
        MemoryEngine::new().with_exec_delay(Duration::from_millis(500)),
        PipelineConfig::default(),
    );
    let sink = MemorySink::new();
    let specs = specs(&[(0.0, 1.0)]);

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        pipeline.run(&source(), &specs, &sink),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(pipeline.engine().listener_count(), 0);
    assert!(!pipeline.is_busy());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn terminated_engine_cannot_run() {
    let (_engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    pipeline.engine().terminate();
    pipeline.engine().terminate();
    let err = pipeline
        .run(&source(), &specs(&[(0.0, 1.0)]), &MemorySink::new())
        .await
        .unwrap_err();
    assert!(matches!(err, st_core::Error::EngineLoad(_)));
}

#[tokio::test]
async fn reentrant_run_is_rejected() {
    let (engine, pipeline) = setup(
        MemoryEngine::new().with_exec_delay(Duration::from_millis(50)),
        PipelineConfig::default(),
    );
    let sink = MemorySink::new();
    let src = source();
    let list = specs(&[(0.0, 1.0)]);

    let (first, second) = tokio::join!(
        pipeline.run(&src, &list, &sink),
        pipeline.run(&src, &list, &sink)
    );
    assert!(first.unwrap().is_success());
    assert!(matches!(second.unwrap_err(), st_core::Error::Busy(_)));
    assert_eq!(engine.exec_calls().len(), 1);

    // Idle again afterwards.
    assert!(pipeline.run(&src, &list, &sink).await.is_ok());
}

#[tokio::test]
async fn progress_is_attributed_per_segment() {
    let updates: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::default();
    let seen = updates.clone();
    let (_engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    let pipeline = pipeline.with_progress(ProgressSender::new(move |u| seen.lock().push(u)));

    pipeline
        .run(&source(), &specs(&[(0.0, 1.0), (1.0, 2.0)]), &MemorySink::new())
        .await
        .unwrap();

    let updates = updates.lock().clone();
    assert!(!updates.is_empty());
    assert!(updates.iter().all(|u| u.percent <= 100 && u.total == 2));
    assert!(updates
        .windows(2)
        .all(|w| w[0].overall <= w[1].overall));
    assert!(updates.iter().any(|u| u.index == 0 && u.percent == 50));
    let last = updates.last().unwrap();
    assert_eq!((last.index, last.percent), (1, 100));
    assert_eq!(last.overall, 100.0);
    assert_eq!(pipeline.engine().state(), st_engine::EngineState::Ready);
}

#[tokio::test]
async fn events_trace_the_run() {
    let bus = Arc::new(EventBus::new(64));
    let mut rx = bus.subscribe();
    let (_engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    let pipeline = pipeline.with_events(bus.clone());

    let report = pipeline
        .run(&source(), &specs(&[(0.0, 1.0), (1.0, 2.0)]), &MemorySink::new())
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event.payload);
    }
    assert!(matches!(events.first(), Some(RunEvent::RunStarted { segments: 2, .. })));
    assert!(matches!(events.last(), Some(RunEvent::RunCompleted { emitted: 2, .. })));
    assert!(events.iter().all(|e| e.run_id() == report.run_id));
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::SourceStaged { byte_len: 10, .. })));
    let emitted: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::SegmentEmitted { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(emitted, vec![0, 1]);
}

#[tokio::test]
async fn run_ends_idle() {
    let (_engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    pipeline
        .run(&source(), &specs(&[(0.0, 1.0)]), &MemorySink::new())
        .await
        .unwrap();
    assert_eq!(pipeline.status(), RunStatus::Completed);
    assert_eq!(pipeline.phase(), Phase::Idle);
    assert!(!pipeline.is_busy());
}

struct RejectingSink {
    reject: usize,
    accepted: Mutex<Vec<usize>>,
}

#[async_trait]
impl OutputSink for RejectingSink {
    async fn accept(&self, output: SegmentOutput) -> st_core::Result<()> {
        if output.index == self.reject {
            return Err(st_core::Error::sink(&output.suggested_name, "disk full"));
        }
        self.accepted.lock().push(output.index);
        Ok(())
    }
}

#[tokio::test]
async fn sink_failure_fails_the_segment() {
    let (engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    let sink = RejectingSink {
        reject: 1,
        accepted: Mutex::new(Vec::new()),
    };
    let report = pipeline
        .run(&source(), &specs(&[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]), &sink)
        .await
        .unwrap();

    assert_eq!(*sink.accepted.lock(), vec![0]);
    assert!(report.first_failure().unwrap().error.contains("disk full"));
    assert!(engine.files().is_empty());
}

#[tokio::test]
async fn custom_names_follow_config() {
    let config = PipelineConfig {
        input_name: "source.mkv".into(),
        output_prefix: "clip".into(),
        output_extension: "mkv".into(),
        ..PipelineConfig::default()
    };
    let (engine, pipeline) = setup(MemoryEngine::new(), config);
    let sink = MemorySink::new();
    pipeline
        .run(&source(), &specs(&[(0.0, 1.0)]), &sink)
        .await
        .unwrap();

    assert_eq!(sink.names(), vec!["clip_1.mkv"]);
    let args = &engine.exec_calls()[0];
    assert_eq!(args[1], "source.mkv");
    assert_eq!(args.last().map(String::as_str), Some("output1.mkv"));
}

#[tokio::test]
async fn pipeline_does_not_terminate_the_engine() {
    let (engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    pipeline
        .run(&source(), &specs(&[(0.0, 1.0)]), &MemorySink::new())
        .await
        .unwrap();
    assert_eq!(engine.terminations(), 0);

    drop(pipeline);
    assert_eq!(engine.terminations(), 1);
}

#[tokio::test]
async fn empty_run_still_cleans_up() {
    let (engine, pipeline) = setup(MemoryEngine::new(), PipelineConfig::default());
    let sink = MemorySink::new();
    let report = pipeline.run(&source(), &[], &sink).await.unwrap();
    assert!(report.is_success());
    assert!(sink.is_empty());
    assert!(engine.files().is_empty());
    assert!(engine.exec_calls().is_empty());
}
