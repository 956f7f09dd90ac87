//! [`ExtractionPipeline`]: drives an [`EngineHandle`] through
//! stage -> execute -> retrieve -> emit -> cleanup for every segment.
//!
//! Segments run strictly one after another. The staged input and every
//! per-segment output are purged before a run returns, whether it succeeded
//! or not.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use st_core::config::{FailurePolicy, PipelineConfig};
use st_core::events::{EventBus, RunEvent};
use st_core::{RunId, SourceFile};
use st_engine::{render_args, EngineHandle, SubscriptionId, Workspace};

use crate::context::{ProgressSender, ProgressUpdate};
use crate::run::{EmittedSegment, Phase, RunReport, RunStatus, SegmentFailure};
use crate::segment::SegmentSpec;
use crate::sink::{OutputSink, SegmentOutput};

/// Segment extraction orchestrator.
///
/// The engine is injected and shared; the pipeline never terminates it.
/// Only one run may be in flight at a time.
pub struct ExtractionPipeline {
    engine: Arc<EngineHandle>,
    config: PipelineConfig,
    events: Option<Arc<EventBus>>,
    progress: Arc<ProgressSender>,
    status: Arc<Mutex<RunStatus>>,
    phase: Mutex<Phase>,
    busy: AtomicBool,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Removes a progress subscription when dropped, including when the run
/// future is cancelled mid-segment.
struct SubscriptionGuard<'a> {
    engine: &'a EngineHandle,
    id: SubscriptionId,
}

impl Drop for SubscriptionGuard<'_> {
    fn drop(&mut self) {
        self.engine.unsubscribe(self.id);
    }
}

/// Routes progress of the running command to the status, the progress
/// sender and the event bus.
#[derive(Clone)]
struct ProgressRelay {
    run_id: RunId,
    total: usize,
    /// `(segment index, position in the run)` of the running command.
    current: Arc<Mutex<(usize, usize)>>,
    status: Arc<Mutex<RunStatus>>,
    progress: Arc<ProgressSender>,
    events: Option<Arc<EventBus>>,
}

impl ProgressRelay {
    fn point_at(&self, index: usize, position: usize) {
        *self.current.lock() = (index, position);
    }

    fn emit(&self, fraction: f64) -> ProgressUpdate {
        let (index, position) = *self.current.lock();
        let update = ProgressUpdate {
            index,
            ..ProgressUpdate::new(position, self.total, fraction)
        };
        *self.status.lock() = RunStatus::Running {
            index,
            percent: update.percent,
        };
        self.progress.send(update);
        if let Some(bus) = &self.events {
            bus.publish(RunEvent::SegmentProgress {
                run_id: self.run_id,
                index,
                percent: update.percent,
                overall: update.overall,
            });
        }
        update
    }
}

impl ExtractionPipeline {
    pub fn new(engine: Arc<EngineHandle>, config: PipelineConfig) -> Self {
        Self {
            engine,
            config,
            events: None,
            progress: Arc::new(ProgressSender::noop()),
            status: Arc::new(Mutex::new(RunStatus::Idle)),
            phase: Mutex::new(Phase::Idle),
            busy: AtomicBool::new(false),
        }
    }

    /// Builder: publish [`RunEvent`]s to `events`.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Builder: attach a progress sender.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn engine(&self) -> &Arc<EngineHandle> {
        &self.engine
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Status of the current run, or the outcome of the last one.
    pub fn status(&self) -> RunStatus {
        self.status.lock().clone()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Virtual name a segment is written to inside the engine.
    pub fn output_name(&self, spec: &SegmentSpec) -> String {
        format!("output{}.{}", spec.number(), self.config.output_extension)
    }

    /// Name suggested to the sink, e.g. `segment_1.mp4`.
    pub fn suggested_name(&self, spec: &SegmentSpec) -> String {
        format!(
            "{}_{}.{}",
            self.config.output_prefix,
            spec.number(),
            self.config.output_extension
        )
    }

    fn set_status(&self, status: RunStatus) {
        *self.status.lock() = status;
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    fn publish(&self, event: RunEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Extract `specs` from `source`, handing each clip to `sink`.
    ///
    /// Returns `Err` only when the run could not start: another run is in
    /// flight ([`st_core::Error::Busy`]) or the engine failed to load. Every
    /// later failure is recorded in the returned [`RunReport`].
    pub async fn run(
        &self,
        source: &SourceFile,
        specs: &[SegmentSpec],
        sink: &dyn OutputSink,
    ) -> st_core::Result<RunReport> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(st_core::Error::Busy(
                "an extraction run is already in progress".into(),
            ));
        }
        let _guard = BusyGuard(&self.busy);

        let run_id = RunId::new();
        let mut ordered = specs.to_vec();
        ordered.sort_by_key(|s| s.index);
        if let Some(duration) = source.duration() {
            for spec in &mut ordered {
                *spec = spec.clamped(duration);
            }
        }

        self.set_status(RunStatus::Idle);
        self.set_phase(Phase::Idle);
        tracing::info!(
            "Run {}: extracting {} segment(s) from {}",
            run_id.short(),
            ordered.len(),
            source.name()
        );
        self.publish(RunEvent::RunStarted {
            run_id,
            segments: ordered.len(),
        });

        if let Err(e) = self.engine.load().await {
            tracing::error!("Run {}: engine failed to load: {e}", run_id.short());
            self.set_status(RunStatus::Failed {
                reason: e.to_string(),
                completed: Vec::new(),
            });
            self.publish(RunEvent::RunFailed {
                run_id,
                error: e.to_string(),
                completed: Vec::new(),
            });
            return Err(e);
        }

        let workspace = Workspace::new(self.engine.clone());
        let mut report = RunReport {
            run_id,
            status: RunStatus::Idle,
            emitted: Vec::new(),
            failures: Vec::new(),
            cleanup_error: None,
        };
        let input = self.config.input_name.as_str();

        self.set_phase(Phase::Staging);
        self.set_status(RunStatus::Staging);
        let stage_error = match workspace.stage(input, source.bytes().clone()).await {
            Ok(()) => {
                self.publish(RunEvent::SourceStaged {
                    run_id,
                    name: input.to_string(),
                    byte_len: source.byte_len(),
                });
                self.extract_all(run_id, &workspace, &ordered, sink, &mut report)
                    .await;
                None
            }
            Err(e) => {
                tracing::error!("Run {}: failed to stage {input}: {e}", run_id.short());
                Some(e.to_string())
            }
        };

        self.set_phase(Phase::Finalizing);
        if let Err(e) = workspace.purge(input).await {
            tracing::warn!("Failed to purge {input}: {e}");
        }
        if let Err(e) = workspace.purge_all().await {
            report.cleanup_error = Some(e.to_string());
        }

        let reason = stage_error.or_else(|| report.first_failure().map(|f| f.error.clone()));
        report.status = match reason {
            None => {
                tracing::info!(
                    "[100%] Run {} completed: {} segment(s) emitted",
                    run_id.short(),
                    report.emitted.len()
                );
                self.publish(RunEvent::RunCompleted {
                    run_id,
                    emitted: report.emitted.len(),
                });
                RunStatus::Completed
            }
            Some(reason) => {
                let completed = report.completed();
                tracing::error!(
                    "Run {} failed after {} segment(s): {reason}",
                    run_id.short(),
                    completed.len()
                );
                self.publish(RunEvent::RunFailed {
                    run_id,
                    error: reason.clone(),
                    completed: completed.clone(),
                });
                RunStatus::Failed { reason, completed }
            }
        };
        self.set_status(report.status.clone());
        self.set_phase(Phase::Idle);
        Ok(report)
    }

    async fn extract_all(
        &self,
        run_id: RunId,
        workspace: &Workspace,
        specs: &[SegmentSpec],
        sink: &dyn OutputSink,
        report: &mut RunReport,
    ) {
        let relay = ProgressRelay {
            run_id,
            total: specs.len(),
            current: Arc::new(Mutex::new((0, 0))),
            status: self.status.clone(),
            progress: self.progress.clone(),
            events: self.events.clone(),
        };
        let _subscription = {
            let relay = relay.clone();
            SubscriptionGuard {
                engine: &self.engine,
                id: self.engine.subscribe(move |fraction| {
                    relay.emit(fraction);
                }),
            }
        };

        for (position, spec) in specs.iter().enumerate() {
            relay.point_at(spec.index, position);
            match self.extract_one(run_id, workspace, spec, sink, &relay).await {
                Ok(emitted) => report.emitted.push(emitted),
                Err(e) => {
                    self.set_phase(Phase::Failed(spec.index));
                    tracing::error!("Segment {} failed: {e}", spec.number());
                    self.publish(RunEvent::SegmentFailed {
                        run_id,
                        index: spec.index,
                        error: e.to_string(),
                    });
                    report.failures.push(SegmentFailure {
                        index: spec.index,
                        error: e.to_string(),
                    });
                    let output = self.output_name(spec);
                    if let Err(e) = workspace.purge(&output).await {
                        tracing::warn!("Failed to purge {output}: {e}");
                    }
                    if self.config.failure_policy == FailurePolicy::Abort {
                        break;
                    }
                }
            }
        }
    }

    async fn extract_one(
        &self,
        run_id: RunId,
        workspace: &Workspace,
        spec: &SegmentSpec,
        sink: &dyn OutputSink,
        relay: &ProgressRelay,
    ) -> st_core::Result<EmittedSegment> {
        let output = self.output_name(spec);
        let args = spec.trim_args(&self.config.input_name, &output);

        self.set_phase(Phase::Executing(spec.index));
        self.set_status(RunStatus::Running {
            index: spec.index,
            percent: 0,
        });
        self.publish(RunEvent::SegmentStarted {
            run_id,
            index: spec.index,
            start: spec.start,
            end: spec.end,
        });
        tracing::info!(
            "Extracting segment {spec} ({}s from {}s)",
            spec.duration(),
            spec.start
        );
        tracing::debug!("{} {}", self.engine.engine_name(), render_args(&args));
        workspace.run(&args, &[output.as_str()]).await?;

        self.set_phase(Phase::Retrieving(spec.index));
        let bytes = workspace.materialize(&output).await?;

        self.set_phase(Phase::Emitting(spec.index));
        let name = self.suggested_name(spec);
        let byte_len = bytes.len();
        sink.accept(SegmentOutput {
            index: spec.index,
            suggested_name: name.clone(),
            bytes,
        })
        .await?;

        if let Err(e) = workspace.purge(&output).await {
            tracing::warn!("Failed to purge {output}: {e}");
        }

        let update = relay.emit(1.0);
        tracing::info!("[{:.0}%] Emitted {name} ({byte_len} bytes)", update.overall);
        self.publish(RunEvent::SegmentEmitted {
            run_id,
            index: spec.index,
            name: name.clone(),
            byte_len,
        });
        Ok(EmittedSegment {
            index: spec.index,
            name,
            byte_len,
        })
    }
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionPipeline")
            .field("engine", &self.engine)
            .field("status", &*self.status.lock())
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}
