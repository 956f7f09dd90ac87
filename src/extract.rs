//! The `extract` command: read a source, cut the requested segments with
//! ffmpeg and write them to the output directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use st_core::config::{Config, FailurePolicy};
use st_core::events::{EventBus, RunEvent};
use st_core::{format_time, SourceFile};
use st_engine::{probe_duration, EngineHandle, FfmpegEngine, ToolRegistry};
use st_pipeline::{
    DirectorySink, ExtractionPipeline, ExtractionSession, ProgressSender, RunReport, SegmentSpec,
};

/// What to extract.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub input: PathBuf,
    /// Raw `START-END` ranges, one per segment.
    pub segments: Vec<String>,
    /// Known source duration; probed with ffprobe when absent.
    pub duration: Option<f64>,
    pub output_dir: Option<PathBuf>,
    pub overwrite: bool,
    pub keep_going: bool,
}

impl ExtractRequest {
    /// Parse the segment ranges.
    pub fn specs(&self) -> st_core::Result<Vec<SegmentSpec>> {
        self.segments
            .iter()
            .enumerate()
            .map(|(i, raw)| SegmentSpec::parse(i, raw))
            .collect()
    }

    /// Apply command-line overrides on top of the loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        if self.overwrite {
            config.output.overwrite = true;
        }
        if self.keep_going {
            config.pipeline.failure_policy = FailurePolicy::Continue;
        }
    }
}

/// Run `request` with the ffmpeg engine.
pub async fn extract_file(mut config: Config, request: &ExtractRequest) -> Result<RunReport> {
    if !request.input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", request.input);
    }
    let specs = request.specs()?;
    request.apply(&mut config);

    let tools = ToolRegistry::discover(&config.engine);
    let duration = match request.duration {
        Some(d) => Some(d),
        None => match probe_duration(&tools, &request.input).await {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!("Could not probe duration, segments stay unclamped: {e}");
                None
            }
        },
    };

    let engine = Arc::new(EngineHandle::new(Arc::new(FfmpegEngine::new(
        tools,
        config.engine.clone(),
    ))));
    let report = run_extraction(engine.clone(), &config, request, specs, duration).await;
    engine.terminate();
    report
}

/// Run `specs` against an already constructed engine.
pub async fn run_extraction(
    engine: Arc<EngineHandle>,
    config: &Config,
    request: &ExtractRequest,
    specs: Vec<SegmentSpec>,
    duration: Option<f64>,
) -> Result<RunReport> {
    let source = SourceFile::read(&request.input)
        .await
        .with_context(|| format!("Failed to read {:?}", request.input))?;

    let events = Arc::new(EventBus::default());
    let printer = tokio::spawn(print_events(events.subscribe()));

    let pipeline = ExtractionPipeline::new(engine, config.pipeline.clone())
        .with_events(events.clone())
        .with_progress(ProgressSender::new(|update| {
            tracing::trace!(
                "segment {} at {}% ({:.1}% overall)",
                update.index + 1,
                update.percent,
                update.overall
            );
        }));

    let mut session = ExtractionSession::new(Arc::new(pipeline));
    session.select_source(source)?;
    if let Some(d) = duration {
        session.set_duration(d)?;
    }
    session.set_segments(specs);

    let sink = DirectorySink::from_config(&config.output);
    let result = session.submit(&sink).await;

    drop(session);
    drop(events);
    if let Err(e) = printer.await {
        tracing::warn!("Progress printer stopped: {e}");
    }

    Ok(result?)
}

async fn print_events(mut rx: tokio::sync::broadcast::Receiver<st_core::events::Event>) {
    use tokio::sync::broadcast::error::RecvError;

    let mut last_percent = None;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event.payload,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match event {
            RunEvent::SegmentStarted {
                index, start, end, ..
            } => {
                last_percent = None;
                println!(
                    "Segment {}: {} - {}",
                    index + 1,
                    format_time(start),
                    format_time(end)
                );
            }
            RunEvent::SegmentProgress { percent, .. } => {
                if last_percent != Some(percent) && percent % 10 == 0 {
                    println!("  {percent}%");
                }
                last_percent = Some(percent);
            }
            RunEvent::SegmentEmitted { name, byte_len, .. } => {
                println!("  -> {name} ({byte_len} bytes)");
            }
            RunEvent::SegmentFailed { index, error, .. } => {
                println!("  segment {} failed: {error}", index + 1);
            }
            RunEvent::RunCompleted { .. } | RunEvent::RunFailed { .. } => break,
            RunEvent::RunStarted { .. } | RunEvent::SourceStaged { .. } => {}
        }
    }
}
