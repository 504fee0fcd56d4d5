//! Export driver: sequences the phases of one export run.
//!
//! ```text
//! analyzing ──► prerendering ──► compositing ──► encoding ──► cleanup ──► complete
//!  (plan)      (dynamic layers,  (frame by frame  (sink       (temp dir      error
//!               bounded tasks)    into the sink)   finish)     released)     cancelled
//! ```
//!
//! The driver owns the cancel flag and the progress emitter. Element-level
//! failures are collected into [`PhaseSummary`] values and the run goes
//! on; anything else ends the run in `error`. Cleanup runs on every path.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use qcut_common::config::ExportDefaults;
use qcut_common::error::{QcutError, QcutResult};
use qcut_timeline::{ElementId, ExportSettings, Timeline};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::ImageCache;
use crate::components::{ComponentRegistry, StaticComponentRegistry};
use crate::compositor::{ElementFailure, FrameCompositor, Surface};
use crate::encode::{ContainerSettings, EncodedOutput, EncoderSink};
use crate::fonts::FontBook;
use crate::planner::plan_export;
use crate::prerender::prerender_dynamic_layers;
use crate::progress::{CancelHandle, ExportProgress, ExportState, ProgressEmitter};
use crate::raster::RasterSurface;
use crate::sources::{MediaProvider, NoMedia, OverlayLookup};
use crate::temp::{CleanupReport, TempWorkspace};

/// Per-phase element accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSummary {
    pub attempted: usize,
    pub successful: usize,
    /// At most one entry per element.
    pub failed: Vec<ElementFailure>,
}

impl PhaseSummary {
    /// Record a failure unless the element already has one. Returns whether
    /// it was recorded.
    pub fn record_failure(&mut self, failure: ElementFailure) -> bool {
        if self
            .failed
            .iter()
            .any(|existing| existing.element_id == failure.element_id)
        {
            return false;
        }
        self.failed.push(failure);
        true
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Why a run ended in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFailure {
    /// Phase that was running when the fault happened.
    pub phase: ExportState,
    pub message: String,
}

impl std::fmt::Display for ExportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.message)
    }
}

/// Counters for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub prerender: PhaseSummary,
    /// Aggregated per element across all frames.
    pub composite: PhaseSummary,
    pub total_frames: u64,
    pub frames_encoded: u64,
}

/// Final outcome of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    /// `true` only for `complete`, even with element failures.
    pub success: bool,
    pub state: ExportState,
    pub output: Option<EncodedOutput>,
    pub error: Option<ExportFailure>,
    pub summary: ExportSummary,
    pub cleanup: CleanupReport,
    pub elapsed_secs: f64,
}

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Dynamic layers pre-rendered in parallel.
    pub concurrency: usize,
    pub keep_temp_files: bool,
    pub temp_root: PathBuf,
    pub progress_step_percent: f64,
    pub remote_allow_list: Vec<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&ExportDefaults::default())
    }
}

impl From<&ExportDefaults> for PipelineOptions {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            concurrency: defaults.concurrency,
            keep_temp_files: defaults.keep_temp_files,
            temp_root: defaults.temp_root.clone(),
            progress_step_percent: defaults.progress_step_percent,
            remote_allow_list: defaults.remote_allow_list.clone(),
        }
    }
}

/// Builder for [`ExportPipeline`].
pub struct ExportPipelineBuilder {
    timeline: Timeline,
    settings: ExportSettings,
    media: Option<Arc<dyn MediaProvider>>,
    overlays: Option<Arc<dyn OverlayLookup>>,
    components: Option<Arc<dyn ComponentRegistry>>,
    sink: Option<Box<dyn EncoderSink>>,
    options: PipelineOptions,
    image_cache: Option<Arc<ImageCache>>,
    fonts: Option<Arc<FontBook>>,
    workspace: Option<TempWorkspace>,
    cancel: Option<CancelHandle>,
}

impl ExportPipelineBuilder {
    pub fn media_provider(mut self, media: Arc<dyn MediaProvider>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn overlay_lookup(mut self, overlays: Arc<dyn OverlayLookup>) -> Self {
        self.overlays = Some(overlays);
        self
    }

    /// Component registry. Defaults to the built-in components.
    pub fn components(mut self, components: Arc<dyn ComponentRegistry>) -> Self {
        self.components = Some(components);
        self
    }

    /// Where frames go. Required.
    pub fn sink(mut self, sink: Box<dyn EncoderSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Image cache. Defaults to [`ImageCache::global`].
    pub fn image_cache(mut self, cache: Arc<ImageCache>) -> Self {
        self.image_cache = Some(cache);
        self
    }

    /// Font faces for text layers. Defaults to [`FontBook::global`].
    pub fn fonts(mut self, fonts: Arc<FontBook>) -> Self {
        self.fonts = Some(fonts);
        self
    }

    /// Use an existing temp workspace instead of creating one under
    /// `options.temp_root`.
    pub fn workspace(mut self, workspace: TempWorkspace) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> QcutResult<ExportPipeline> {
        let sink = self
            .sink
            .ok_or_else(|| QcutError::config("export pipeline requires an encoder sink"))?;
        let workspace = self.workspace.unwrap_or_else(|| {
            TempWorkspace::new(&self.options.temp_root, self.options.keep_temp_files)
        });
        Ok(ExportPipeline {
            timeline: self.timeline,
            settings: self.settings,
            media: self.media.unwrap_or_else(|| Arc::new(NoMedia)),
            overlays: self.overlays.unwrap_or_else(|| Arc::new(NoMedia)),
            components: self
                .components
                .unwrap_or_else(|| Arc::new(StaticComponentRegistry::with_builtins())),
            sink,
            image_cache: self.image_cache.unwrap_or_else(ImageCache::global),
            fonts: self.fonts.unwrap_or_else(FontBook::global),
            workspace,
            cancel: self.cancel.unwrap_or_default(),
            options: self.options,
        })
    }
}

/// A configured export run.
pub struct ExportPipeline {
    timeline: Timeline,
    settings: ExportSettings,
    media: Arc<dyn MediaProvider>,
    overlays: Arc<dyn OverlayLookup>,
    components: Arc<dyn ComponentRegistry>,
    sink: Box<dyn EncoderSink>,
    options: PipelineOptions,
    image_cache: Arc<ImageCache>,
    fonts: Arc<FontBook>,
    workspace: TempWorkspace,
    cancel: CancelHandle,
}

/// Handle to a running export.
pub struct ExportHandle {
    pub progress: mpsc::UnboundedReceiver<ExportProgress>,
    pub cancel: CancelHandle,
    workspace: TempWorkspace,
    join: JoinHandle<ExportResult>,
}

impl ExportHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to end.
    pub async fn wait(self) -> ExportResult {
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Export task did not finish");
                ExportResult {
                    success: false,
                    state: ExportState::Error,
                    output: None,
                    error: Some(ExportFailure {
                        phase: ExportState::Error,
                        message: format!("export task failed: {e}"),
                    }),
                    summary: ExportSummary::default(),
                    cleanup: self.workspace.release(),
                    elapsed_secs: 0.0,
                }
            }
        }
    }

    /// Feed every progress event to `on_progress`, then wait for the result.
    pub async fn wait_with_progress<F>(mut self, mut on_progress: F) -> ExportResult
    where
        F: FnMut(&ExportProgress),
    {
        while let Some(event) = self.progress.recv().await {
            on_progress(&event);
        }
        self.wait().await
    }
}

enum RunOutcome {
    Finished(EncodedOutput),
    Cancelled,
}

impl ExportPipeline {
    /// Start configuring an export of a snapshot of `timeline`.
    pub fn builder(timeline: &Timeline, settings: ExportSettings) -> ExportPipelineBuilder {
        ExportPipelineBuilder {
            timeline: timeline.clone(),
            settings,
            media: None,
            overlays: None,
            components: None,
            sink: None,
            options: PipelineOptions::default(),
            image_cache: None,
            fonts: None,
            workspace: None,
            cancel: None,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn workspace(&self) -> &TempWorkspace {
        &self.workspace
    }

    /// Spawn the run on the current tokio runtime.
    pub fn start(self) -> ExportHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = self.cancel.clone();
        let workspace = self.workspace.clone();
        let join = tokio::spawn(self.execute(tx));
        ExportHandle {
            progress: rx,
            cancel,
            workspace,
            join,
        }
    }

    /// Run to completion on the calling task, discarding progress.
    pub async fn run(self) -> ExportResult {
        let (tx, _rx) = mpsc::unbounded_channel();
        self.execute(tx).await
    }

    async fn execute(mut self, tx: mpsc::UnboundedSender<ExportProgress>) -> ExportResult {
        let mut emitter = ProgressEmitter::new(tx, self.options.progress_step_percent);
        let mut summary = ExportSummary::default();
        let mut sink_started = false;

        tracing::info!(
            width = self.settings.width,
            height = self.settings.height,
            fps = self.settings.fps,
            format = %self.settings.format,
            "Starting export"
        );

        let outcome = self
            .run_phases(&mut emitter, &mut summary, &mut sink_started)
            .await;

        if !matches!(outcome, Ok(RunOutcome::Finished(_))) && sink_started {
            self.sink.abort().await;
        }

        emitter.enter(ExportState::Cleanup, "Cleaning up");
        let cleanup = self.workspace.release();

        let (state, output, error) = match outcome {
            Ok(RunOutcome::Finished(output)) => (ExportState::Complete, Some(output), None),
            Ok(RunOutcome::Cancelled) => (ExportState::Cancelled, None, None),
            Err(failure) => {
                tracing::error!(phase = %failure.phase, error = %failure.message, "Export failed");
                (ExportState::Error, None, Some(failure))
            }
        };
        let message = match state {
            ExportState::Complete => "Export complete".to_string(),
            ExportState::Cancelled => "Export cancelled".to_string(),
            _ => error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "Export failed".to_string()),
        };
        emitter.enter(state, message);

        tracing::info!(
            state = %state,
            frames = summary.frames_encoded,
            prerender_failed = summary.prerender.failed.len(),
            composite_failed = summary.composite.failed.len(),
            elapsed_secs = emitter.elapsed_secs(),
            "Export finished"
        );

        ExportResult {
            success: state == ExportState::Complete,
            state,
            output,
            error,
            summary,
            cleanup,
            elapsed_secs: emitter.elapsed_secs(),
        }
    }

    async fn run_phases(
        &mut self,
        emitter: &mut ProgressEmitter,
        summary: &mut ExportSummary,
        sink_started: &mut bool,
    ) -> Result<RunOutcome, ExportFailure> {
        // Analyzing
        emitter.enter(ExportState::Analyzing, "Analyzing timeline");
        check_timeline(&self.timeline).map_err(failed_in(ExportState::Analyzing))?;
        let plan = plan_export(&self.timeline, &self.settings)
            .map_err(failed_in(ExportState::Analyzing))?;
        emitter.set_total_frames(plan.total_frames);
        summary.total_frames = plan.total_frames;
        tracing::info!(
            frames = plan.total_frames,
            layers = plan.layers.len(),
            dynamic = plan.requires_dynamic_prerender,
            "Export planned"
        );
        if self.cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        // Prerendering
        let mut prerendered = HashMap::new();
        if plan.requires_dynamic_prerender {
            emitter.enter(ExportState::Prerendering, "Rendering dynamic overlays");
            self.workspace
                .dir()
                .map_err(failed_in(ExportState::Prerendering))?;

            let output = prerender_dynamic_layers(
                &plan,
                self.components.clone(),
                &self.workspace,
                self.options.concurrency.max(1),
                &self.cancel,
                |fraction, tick| {
                    emitter.advance(
                        fraction,
                        format!(
                            "Rendering {} ({}/{})",
                            tick.element_id, tick.frames_done, tick.frames_total
                        ),
                        Some(tick.element_id.as_str()),
                        None,
                    );
                },
            )
            .await;
            summary.prerender = output.summary;
            if let Some(fatal) = output.fatal {
                return Err(failed_in(ExportState::Prerendering)(fatal));
            }
            if output.cancelled {
                return Ok(RunOutcome::Cancelled);
            }
            prerendered = output.frames;
        } else {
            emitter.set_prerender_skipped(true);
        }

        // Compositing
        emitter.enter(ExportState::Compositing, "Compositing frames");
        let compositor = FrameCompositor::new(
            self.media.clone(),
            self.overlays.clone(),
            self.image_cache.clone(),
        )
        .with_allow_list(self.options.remote_allow_list.clone())
        .with_prerendered(prerendered);

        self.sink
            .begin(&ContainerSettings::from(&plan.settings))
            .await
            .map_err(failed_in(ExportState::Compositing))?;
        *sink_started = true;

        let fps = plan.settings.fps;
        let mut surface = RasterSurface::new(plan.settings.width, plan.settings.height)
            .with_fonts(self.fonts.clone());
        let mut seen: HashSet<ElementId> = HashSet::new();
        for frame in 0..plan.total_frames {
            if self.cancel.is_cancelled() {
                tracing::info!(frame, "Compositing stopped by cancellation");
                return Ok(RunOutcome::Cancelled);
            }

            surface.clear();
            let layers = plan.active_at(frame);
            let report = compositor
                .composite_frame(&mut surface, &layers, frame, fps)
                .await
                .map_err(failed_in(ExportState::Compositing))?;

            for layer in &layers {
                if seen.insert(layer.element.id.clone()) {
                    summary.composite.attempted += 1;
                }
            }
            for failure in report.failed {
                if summary.composite.record_failure(failure.clone()) {
                    tracing::warn!(element = %failure.element_id, frame, reason = %failure.reason, "Element failed to composite");
                }
            }
            summary.composite.successful = summary
                .composite
                .attempted
                .saturating_sub(summary.composite.failed.len());

            self.sink
                .accept_frame(frame, surface.image())
                .await
                .map_err(failed_in(ExportState::Compositing))?;
            summary.frames_encoded += 1;

            emitter.advance(
                (frame + 1) as f64 / plan.total_frames as f64,
                format!("Frame {}/{}", frame + 1, plan.total_frames),
                None,
                Some(frame + 1),
            );
        }

        // Encoding
        emitter.enter(ExportState::Encoding, "Finalizing output");
        if self.cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        let output = self
            .sink
            .finish()
            .await
            .map_err(failed_in(ExportState::Encoding))?;
        Ok(RunOutcome::Finished(output))
    }
}

/// Duplicate element ids would merge per-element accounting, so they
/// stop the run. Other consistency issues are logged and exported as is.
fn check_timeline(timeline: &Timeline) -> QcutResult<()> {
    let duplicates = timeline.duplicate_element_ids();
    if !duplicates.is_empty() {
        return Err(QcutError::timeline(format!(
            "duplicate element ids: {}",
            duplicates.join(", ")
        )));
    }
    for issue in timeline.validate() {
        tracing::warn!(issue = %issue, "Timeline consistency issue");
    }
    Ok(())
}

fn failed_in(phase: ExportState) -> impl FnOnce(QcutError) -> ExportFailure {
    move |e| ExportFailure {
        phase,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(id: &str) -> ElementFailure {
        ElementFailure {
            element_id: id.to_string(),
            reason: "missing".to_string(),
        }
    }

    #[test]
    fn test_record_failure_dedupes_by_element() {
        let mut summary = PhaseSummary::default();
        assert!(summary.record_failure(failure("a")));
        assert!(!summary.record_failure(failure("a")));
        assert!(summary.record_failure(failure("b")));
        assert_eq!(summary.failed.len(), 2);
        assert!(summary.has_failures());
    }

    #[test]
    fn test_options_from_defaults() {
        let defaults = ExportDefaults {
            concurrency: 2,
            ..ExportDefaults::default()
        };
        let options = PipelineOptions::from(&defaults);
        assert_eq!(options.concurrency, 2);
        assert_eq!(options.progress_step_percent, 1.0);
    }

    #[test]
    fn test_build_requires_sink() {
        let timeline = Timeline::new();
        let err = ExportPipeline::builder(&timeline, ExportSettings::default())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, QcutError::Config { .. }));
    }

    #[test]
    fn test_failure_display() {
        let failure = ExportFailure {
            phase: ExportState::Analyzing,
            message: "no content".to_string(),
        };
        assert_eq!(failure.to_string(), "analyzing failed: no content");
    }
}
