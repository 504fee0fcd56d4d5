//! Pre-render phase: renders every dynamic layer's active frames to PNG
//! files in the temp workspace, several layers at a time.
//!
//! Each layer is one task on a [`JoinSet`], gated by a semaphore. Tasks
//! check the cancel flag before every frame; a cancelled task stops after
//! its current frame. Element-level errors fail only their layer; any
//! other error aborts the remaining tasks and is returned as `fatal`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use qcut_common::error::{QcutError, QcutResult};
use qcut_timeline::timing::{frame_to_time, time_to_frame};
use qcut_timeline::{ElementId, ElementKind};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::components::{merge_props, ComponentRegistry, DynamicComponent};
use crate::compositor::ElementFailure;
use crate::pipeline::PhaseSummary;
use crate::planner::{PlannedLayer, RenderPlan};
use crate::progress::CancelHandle;
use crate::temp::TempWorkspace;

/// Frames of one dynamic layer on disk, indexed by output frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrerenderedFrames {
    pub element_id: ElementId,
    /// Output frame of `paths[0]`.
    pub first_frame: u64,
    pub paths: Vec<PathBuf>,
}

impl PrerenderedFrames {
    pub fn path_for(&self, frame: u64) -> Option<&Path> {
        let offset = frame.checked_sub(self.first_frame)?;
        self.paths.get(offset as usize).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Per-frame notification from a running task.
#[derive(Debug, Clone)]
pub struct PrerenderTick {
    pub element_id: ElementId,
    pub frames_done: u64,
    pub frames_total: u64,
}

/// Result of the pre-render phase.
#[derive(Debug, Default)]
pub struct PrerenderOutput {
    pub frames: HashMap<ElementId, PrerenderedFrames>,
    pub summary: PhaseSummary,
    pub cancelled: bool,
    /// Error that ends the run.
    pub fatal: Option<QcutError>,
}

enum TaskOutcome {
    Rendered(PrerenderedFrames),
    Failed(ElementFailure),
    Cancelled(ElementId),
    Fatal(ElementId, QcutError),
}

/// Pre-render all dynamic layers of `plan`.
///
/// `on_tick` runs on the calling task once per rendered frame, with the
/// overall fraction of dynamic frames done.
pub async fn prerender_dynamic_layers<F>(
    plan: &RenderPlan,
    registry: Arc<dyn ComponentRegistry>,
    workspace: &TempWorkspace,
    concurrency: usize,
    cancel: &CancelHandle,
    mut on_tick: F,
) -> PrerenderOutput
where
    F: FnMut(f64, &PrerenderTick),
{
    let mut output = PrerenderOutput::default();
    let total_frames = plan.dynamic_frame_total().max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel::<PrerenderTick>();
    let mut tasks = JoinSet::new();
    let mut pending: HashSet<ElementId> = HashSet::new();

    for layer in plan.dynamic_layers() {
        output.summary.attempted += 1;
        let ElementKind::OverlayComponent(payload) = &layer.element.kind else {
            continue;
        };
        let Some(component) = registry.get(&payload.component_id) else {
            tracing::warn!(element = %layer.element.id, component = %payload.component_id, "Unknown component");
            output.summary.record_failure(ElementFailure {
                element_id: layer.element.id.clone(),
                reason: format!("component '{}' is not registered", payload.component_id),
            });
            continue;
        };

        pending.insert(layer.element.id.clone());
        let props = merge_props(&component.meta().default_props, &payload.props);
        let job = RenderJob {
            layer: layer.clone(),
            component,
            props,
            fps: plan.settings.fps,
            workspace: workspace.clone(),
            cancel: cancel.clone(),
            ticks: tick_tx.clone(),
        };
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return TaskOutcome::Cancelled(job.layer.element.id.clone());
            };
            job.run().await
        });
    }
    drop(tick_tx);

    tracing::info!(
        layers = pending.len(),
        frames = plan.dynamic_frame_total(),
        concurrency,
        "Pre-rendering dynamic layers"
    );

    let mut frames_done = 0u64;
    let mut ticks_open = true;
    loop {
        tokio::select! {
            tick = tick_rx.recv(), if ticks_open => match tick {
                Some(tick) => {
                    frames_done += 1;
                    on_tick(frames_done as f64 / total_frames as f64, &tick);
                }
                None => ticks_open = false,
            },
            joined = tasks.join_next() => match joined {
                Some(Ok(outcome)) => match outcome {
                    TaskOutcome::Rendered(frames) => {
                        pending.remove(&frames.element_id);
                        output.summary.successful += 1;
                        output.frames.insert(frames.element_id.clone(), frames);
                    }
                    TaskOutcome::Failed(failure) => {
                        pending.remove(&failure.element_id);
                        output.summary.record_failure(failure);
                    }
                    TaskOutcome::Cancelled(element_id) => {
                        pending.remove(&element_id);
                        output.cancelled = true;
                    }
                    TaskOutcome::Fatal(element_id, error) => {
                        pending.remove(&element_id);
                        tracing::error!(element = %element_id, error = %error, "Pre-render fault");
                        if output.fatal.is_none() {
                            output.fatal = Some(error);
                            tasks.abort_all();
                        }
                    }
                },
                Some(Err(e)) if e.is_cancelled() => {
                    tracing::debug!("Pre-render task aborted after a fault");
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Pre-render task aborted");
                }
                None => break,
            },
        }
    }

    // Drain ticks sent just before the last task finished.
    while let Ok(tick) = tick_rx.try_recv() {
        frames_done += 1;
        on_tick(frames_done as f64 / total_frames as f64, &tick);
    }

    for element_id in pending {
        output.summary.record_failure(ElementFailure {
            element_id,
            reason: "pre-render task aborted".to_string(),
        });
    }
    if cancel.is_cancelled() {
        output.cancelled = true;
    }
    output
}

struct RenderJob {
    layer: PlannedLayer,
    component: Arc<dyn DynamicComponent>,
    props: serde_json::Value,
    fps: u32,
    workspace: TempWorkspace,
    cancel: CancelHandle,
    ticks: mpsc::UnboundedSender<PrerenderTick>,
}

impl RenderJob {
    async fn run(self) -> TaskOutcome {
        let element_id = self.layer.element.id.clone();
        match self.render_all().await {
            Ok(frames) => TaskOutcome::Rendered(frames),
            Err(QcutError::Cancelled) => TaskOutcome::Cancelled(element_id),
            Err(e) if !e.is_element_level() => TaskOutcome::Fatal(element_id, e),
            Err(e) => {
                tracing::warn!(element = %element_id, error = %e, "Pre-render failed");
                TaskOutcome::Failed(ElementFailure {
                    element_id,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn render_all(&self) -> QcutResult<PrerenderedFrames> {
        let meta = self.component.meta();
        let element = &self.layer.element;
        let first_frame = self.layer.active_frames.start;
        let frames_total = self.layer.frame_count();
        let mut paths = Vec::with_capacity(frames_total as usize);

        for (offset, frame) in self.layer.active_frames.clone().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::debug!(element = %element.id, frame, "Pre-render stopped by cancellation");
                return Err(QcutError::Cancelled);
            }

            let local_time = element.source_time_at(frame_to_time(frame, self.fps));
            let mut component_frame = time_to_frame(local_time, meta.fps.max(1));
            if meta.duration_in_frames > 0 {
                component_frame = component_frame.min(meta.duration_in_frames - 1);
            }

            let image = self.component.render_frame(component_frame, &self.props).await?;
            let path = self.workspace.allocate(format!(
                "prerender/layer-{:04}/frame-{offset:06}.png",
                self.layer.key.seq
            ))?;
            write_png(image, path.clone()).await?;
            paths.push(path);

            let _ = self.ticks.send(PrerenderTick {
                element_id: element.id.clone(),
                frames_done: offset as u64 + 1,
                frames_total,
            });
        }

        Ok(PrerenderedFrames {
            element_id: element.id.clone(),
            first_frame,
            paths,
        })
    }
}

async fn write_png(image: RgbaImage, path: PathBuf) -> QcutResult<()> {
    tokio::task::spawn_blocking(move || image.save_with_format(&path, image::ImageFormat::Png))
        .await
        .map_err(|e| QcutError::render(format!("frame write task failed: {e}")))?
        .map_err(|e| QcutError::render(format!("failed to write frame: {e}")))
}
