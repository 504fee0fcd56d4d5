//! QCut Render Engine
//!
//! Turns a timeline snapshot into a video file. Planning decides which
//! element draws on which frame; dynamic overlay components are rendered
//! to PNG frames ahead of time; every output frame is then composited on
//! a raster surface and streamed to an encoder sink.
//!
//! # Pipeline Architecture
//!
//! ```text
//! timeline ──► plan_export ──► RenderPlan
//!                                  │
//!                                  ├── dynamic layers ──► prerender (N tasks) ──► temp PNGs
//!                                  │                                                 │
//!                                  ▼                                                 │
//!              media / stickers ──► FrameCompositor ◄────────────────────────────────┘
//!                                  │  (frame 0..total, back to front)
//!                                  ▼
//!                             EncoderSink (ffmpeg)
//!                                  │
//!                                  ▼
//!                              output.mp4
//! ```

pub mod cache;
pub mod components;
pub mod compositor;
pub mod encode;
pub mod fonts;
pub mod pipeline;
pub mod planner;
pub mod prerender;
pub mod progress;
pub mod raster;
pub mod sources;
pub mod temp;

pub use cache::ImageCache;
pub use components::{
    ComponentMeta, ComponentRegistry, DynamicComponent, StaticComponentRegistry,
};
pub use compositor::{CompositeReport, ElementFailure, FrameCompositor, Surface};
pub use encode::{ContainerSettings, EncodedOutput, EncoderSink, FfmpegSink};
pub use fonts::FontBook;
pub use pipeline::{
    ExportFailure, ExportHandle, ExportPipeline, ExportPipelineBuilder, ExportResult,
    ExportSummary, PhaseSummary, PipelineOptions,
};
pub use planner::{plan_export, LayerBand, LayerKey, PlannedLayer, RenderPlan};
pub use progress::{CancelHandle, ExportProgress, ExportState};
pub use raster::RasterSurface;
pub use sources::{MediaInfo, MediaProvider, MediaSource, OverlayLookup, PlayableSource};
pub use temp::{CleanupReport, TempWorkspace};
