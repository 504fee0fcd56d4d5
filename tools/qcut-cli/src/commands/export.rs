//! Export a timeline to video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use qcut_common::config::ExportDefaults;
use qcut_render_engine::{
    ExportPipeline, ExportProgress, FfmpegSink, FontBook, ImageCache, PipelineOptions,
};

use super::library::ImageDirectory;
use crate::SettingsArgs;

pub async fn run(
    path: PathBuf,
    output: Option<PathBuf>,
    media_dir: Option<PathBuf>,
    args: SettingsArgs,
    defaults: ExportDefaults,
    json: bool,
) -> anyhow::Result<()> {
    println!("Exporting timeline at: {}", path.display());

    let document = super::load_document(&path)?;
    let settings = super::resolve_settings(&document, &args)?;

    let duplicates = document.timeline.duplicate_element_ids();
    if !duplicates.is_empty() {
        return Err(anyhow::anyhow!(
            "Timeline has duplicate element ids: {}. Run `qcut validate` for details.",
            duplicates.join(", ")
        ));
    }
    for issue in document.timeline.validate() {
        println!("  warning: {issue}");
    }

    let output_path = output.unwrap_or_else(|| {
        path.with_file_name(format!("output.{}", settings.format.extension()))
    });
    let media_dir = media_dir.unwrap_or_else(|| {
        path.parent()
            .map(|p| p.join("media"))
            .unwrap_or_else(|| PathBuf::from("media"))
    });

    let sink = FfmpegSink::new(&output_path);
    if !sink.is_available() {
        return Err(anyhow::anyhow!(
            "ffmpeg not found on PATH. Install it and run `qcut check`."
        ));
    }

    println!("  Output: {}", output_path.display());
    println!("  Media: {}", media_dir.display());
    println!("  Format: {} ({:?})", settings.format, settings.quality);
    println!(
        "  Resolution: {}x{} @ {}fps",
        settings.width, settings.height, settings.fps
    );

    let library = Arc::new(ImageDirectory::new(media_dir));
    let cache = Arc::new(ImageCache::new(defaults.image_cache_capacity));
    let fonts = Arc::new(FontBook::with_dirs(&defaults.font_dirs));
    let pipeline = ExportPipeline::builder(&document.timeline, settings)
        .media_provider(library.clone())
        .overlay_lookup(library)
        .sink(Box::new(sink))
        .options(PipelineOptions::from(&defaults))
        .image_cache(cache)
        .fonts(fonts)
        .build()?;

    let handle = pipeline.start();
    let cancel = handle.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling export...");
            cancel.cancel();
        }
    });

    let result = handle
        .wait_with_progress(|p: &ExportProgress| {
            print!(
                "\r  [{:<12}] {:5.1}% {}{}  ",
                p.phase.as_str(),
                p.overall_progress,
                p.status_message,
                p.estimated_time_remaining
                    .map(|eta| format!(" (ETA {eta:.0}s)"))
                    .unwrap_or_default()
            );
            std::io::stdout().flush().ok();
        })
        .await;
    println!();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    for failure in result
        .summary
        .prerender
        .failed
        .iter()
        .chain(&result.summary.composite.failed)
    {
        println!("  Skipped {}: {}", failure.element_id, failure.reason);
    }

    match (&result.error, result.success) {
        (_, true) => {
            println!(
                "Export complete: {} ({} frames in {:.1}s)",
                output_path.display(),
                result.summary.frames_encoded,
                result.elapsed_secs
            );
            Ok(())
        }
        (Some(failure), false) => Err(anyhow::anyhow!("Export failed: {failure}")),
        (None, false) => {
            println!("Export {}", result.state);
            Ok(())
        }
    }
}
