//! Print the render plan for a timeline.

use std::path::PathBuf;

use qcut_render_engine::{plan_export, LayerBand};

use crate::SettingsArgs;

pub fn run(path: PathBuf, args: SettingsArgs) -> anyhow::Result<()> {
    let document = super::load_document(&path)?;
    let settings = super::resolve_settings(&document, &args)?;
    let plan = plan_export(&document.timeline, &settings)
        .map_err(|e| anyhow::anyhow!("Planning failed: {e}"))?;

    println!(
        "Plan: {:.2}s, {} frames at {}fps, {}x{}",
        plan.total_duration, plan.total_frames, settings.fps, settings.width, settings.height
    );
    println!(
        "  Dynamic pre-render: {}",
        if plan.requires_dynamic_prerender {
            format!(
                "{} layer(s), {} frame(s)",
                plan.dynamic_layers().count(),
                plan.dynamic_frame_total()
            )
        } else {
            "not needed".to_string()
        }
    );
    println!();

    println!("Layers (back to front):");
    for layer in &plan.layers {
        let band = match layer.key.band {
            LayerBand::TrackContent => "track",
            LayerBand::Sticker => "sticker",
        };
        println!(
            "  {:<18} {:<10} frames {:>6}..{:<6} {} z={}{}",
            layer.element.kind.type_name(),
            layer.element.id,
            layer.active_frames.start,
            layer.active_frames.end,
            band,
            layer.key.z,
            if layer.dynamic { " (dynamic)" } else { "" }
        );
    }

    Ok(())
}
