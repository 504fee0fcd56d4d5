//! Show timeline information.

use std::path::PathBuf;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let document = super::load_document(&path)?;
    let timeline = &document.timeline;
    let settings = &document.settings;

    println!("Timeline: {}", path.display());
    println!("  Duration: {:.2}s", timeline.total_duration());
    println!("  Tracks: {}", timeline.tracks.len());
    println!("  Elements: {}", timeline.element_count());
    println!();

    println!("Tracks:");
    for (index, track) in timeline.tracks.iter().enumerate() {
        let mut flags = Vec::new();
        if track.is_main {
            flags.push("main");
        }
        if track.muted {
            flags.push("muted");
        }
        println!(
            "  [{index}] {} ({}, {} elements, ends {:.2}s){}",
            if track.name.is_empty() { &track.id } else { &track.name },
            track.kind.as_str(),
            track.elements.len(),
            track.end_time(),
            if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            }
        );
        for element in track.sorted_elements() {
            println!(
                "      {} {} @ {:.2}s for {:.2}s (trim {:.2}/{:.2})",
                element.kind.type_name(),
                element.id,
                element.start_time,
                element.effective_duration(),
                element.trim_start,
                element.trim_end
            );
        }
    }
    println!();

    println!("Export settings:");
    println!("  Format: {}", settings.format);
    println!("  Quality: {:?}", settings.quality);
    println!(
        "  Output: {}x{} @ {}fps",
        settings.width, settings.height, settings.fps
    );

    Ok(())
}
