//! Validate a timeline document.

use std::path::PathBuf;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating timeline at: {}", path.display());

    let document = super::load_document(&path)?;
    println!("  Tracks: {}", document.timeline.tracks.len());
    println!("  Elements: {}", document.timeline.element_count());
    println!("  Duration: {:.2}s", document.timeline.total_duration());

    let issues = document.timeline.validate();
    if issues.is_empty() {
        println!("\nTimeline is valid.");
    } else {
        println!("\nValidation issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
        println!(
            "\n{} issue(s) found. Export may not match what the editor shows.",
            issues.len()
        );
    }

    Ok(())
}
