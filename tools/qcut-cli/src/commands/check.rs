//! Check system capabilities.

use qcut_render_engine::encode::command_exists;
use qcut_render_engine::StaticComponentRegistry;

pub fn run() -> anyhow::Result<()> {
    println!("QCut System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg = command_exists("ffmpeg");
    if ffmpeg {
        println!("[OK] ffmpeg found on PATH");
    } else {
        println!("[MISSING] ffmpeg not found on PATH (required for export)");
    }

    let config = qcut_common::config::AppConfig::load();
    println!(
        "[OK] Temp root: {} (concurrency {})",
        config.export.temp_root.display(),
        config.export.concurrency
    );

    let registry = StaticComponentRegistry::with_builtins();
    println!("[OK] Built-in components: {}", registry.ids().join(", "));

    println!();
    if ffmpeg {
        println!("All required capabilities are available. QCut is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
