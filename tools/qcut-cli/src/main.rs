//! QCut CLI: inspect, validate, plan, and export timeline documents.
//!
//! Usage:
//!   qcut info <PATH>        Show timeline information
//!   qcut validate <PATH>    Check a timeline for consistency issues
//!   qcut plan <PATH>        Show the render plan for a timeline
//!   qcut export <PATH>      Render a timeline to a video file
//!   qcut check              Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "qcut",
    about = "Timeline editing and export engine",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the document's export settings.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Output width
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height
    #[arg(long)]
    pub height: Option<u32>,

    /// Output frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Output format: mp4-h264|mp4-h265|webm|gif
    #[arg(long)]
    pub format: Option<String>,

    /// Quality preset: low|medium|high
    #[arg(long)]
    pub quality: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show timeline information
    Info {
        /// Path to the timeline JSON document
        path: PathBuf,
    },

    /// Check a timeline for consistency issues
    Validate {
        /// Path to the timeline JSON document
        path: PathBuf,
    },

    /// Show which layers draw on which frames
    Plan {
        /// Path to the timeline JSON document
        path: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Render a timeline to a video file
    Export {
        /// Path to the timeline JSON document
        path: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory holding media and sticker images named `<id>.png` or `<id>.jpg`
        #[arg(short, long)]
        media_dir: Option<PathBuf>,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Dynamic overlays pre-rendered in parallel
        #[arg(long)]
        concurrency: Option<usize>,

        /// Keep intermediate frame files
        #[arg(long)]
        keep_temp: bool,

        /// Print the final result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = qcut_common::config::AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    qcut_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Info { path } => commands::info::run(path),
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Plan { path, settings } => commands::plan::run(path, settings),
        Commands::Export {
            path,
            output,
            media_dir,
            settings,
            concurrency,
            keep_temp,
            json,
        } => {
            let mut defaults = config.export;
            if let Some(concurrency) = concurrency {
                defaults.concurrency = concurrency;
            }
            defaults.keep_temp_files |= keep_temp;
            commands::export::run(path, output, media_dir, settings, defaults, json).await
        }
        Commands::Check => commands::check::run(),
    }
}
