//! Clearmark CLI: command-line interface for watermark tracking and removal.
//!
//! Usage:
//!   clearmark sample --duration <SECS>          Print sample timestamps
//!   clearmark plan <DETECTIONS>                 Print removal plans as JSON
//!   clearmark filter <DETECTIONS>               Print the ffmpeg filter graph
//!   clearmark apply <INPUT> <DETECTIONS> -o OUT  Remove watermarks with ffmpeg

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use clearmark_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "clearmark",
    about = "Track moving watermarks across a video and remove them",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Pipeline configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Video facts needed to plan from recorded detections.
#[derive(Args, Debug, Clone)]
pub struct VideoArgs {
    /// Frame width in pixels
    #[arg(long)]
    width: u32,

    /// Frame height in pixels
    #[arg(long)]
    height: u32,

    /// Video duration in seconds
    #[arg(long)]
    duration: f64,

    /// Number of samples the detections were recorded at (default: derived from interval)
    #[arg(long)]
    samples: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the sample timestamps for a video duration
    Sample {
        /// Video duration in seconds
        #[arg(long)]
        duration: f64,

        /// Exact number of samples
        #[arg(long, conflicts_with = "interval")]
        count: Option<usize>,

        /// Target sampling interval in seconds
        #[arg(long)]
        interval: Option<f64>,
    },

    /// Build removal plans from recorded detections
    Plan {
        /// Recorded detections (JSONL)
        detections: PathBuf,

        #[command(flatten)]
        video: VideoArgs,
    },

    /// Print the ffmpeg filter graph for recorded detections
    Filter {
        /// Recorded detections (JSONL)
        detections: PathBuf,

        #[command(flatten)]
        video: VideoArgs,
    },

    /// Remove watermarks from a video using recorded detections
    Apply {
        /// Input video
        input: PathBuf,

        /// Recorded detections (JSONL)
        detections: PathBuf,

        /// Output video
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = AppConfig::load();

    // Initialize logging
    let mut logging = app_config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    clearmark_common::logging::init_logging(&logging);

    let pipeline = commands::load_pipeline_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Sample {
            duration,
            count,
            interval,
        } => commands::sample::run(pipeline, duration, count, interval),
        Commands::Plan { detections, video } => commands::plan::run(pipeline, detections, video),
        Commands::Filter { detections, video } => {
            commands::filter::run(pipeline, detections, video)
        }
        Commands::Apply {
            input,
            detections,
            output,
        } => commands::apply::run(pipeline, &app_config, input, detections, output).await,
    }
}
