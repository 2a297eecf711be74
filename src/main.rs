// SPDX-License-Identifier: GPL-3.0-only

use camera_pipeline::constants::BitratePreset;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-pipeline")]
#[command(about = "Record, encode and mux audio and video")]
#[command(version)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Quality {
    Low,
    Medium,
    High,
}

impl From<Quality> for BitratePreset {
    fn from(quality: Quality) -> Self {
        match quality {
            Quality::Low => BitratePreset::Low,
            Quality::Medium => BitratePreset::Medium,
            Quality::High => BitratePreset::High,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List audio devices
    Devices {
        /// Keep running and print device changes
        #[arg(short, long)]
        monitor: bool,
    },

    /// Record a test pattern through the encoders and muxer
    Record {
        /// Output directory (default: from the configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Recording duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,

        #[arg(long, default_value = "640")]
        width: u32,

        #[arg(long, default_value = "480")]
        height: u32,

        #[arg(long, default_value = "30")]
        fps: u32,

        /// Record a test tone as well
        #[arg(short, long)]
        audio: bool,

        /// Bitrate preset (default: from the configuration)
        #[arg(short, long, value_enum)]
        quality: Option<Quality>,
    },

    /// Print the tracks and layout of a WebM file
    Inspect {
        file: PathBuf,
    },

    /// Print the AAC AudioSpecificConfig for a stream
    AacConfig {
        #[arg(short, long, default_value = "44100")]
        rate: u32,

        #[arg(short, long, default_value = "2")]
        channels: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_pipeline=debug, RUST_LOG=info
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    match cli.command {
        Commands::Devices { monitor } => cli::list_devices(monitor),
        Commands::Record {
            output,
            duration,
            width,
            height,
            fps,
            audio,
            quality,
        } => cli::record(cli::RecordOptions {
            output,
            duration,
            width,
            height,
            fps,
            audio,
            quality: quality.map(BitratePreset::from),
        }),
        Commands::Inspect { file } => cli::inspect(&file),
        Commands::AacConfig { rate, channels } => cli::aac_config(rate, channels),
    }
}
