use autovhs::config::{Encoder, ProgressStyle};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autovhs")]
#[command(author, version, about = "Deinterlace and restore captured tapes with VapourSynth and ffmpeg")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Restore video files (scans ./input when none are given)
    Run {
        /// Video files or directories to process
        inputs: Vec<PathBuf>,

        /// Output encoder, overriding the config file
        #[arg(short, long, value_enum)]
        encoder: Option<Encoder>,

        /// Progress display, overriding the config file
        #[arg(long, value_enum)]
        progress: Option<ProgressStyle>,
    },

    /// Show the durations, frame rate and start times of a media file
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },
}
