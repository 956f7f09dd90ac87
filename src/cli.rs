use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "segtrim")]
#[command(author, version, about = "Cut several time ranges out of a video without re-encoding")]
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
    /// Extract segments from a video as separate files
    Extract {
        /// Source video
        #[arg(required = true)]
        input: PathBuf,

        /// Segment range as START-END (seconds or [HH:]MM:SS), repeatable
        #[arg(short, long = "segment", required = true)]
        segments: Vec<String>,

        /// Directory to write segment files to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Source duration in seconds (probed with ffprobe if omitted)
        #[arg(long)]
        duration: Option<f64>,

        /// Replace existing output files
        #[arg(long)]
        overwrite: bool,

        /// Keep extracting after a segment fails
        #[arg(long)]
        keep_going: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe a video and display its duration
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

    /// Display version information
    Version,
}
