use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vidfit")]
#[command(author, version, about = "Compress video to fit under a hard size ceiling")]
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
    /// Convert a video so the output lands at or below the size ceiling
    Convert {
        /// Input file to convert
        #[arg(required = true)]
        input: PathBuf,

        /// Output file (defaults to the input name with a .fit suffix)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target ceiling in bytes (defaults to the configured 50 MB minus margin)
        #[arg(long)]
        target_bytes: Option<u64>,
    },

    /// Probe a media file and display duration and dimensions
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
