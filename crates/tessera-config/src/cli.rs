//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Sector streaming command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "tessera", about = "Hierarchical CAD sector streaming")]
pub struct CliArgs {
    /// Budget for streamed sectors, in bytes.
    #[arg(long)]
    pub max_cost: Option<f64>,

    /// Distance within which sectors are always loaded Detailed.
    #[arg(long)]
    pub proximity: Option<f32>,

    /// Load worker threads (0 = auto).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Frames of the demo flight.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Subdivision depth of the demo models.
    #[arg(long)]
    pub depth: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(cost) = args.max_cost {
            self.streaming.max_cost_bytes = cost;
        }
        if let Some(distance) = args.proximity {
            self.streaming.high_detail_proximity_threshold = distance;
        }
        if let Some(workers) = args.workers {
            self.loader.worker_threads = workers;
        }
        if let Some(frames) = args.frames {
            self.demo.frames = frames;
        }
        if let Some(depth) = args.depth {
            self.demo.tree_depth = depth;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
