//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storyline::Phase;

/// Storyline - turn-based role-play with persistent story variables
#[derive(Parser, Debug)]
#[command(name = "storyline")]
#[command(about = "Turn-based role-play with persistent story variables", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file layered over the bundled defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the opening record of a new conversation
    Init {
        /// Opening narrative (defaults to `paths.opening`)
        #[arg(long)]
        opening: Option<PathBuf>,
    },

    /// Run one turn with replies read from a script
    Say {
        /// The player's input
        text: String,

        /// JSON file with `judge` and `narrator` reply arrays
        #[arg(long)]
        replies: PathBuf,

        /// Show the unfiltered narrative stream
        #[arg(long)]
        raw: bool,
    },

    /// Show the current variable values and stages
    State,

    /// Delete the newest records and restore the state they leave
    Undo {
        /// Number of records to delete
        #[arg(long, default_value = "2")]
        count: usize,
    },

    /// Recompute keyword rules for a text without committing
    Recalc {
        /// Text to evaluate
        text: String,

        /// Phase whose variables are recomputed
        #[arg(long, default_value = "pre")]
        phase: Phase,
    },

    /// Print the history summary the narrator would see
    History {
        /// Layers rendered in full (defaults to `memory_depth`)
        #[arg(long)]
        depth: Option<u32>,
    },
}
