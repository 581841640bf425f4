//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::StreamKey;

/// eb - progress supervisor for ECU diagnostic dongles
#[derive(Parser)]
#[command(
    name = "eb",
    about = "Progress supervisor for ECU diagnostic and flashing dongles",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/ecubridge/logs/ecubridge.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// List the progress streams and their groups
    Catalog,

    /// Print the effective configuration
    Config,

    /// Run one stream against the scripted engine and print its events
    Simulate {
        /// Stream to subscribe to (e.g. updateFlash, eeDump, actuator)
        stream: StreamKey,

        /// Hang after this many samples so the watchdog fires
        #[arg(long)]
        stall_after: Option<usize>,

        /// Samples the script emits before completing
        #[arg(long)]
        samples: Option<usize>,

        /// Spacing of scripted samples in milliseconds
        #[arg(long)]
        period_ms: Option<u64>,

        /// Frame time of the simulated ECU record
        #[arg(long)]
        ecu_frame_ms: Option<i32>,

        /// Flashing timeout of the simulated ECU record
        #[arg(long)]
        ecu_timeout_ms: Option<i64>,

        /// Enable the per-frame bonus on the simulated ECU record
        #[arg(long)]
        per_frame: bool,
    },
}
