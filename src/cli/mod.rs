//! CLI entry point for weft.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// weft: replay, repair and project conversation logs
#[derive(Parser, Debug)]
#[command(name = "weft", version, about = "Streaming tool-call orchestrator tools")]
pub struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.weft/weft.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one request against a scripted model
    Replay(ReplayArgs),
    /// Repair tool call pairing in a saved history
    Repair(RepairArgs),
    /// Rebuild a history from a recorded wire log
    Project(ProjectArgs),
}

/// Arguments for `weft replay`.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// JSON array of script steps, one per model round trip
    pub script: PathBuf,

    /// History to start from (JSON array of messages)
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// User input for the request
    #[arg(short, long, default_value = "go")]
    pub input: String,

    /// Write every wire envelope to this file as JSON lines
    #[arg(long)]
    pub wire: Option<PathBuf>,
}

/// Arguments for `weft repair`.
#[derive(Parser, Debug)]
pub struct RepairArgs {
    /// History file (JSON array of messages)
    pub history: PathBuf,
}

/// Arguments for `weft project`.
#[derive(Parser, Debug)]
pub struct ProjectArgs {
    /// Wire log (one JSON envelope per line)
    pub wire: PathBuf,

    /// History the client held before the log started
    #[arg(long)]
    pub history: Option<PathBuf>,
}
