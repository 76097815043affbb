//! Command-line interface for voxflow
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Streaming voice transcription for the terminal
#[derive(Parser, Debug)]
#[command(name = "voxflow", version, about = "Streaming voice transcription")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Language code for transcription (e.g. en, de, ja)
    #[arg(long, global = true, value_name = "LANG")]
    pub language: Option<String>,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Push-to-talk capture: hold the configured key to record
    Listen,
    /// Continuous VAD-gated capture with streaming partial results
    Stream,
    /// List usable audio input devices
    Devices,
}
