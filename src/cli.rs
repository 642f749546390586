//! Command-line interface for outcall
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Outbound sales-call assistant
#[derive(Parser, Debug)]
#[command(name = "outcall", version, about = "Outbound sales-call assistant")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to the lead store (default: XDG data dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import leads from a document into the lead store
    Import {
        /// Document holding the lead list (JSON array of records)
        file: PathBuf,
    },

    /// List leads in the store
    Leads,

    /// Run a simulated call to a lead
    Call {
        /// Lead to call, by exact name or id prefix
        lead: String,

        /// JSON script of agent-side messages to replay
        #[arg(long, value_name = "PATH")]
        script: PathBuf,

        /// WAV file standing in for the microphone (default: live capture)
        #[arg(long, value_name = "PATH")]
        wav: Option<PathBuf>,

        /// Audio input device for live capture
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Discard agent audio instead of playing it
        #[arg(long)]
        no_playback: bool,
    },

    /// Print the call report
    Report,

    /// List available audio input devices
    Devices,

    /// Inspect configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Print the effective configuration
    Show,
}

/// Default location of the lead store.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .expect("Could not determine data directory")
        .join("outcall")
        .join("leads.json")
}
