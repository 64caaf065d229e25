//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dockloop")]
#[command(about = "dockloop - iterative docking pipeline for drug repurposing", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Extra YAML config file, applied after .dockloop/ and before DOCKLOOP_* variables
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start a fresh run for a disease or research subject
    Run {
        /// Subject to investigate, e.g. "pancreatic cancer"
        subject: String,

        /// Maximum expansion rounds after the initial docking pass
        #[arg(long)]
        max_rounds: Option<u32>,
    },

    /// Continue the persisted run from its last checkpoint
    Resume,

    /// Show the persisted run's progress
    Status {
        /// Number of top hits to list
        #[arg(short, long, default_value = "10")]
        top: usize,
    },
}
