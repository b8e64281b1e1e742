//! CLI argument parsing for kf

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(name = "kf")]
#[command(author, version, about = "Keyed async fetch coordination demos", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a demonstration scenario (all of them if none is given)
    Demo {
        /// Scenario to run
        #[arg(value_enum)]
        scenario: Option<Scenario>,

        /// Simulated producer latency in milliseconds (default: from config)
        #[arg(short, long)]
        delay_ms: Option<u64>,

        /// Consumers sharing the key (default: from config)
        #[arg(short = 'n', long)]
        consumers: Option<usize>,

        /// Cache key for keyed scenarios (default: from config)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// List available scenarios
    Scenarios,

    /// Print the effective configuration
    Config,
}
