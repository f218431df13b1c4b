use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Self-healing health supervisor.
#[derive(Parser, Debug)]
#[command(name = "warden", version, about, long_about = None)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, env = "WARDEN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the supervisor until interrupted (default)
    Run,
    /// Run every probe once and print the resulting status as JSON
    Once {
        /// Print compact JSON on a single line
        #[arg(long)]
        compact: bool,
    },
    /// Validate the configuration and print the effective settings
    CheckConfig,
    /// Run every probe once and print the digest that would be sent
    Digest,
}
