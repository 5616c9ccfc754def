//! CLI definitions for press-console.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "press-console",
    version,
    about = "Bench CLI for press operator console sessions",
    after_help = "Examples:\n  press-console check-config --config ./console.toml\n  press-console connect --config ./console.toml --hold-ms 2000\n  press-console write MES_COMM true"
)]
pub struct Cli {
    /// Console configuration file.
    #[arg(long, short, global = true, default_value = "console.toml")]
    pub config: PathBuf,
    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Attach the bridge and run the MES handshake.
    Connect {
        /// Keep listening to pushes for this long before printing values.
        #[arg(long, default_value = "0")]
        hold_ms: u64,
    },
    /// List configured signals by polling group.
    Signals,
    /// Read one signal.
    Read {
        /// Signal code.
        code: String,
    },
    /// Write one signal. `true`/`false` and numbers are sent as such, anything
    /// else as text.
    Write {
        /// Signal code.
        code: String,
        /// Value to write.
        value: String,
    },
    /// Validate the configuration file and print a summary.
    CheckConfig,
}
