//! CLI interface for dispersion-monitor
//!
//! Provides subcommands for:
//! - `run`: Start the monitor loop
//! - `constituents`: Print the instrument table
//! - `config`: Show effective configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dispersion-monitor")]
#[command(about = "BankNifty dispersion trade monitor: index straddle vs constituent straddles")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the monitor loop
    Run(RunArgs),
    /// Print the instrument table
    Constituents,
    /// Show effective configuration
    Config,
}
