//! Command-line surface: where to find the configuration file, and how
//! verbosely to log.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::telemetry::ConsoleLogging;

#[derive(Debug, Parser)]
#[command(name = "gqiam-gateway", about = "GraphQL authorizing reverse proxy")]
pub struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Overrides `port` from the configuration file when set.
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long, value_enum, default_value = "pretty")]
    pub console_logging: ConsoleLoggingArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConsoleLoggingArg {
    Off,
    Pretty,
    Json,
}

impl From<ConsoleLoggingArg> for ConsoleLogging {
    fn from(value: ConsoleLoggingArg) -> Self {
        match value {
            ConsoleLoggingArg::Off => ConsoleLogging::Off,
            ConsoleLoggingArg::Pretty => ConsoleLogging::Pretty,
            ConsoleLoggingArg::Json => ConsoleLogging::Json,
        }
    }
}
