//! Command-line argument parsing

use crate::cli::operation_mode::OperationMode;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "registry-pruner")]
#[command(about = "Apply retention rules to the tags of a Docker registry")]
#[command(version)]
pub struct Args {
    /// Configuration file
    #[arg(
        long = "config",
        short = 'c',
        default_value = "config.yaml",
        help = "Path to the YAML configuration file"
    )]
    pub config: PathBuf,

    /// Operation mode
    #[arg(
        long = "mode",
        short = 'm',
        value_enum,
        default_value_t = OperationMode::Report,
        help = "report: print the plan; prune: delete what the plan marks for deletion"
    )]
    pub mode: OperationMode,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', help = "Enable verbose output")]
    pub verbose: bool,

    /// Quiet mode
    #[arg(
        long = "quiet",
        short = 'q',
        conflicts_with = "verbose",
        help = "Only print errors and the report"
    )]
    pub quiet: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }
}
