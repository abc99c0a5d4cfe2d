//! Command-line surface for the `jobs-metrics` binary.

use crate::models::SortBy;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jobs-metrics")]
#[command(about = "Report on and maintain recorded job execution metrics", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the metrics database path
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cleanup old job metrics records
    Cleanup(CleanupArgs),
    /// Display job metrics with comprehensive statistics
    Top(TopArgs),
    /// Export job metrics data to JSON format
    Export(ExportArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct CleanupArgs {
    /// Number of days of data to keep (defaults to the configured retention)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub days: Option<u32>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Memory,
    Time,
}

impl From<SortArg> for SortBy {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Memory => SortBy::Memory,
            SortArg::Time => SortBy::Duration,
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TopArgs {
    /// Number of jobs to display
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pub limit: u32,

    /// Sort by memory or duration (time)
    #[arg(long, value_enum, default_value_t = SortArg::Memory)]
    pub sort: SortArg,

    /// Show data from the last N days (0 for the whole history)
    #[arg(long, default_value_t = 7)]
    pub days: u32,

    /// First day of an explicit range (YYYY-MM-DD); overrides --days
    #[arg(long, requires = "to")]
    pub from: Option<NaiveDate>,

    /// Last day of an explicit range (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    pub to: Option<NaiveDate>,

    /// Compare averages with the previous period of equal length
    #[arg(long)]
    pub trends: bool,

    /// Also list the heaviest individual executions
    #[arg(long)]
    pub detailed: bool,

    /// Also list execution counts per job
    #[arg(long)]
    pub counts: bool,

    /// Apply --limit to the queue summary as well
    #[arg(long)]
    pub limit_queues: bool,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ExportArgs {
    /// Export data from the last N days
    #[arg(long, default_value_t = 30)]
    pub days: u32,
}
