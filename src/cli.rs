//! CLI argument parsing for fanbench

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::chaos::FaultSpec;
use crate::config::{Strategy, DEFAULT_LOOP_COUNT};

/// Output format for the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary (default)
    Text,
    /// JSON object for machine parsing
    Json,
    /// CSV row for plotting sweeps
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "fanbench")]
#[command(version)]
#[command(about = "Compare process and thread fan-out on CPU, memory and I/O bound workers", long_about = None)]
pub struct Cli {
    /// Worker type: cpu, mem, or io
    #[arg(value_name = "WORKER_TYPE")]
    pub worker_type: String,

    /// Number of units (processes or threads), 1 to 100
    #[arg(value_name = "UNIT_COUNT", allow_hyphen_values = true)]
    pub unit_count: String,

    /// Run each unit in a forked process or in a thread
    #[arg(short = 's', long = "strategy", value_enum, default_value = "process")]
    pub strategy: Strategy,

    /// Iterations per worker
    #[arg(short = 'n', long = "loop-count", value_name = "N", default_value_t = DEFAULT_LOOP_COUNT)]
    pub loop_count: u64,

    /// Directory for the I/O worker's temporary files
    #[arg(long = "tmp-dir", value_name = "DIR")]
    pub tmp_dir: Option<PathBuf>,

    /// Output format (text, json or csv)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Omit the CSV header row
    #[arg(long = "no-header")]
    pub no_header: bool,

    /// Enable trace-level logging
    #[arg(long = "debug")]
    pub debug: bool,

    /// Only log warnings and errors
    #[arg(short = 'q', long = "quiet", conflicts_with = "debug")]
    pub quiet: bool,

    /// Inject a fault into one unit (KIND:INDEX, KIND = spawn, alloc, write)
    #[arg(long = "inject-fault", value_name = "KIND:INDEX", hide = true)]
    pub inject_fault: Vec<FaultSpec>,
}
