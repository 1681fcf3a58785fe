//! Benchmark configuration
//!
//! Workload selection, fan-out strategy and the workload parameters that are
//! threaded explicitly into every generator invocation.

use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::chaos::ChaosConfig;
use crate::error::ConfigError;

/// Default iteration bound for every generator
pub const DEFAULT_LOOP_COUNT: u64 = 9000;

/// Smallest accepted unit count
pub const MIN_UNITS: usize = 1;

/// Largest accepted unit count
pub const MAX_UNITS: usize = 100;

const MIB: usize = 1024 * 1024;

/// Which synthetic workload every unit runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    /// Trial-division prime search
    Cpu,
    /// Ring of large buffers, filled and scanned
    #[serde(rename = "mem")]
    Memory,
    /// Repeated write/read of a temporary file
    Io,
}

impl WorkloadKind {
    /// Short name used on the command line and in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Cpu => "cpu",
            WorkloadKind::Memory => "mem",
            WorkloadKind::Io => "io",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(WorkloadKind::Cpu),
            "mem" => Ok(WorkloadKind::Memory),
            "io" => Ok(WorkloadKind::Io),
            other => Err(ConfigError::UnknownWorkerType(other.to_string())),
        }
    }
}

/// Concurrency strategy used for the fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One forked child process per unit
    #[default]
    Process,
    /// One OS thread per unit, all in this address space
    Thread,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Process => "process",
            Strategy::Thread => "thread",
        }
    }

    /// Program label in the CSV `Program` column
    pub fn program_name(&self) -> &'static str {
        match self {
            Strategy::Process => "program_a",
            Strategy::Thread => "program_b",
        }
    }

    /// Plural noun for summaries ("processes", "threads")
    pub fn plural(&self) -> &'static str {
        match self {
            Strategy::Process => "processes",
            Strategy::Thread => "threads",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sizes and bounds for the three generators
///
/// Defaults reproduce the reference workload. Tests shrink them with the
/// `with_*` setters.
///
/// # Example
/// ```
/// use fanbench::config::WorkloadParams;
///
/// let params = WorkloadParams::new().with_loop_count(10);
/// assert_eq!(params.loop_count, 10);
/// assert_eq!(params.mem_slots, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadParams {
    /// Iterations per generator run
    pub loop_count: u64,

    /// First candidate tested by the CPU generator
    pub cpu_start: u64,
    /// Candidates tested per CPU iteration
    pub cpu_window: u64,

    /// Ring capacity of the memory generator
    pub mem_slots: usize,
    /// Size of each memory buffer in bytes
    pub mem_buffer_bytes: usize,
    /// Strided read passes over each fresh buffer
    pub mem_passes: usize,
    /// Stride of the read passes in bytes
    pub mem_stride: usize,

    /// Size of the I/O write/read buffer in bytes
    pub io_buffer_bytes: usize,
    /// Buffer writes per I/O iteration
    pub io_writes: usize,
    /// Read-backs per I/O iteration
    pub io_reads: usize,
    /// fsync every Nth iteration
    pub io_sync_interval: u64,
    /// Directory for the per-context temporary file
    pub tmp_dir: PathBuf,
}

impl Default for WorkloadParams {
    fn default() -> Self {
        Self {
            loop_count: DEFAULT_LOOP_COUNT,
            cpu_start: 1_000_000,
            cpu_window: 5000,
            mem_slots: 20,
            mem_buffer_bytes: 10 * MIB,
            mem_passes: 5,
            mem_stride: 64,
            io_buffer_bytes: MIB,
            io_writes: 10,
            io_reads: 5,
            io_sync_interval: 100,
            tmp_dir: std::env::temp_dir(),
        }
    }
}

impl WorkloadParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loop_count(mut self, loop_count: u64) -> Self {
        self.loop_count = loop_count;
        self
    }

    pub fn with_cpu_window(mut self, window: u64) -> Self {
        self.cpu_window = window.max(1);
        self
    }

    pub fn with_mem_buffer_bytes(mut self, bytes: usize) -> Self {
        self.mem_buffer_bytes = bytes;
        self
    }

    pub fn with_io_buffer_bytes(mut self, bytes: usize) -> Self {
        self.io_buffer_bytes = bytes;
        self
    }

    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = dir.into();
        self
    }
}

/// Complete configuration of one benchmark run
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub kind: WorkloadKind,
    pub units: usize,
    pub strategy: Strategy,
    pub params: WorkloadParams,
    pub chaos: ChaosConfig,
}

impl BenchConfig {
    /// Validated configuration with default parameters
    pub fn new(kind: WorkloadKind, units: usize, strategy: Strategy) -> Result<Self, ConfigError> {
        validate_units(units as i64)?;
        Ok(Self {
            kind,
            units,
            strategy,
            params: WorkloadParams::default(),
            chaos: ChaosConfig::default(),
        })
    }

    pub fn with_params(mut self, params: WorkloadParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_chaos(mut self, chaos: ChaosConfig) -> Self {
        self.chaos = chaos;
        self
    }
}

/// Check a unit count against `[MIN_UNITS, MAX_UNITS]`
pub fn validate_units(count: i64) -> Result<usize, ConfigError> {
    if count < MIN_UNITS as i64 || count > MAX_UNITS as i64 {
        return Err(ConfigError::UnitCountOutOfRange {
            count,
            min: MIN_UNITS,
            max: MAX_UNITS,
        });
    }
    Ok(count as usize)
}
