//! fanbench - process vs. thread fan-out benchmark
//!
//! Runs N independent units of a synthetic CPU, memory or I/O bound workload,
//! either as N forked processes or as N threads, waits for all of them and
//! reports completion counts and resource usage.

pub mod chaos;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fanout;
pub mod report;
pub mod unit;
pub mod usage;
pub mod workload;

pub use config::{BenchConfig, Strategy, WorkloadKind, WorkloadParams};
pub use dispatch::{dispatch, Dispatcher, RunSummary};
pub use error::{BenchError, ConfigError, FanOutError, SpawnError};
pub use fanout::{FanOut, FanOutResult, ProcessFanOut, ThreadFanOut};
