//! Error taxonomy for dispatch and fan-out
//!
//! Configuration and spawn errors are fatal and propagate to the caller.
//! Unit-level failures are not errors: they are recorded as data in
//! [`crate::fanout::FanOutResult`].

use std::io;
use thiserror::Error;

use crate::config::Strategy;

/// Invalid worker selection or unit count. No fan-out is attempted.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid worker type '{0}' (expected cpu, mem, or io)")]
    UnknownWorkerType(String),

    #[error("Invalid number of units '{0}'")]
    InvalidUnitCount(String),

    #[error("Invalid number of units {count} (must be between {min} and {max})")]
    UnitCountOutOfRange { count: i64, min: usize, max: usize },
}

/// Creating an execution context failed
#[derive(Error, Debug)]
#[error("Failed to spawn {strategy} context for unit {index}: {source}")]
pub struct SpawnError {
    pub strategy: Strategy,
    pub index: usize,
    #[source]
    pub source: io::Error,
}

/// Errors that abort a whole fan-out
#[derive(Error, Debug)]
pub enum FanOutError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// A collection call failed before every spawned context was observed.
    /// Running out of children early means the coordinator lost track of one.
    #[error("Collection failed after {collected} of {expected} contexts: {source}")]
    Collect {
        expected: usize,
        collected: usize,
        #[source]
        source: io::Error,
    },
}

/// Top-level error returned by the dispatcher
#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    FanOut(#[from] FanOutError),
}

/// Result type for dispatch operations
pub type Result<T> = std::result::Result<T, BenchError>;
