//! Fan-out strategies
//!
//! Both strategies spawn one execution context per [`WorkUnit`], in index
//! order, and block until every context has reached a terminal state. They
//! differ in isolation and in the order completions are observed:
//!
//! - [`ProcessFanOut`]: forked children, reaped in whatever order the kernel
//!   reports them. Only the exit status crosses back to the coordinator.
//! - [`ThreadFanOut`]: scoped threads, joined in spawn order. Each thread
//!   hands its [`crate::workload::WorkloadOutcome`] back through its join
//!   handle.

pub mod process;
pub mod thread;

pub use process::ProcessFanOut;
pub use thread::ThreadFanOut;

use serde::Serialize;
use std::collections::HashSet;

use crate::config::Strategy;
use crate::error::FanOutError;
use crate::unit::{CompletionStatus, ContextReport, WorkUnit};

/// A unit that ran but did not complete cleanly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub index: usize,
    pub reason: String,
}

/// Aggregate of every context observed during one fan-out
#[derive(Debug, Clone, Serialize)]
pub struct FanOutResult {
    pub strategy: Strategy,
    pub total_units: usize,
    /// Units that completed successfully
    pub completed: usize,
    /// Units that failed, in observation order
    pub failures: Vec<UnitFailure>,
    /// Every observed context, in observation order
    pub reports: Vec<ContextReport>,
}

impl FanOutResult {
    pub fn new(strategy: Strategy, total_units: usize) -> Self {
        Self {
            strategy,
            total_units,
            completed: 0,
            failures: Vec::new(),
            reports: Vec::with_capacity(total_units),
        }
    }

    /// Record a context that reached a terminal state
    pub fn record(&mut self, report: ContextReport) {
        if !report.status.is_terminal() {
            tracing::warn!(unit = report.unit.index, "ignoring non-terminal report");
            return;
        }
        if let CompletionStatus::Failure(code) = report.status {
            self.failures.push(UnitFailure {
                index: report.unit.index,
                reason: report
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("failed with status {}", code)),
            });
        } else {
            self.completed += 1;
        }
        self.reports.push(report);
    }

    /// Contexts observed so far
    pub fn observed(&self) -> usize {
        self.completed + self.failures.len()
    }

    /// Every unit observed exactly once
    pub fn is_complete(&self) -> bool {
        self.observed() == self.total_units
    }

    /// Number of distinct OS identities among observed contexts
    pub fn distinct_identities(&self) -> usize {
        self.reports
            .iter()
            .map(|r| r.identity)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Unit indices in the order their completion was observed
    pub fn observation_order(&self) -> Vec<usize> {
        self.reports.iter().map(|r| r.unit.index).collect()
    }
}

/// A concurrency strategy that runs every unit in its own context
pub trait FanOut {
    /// Spawn one context per unit and wait for all of them
    ///
    /// A spawn failure aborts the fan-out with an error once the contexts
    /// already spawned have finished. Unit failures are returned as data.
    fn fan_out(&self, units: &[WorkUnit]) -> Result<FanOutResult, FanOutError>;
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
