//! Units of work and the execution contexts that run them

use nix::unistd::{getpid, gettid};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::chaos::Fault;
use crate::config::{WorkloadKind, WorkloadParams};
use crate::workload::{self, UnitContext, WorkloadOutcome};

/// One scheduled instance of a workload, identified by its spawn index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkUnit {
    pub index: usize,
    pub kind: WorkloadKind,
}

impl WorkUnit {
    pub fn new(index: usize, kind: WorkloadKind) -> Self {
        Self { index, kind }
    }

    /// Units `0..count`, in spawn order
    pub fn sequence(kind: WorkloadKind, count: usize) -> Vec<WorkUnit> {
        (0..count).map(|index| WorkUnit::new(index, kind)).collect()
    }

    /// Run this unit's generator to completion inside the calling context
    pub fn run(
        &self,
        identity: ContextId,
        params: &WorkloadParams,
        fault: Option<Fault>,
    ) -> WorkloadOutcome {
        let ctx = UnitContext {
            index: self.index,
            identity,
            params,
            fault,
        };
        workload::run(self.kind, &ctx)
    }
}

/// OS identity of an execution context (pid for processes, tid for threads)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(pub i32);

impl ContextId {
    /// Pid of the calling process
    pub fn current_process() -> Self {
        ContextId(getpid().as_raw())
    }

    /// Kernel thread id of the calling thread
    pub fn current_thread() -> Self {
        ContextId(gettid().as_raw())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion state of an execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    #[default]
    Pending,
    Success,
    Failure(i32),
}

impl CompletionStatus {
    /// Map a process exit code onto a status
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            CompletionStatus::Success
        } else {
            CompletionStatus::Failure(code)
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CompletionStatus::Pending)
    }
}

/// What the coordinator observed when one context reached a terminal state
#[derive(Debug, Clone, Serialize)]
pub struct ContextReport {
    pub unit: WorkUnit,
    pub identity: ContextId,
    pub status: CompletionStatus,
    /// Why the unit failed, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Generator outcome, when the strategy has a channel for it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<WorkloadOutcome>,
    /// Time from fan-out start until the coordinator observed this context
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_assigns_indices_in_order() {
        let units = WorkUnit::sequence(WorkloadKind::Io, 4);
        let indices: Vec<usize> = units.iter().map(|u| u.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(units.iter().all(|u| u.kind == WorkloadKind::Io));
    }

    #[test]
    fn test_completion_status_from_exit_code() {
        assert_eq!(CompletionStatus::from_exit_code(0), CompletionStatus::Success);
        assert_eq!(CompletionStatus::from_exit_code(3), CompletionStatus::Failure(3));
        assert!(!CompletionStatus::Pending.is_terminal());
        assert!(CompletionStatus::Failure(1).is_terminal());
    }

    #[test]
    fn test_current_thread_differs_between_threads() {
        let main_tid = ContextId::current_thread();
        let other_tid = std::thread::spawn(ContextId::current_thread).join().unwrap();
        assert_ne!(main_tid, other_tid);
        assert_eq!(ContextId::current_process(), ContextId(std::process::id() as i32));
    }

    #[test]
    fn test_unit_runs_its_generator() {
        let params = WorkloadParams::new().with_loop_count(2).with_cpu_window(50);
        let unit = WorkUnit::new(0, WorkloadKind::Cpu);
        let outcome = unit.run(ContextId::current_thread(), &params, None);
        assert_eq!(outcome.kind, WorkloadKind::Cpu);
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.is_success());
    }
}
