//! Synthetic workload generators
//!
//! Three deterministic generators stress the CPU, the allocator and memory
//! bus, and the filesystem. Each one runs synchronously inside whatever
//! execution context calls it and owns every buffer and file it touches, so
//! concurrent units never share mutable state.
//!
//! Generators never fail as a whole. A failed allocation or I/O call skips the
//! rest of that iteration and is counted in
//! [`WorkloadOutcome::failed_iterations`].

pub mod cpu;
pub mod io;
pub mod memory;

use serde::Serialize;

use crate::chaos::Fault;
use crate::config::{WorkloadKind, WorkloadParams};
use crate::unit::ContextId;

/// Everything a generator needs from the context running it
#[derive(Debug, Clone, Copy)]
pub struct UnitContext<'a> {
    /// Spawn index of the unit
    pub index: usize,
    /// OS identity of the running context, used for per-context file names
    pub identity: ContextId,
    pub params: &'a WorkloadParams,
    /// Fault to inject on the first iteration, if any
    pub fault: Option<Fault>,
}

impl UnitContext<'_> {
    /// Whether `fault` should fire at `iteration`
    pub(crate) fn injects(&self, fault: Fault, iteration: u64) -> bool {
        iteration == 0 && self.fault == Some(fault)
    }
}

/// Ring occupancy reported by the memory generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RingStats {
    /// Occupied slots when the iteration loop ended
    pub live_at_loop_end: usize,
    /// Buffers released by teardown
    pub released_on_teardown: usize,
}

/// Result of one generator run
///
/// `observed` is the side-effect value the generator produced (prime count,
/// checksum, bytes read). Callers must consume it so the work cannot be
/// optimized away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkloadOutcome {
    pub kind: WorkloadKind,
    /// Iterations attempted
    pub iterations: u64,
    /// Iterations cut short by an allocation or I/O failure
    pub failed_iterations: u64,
    pub observed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ring: Option<RingStats>,
}

impl WorkloadOutcome {
    pub(crate) fn new(kind: WorkloadKind) -> Self {
        Self {
            kind,
            iterations: 0,
            failed_iterations: 0,
            observed: 0,
            ring: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed_iterations == 0
    }

    /// Exit status a process context reports for this outcome
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Run the generator for `kind` to completion
pub fn run(kind: WorkloadKind, ctx: &UnitContext<'_>) -> WorkloadOutcome {
    let outcome = match kind {
        WorkloadKind::Cpu => cpu::run(ctx),
        WorkloadKind::Memory => memory::run(ctx),
        WorkloadKind::Io => io::run(ctx),
    };

    tracing::debug!(
        unit = ctx.index,
        kind = %kind,
        observed = std::hint::black_box(outcome.observed),
        failed_iterations = outcome.failed_iterations,
        "generator finished"
    );

    outcome
}
