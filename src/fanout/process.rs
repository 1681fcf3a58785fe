//! Multi-process fan-out using fork() and wait()
//!
//! Each unit runs in a forked child with its own copy of the address space
//! and descriptor table. The child exits with status 0 when its generator
//! completed cleanly and 1 when an iteration failed. The coordinator reaps
//! children with wait() in whatever order they terminate.

use nix::errno::Errno;
use nix::sys::wait::{wait, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::collections::HashMap;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use super::{panic_message, FanOut, FanOutResult};
use crate::chaos::ChaosConfig;
use crate::config::{Strategy, WorkloadParams};
use crate::error::{FanOutError, SpawnError};
use crate::unit::{CompletionStatus, ContextId, ContextReport, WorkUnit};

/// Exit status of a child whose generator panicked
const PANIC_EXIT_CODE: i32 = 2;

/// Fork-based fan-out
#[derive(Debug, Clone)]
pub struct ProcessFanOut {
    params: WorkloadParams,
    chaos: ChaosConfig,
}

impl ProcessFanOut {
    pub fn new(params: WorkloadParams, chaos: ChaosConfig) -> Self {
        Self { params, chaos }
    }

    /// Fork one child for `unit`. Only the parent returns.
    fn spawn(&self, unit: &WorkUnit) -> io::Result<Pid> {
        if self.chaos.should_fail_spawn(unit.index) {
            return Err(io::Error::other("injected spawn fault"));
        }

        // SAFETY: the child runs the generator and exits through
        // std::process::exit in run_child; it never returns into the caller.
        match unsafe { fork() }? {
            ForkResult::Parent { child } => Ok(child),
            ForkResult::Child => run_child(unit, &self.params, &self.chaos),
        }
    }
}

/// Body of a forked child
fn run_child(unit: &WorkUnit, params: &WorkloadParams, chaos: &ChaosConfig) -> ! {
    let identity = ContextId::current_process();
    tracing::info!("unit {} (pid {}) starting {} worker", unit.index, identity, unit.kind);

    let run = panic::catch_unwind(AssertUnwindSafe(|| {
        unit.run(identity, params, chaos.fault_for(unit.index))
    }));

    let code = match run {
        Ok(outcome) => {
            if outcome.is_success() {
                tracing::info!("unit {} (pid {}) completed", unit.index, identity);
            } else {
                tracing::warn!(
                    "unit {} (pid {}) completed with {} failed iterations",
                    unit.index,
                    identity,
                    outcome.failed_iterations
                );
            }
            outcome.exit_code()
        }
        Err(payload) => {
            tracing::error!(
                "unit {} (pid {}) panicked: {}",
                unit.index,
                identity,
                panic_message(payload.as_ref())
            );
            PANIC_EXIT_CODE
        }
    };

    io::stdout().flush().ok();
    io::stderr().flush().ok();
    std::process::exit(code);
}

/// Translate one wait() status into a report. `None` for non-terminal statuses.
fn terminal_status(status: WaitStatus) -> Option<(Pid, CompletionStatus, Option<String>)> {
    match status {
        WaitStatus::Exited(pid, code) => {
            let reason = (code != 0).then(|| format!("exited with status {}", code));
            Some((pid, CompletionStatus::from_exit_code(code), reason))
        }
        WaitStatus::Signaled(pid, signal, _) => Some((
            pid,
            CompletionStatus::Failure(128 + signal as i32),
            Some(format!("terminated by signal {:?}", signal)),
        )),
        _ => None,
    }
}

/// Reap every child in `children`, in the order the kernel reports them
fn collect(
    children: &mut HashMap<Pid, WorkUnit>,
    started: Instant,
    result: &mut FanOutResult,
) -> Result<(), FanOutError> {
    let expected = children.len();
    let mut collected = 0;

    while !children.is_empty() {
        let status = match wait() {
            Ok(status) => status,
            Err(Errno::EINTR) => continue,
            Err(errno) => {
                return Err(FanOutError::Collect {
                    expected,
                    collected,
                    source: errno.into(),
                })
            }
        };

        let Some((pid, status, reason)) = terminal_status(status) else {
            continue;
        };
        let Some(unit) = children.remove(&pid) else {
            tracing::warn!("reaped pid {} which this fan-out did not spawn", pid);
            continue;
        };
        collected += 1;

        let code = match status {
            CompletionStatus::Failure(code) => code,
            _ => 0,
        };
        tracing::info!("child pid {} (unit {}) finished with status {}", pid, unit.index, code);

        result.record(ContextReport {
            unit,
            identity: ContextId(pid.as_raw()),
            status,
            reason,
            outcome: None,
            elapsed: started.elapsed(),
        });
    }

    Ok(())
}

impl FanOut for ProcessFanOut {
    fn fan_out(&self, units: &[WorkUnit]) -> Result<FanOutResult, FanOutError> {
        let started = Instant::now();
        let mut children = HashMap::with_capacity(units.len());

        for unit in units {
            match self.spawn(unit) {
                Ok(pid) => {
                    tracing::debug!("forked pid {} for unit {}", pid, unit.index);
                    children.insert(pid, *unit);
                }
                Err(source) => {
                    tracing::error!("fork failed for unit {}: {}", unit.index, source);

                    // Already-running children finish their work and are reaped
                    let mut drained = FanOutResult::new(Strategy::Process, children.len());
                    if let Err(e) = collect(&mut children, started, &mut drained) {
                        tracing::error!("failed to reap spawned children: {}", e);
                    }

                    return Err(SpawnError {
                        strategy: Strategy::Process,
                        index: unit.index,
                        source,
                    }
                    .into());
                }
            }
        }

        let mut result = FanOutResult::new(Strategy::Process, units.len());
        collect(&mut children, started, &mut result)?;
        tracing::info!("all {} child processes completed", result.observed());
        Ok(result)
    }
}
