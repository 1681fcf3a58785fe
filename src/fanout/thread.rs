//! Multi-threaded fan-out using scoped OS threads
//!
//! All argument records are built before the first spawn and borrowed by the
//! threads. The scope guarantees every spawned thread is joined before the
//! records go away, including when a later spawn fails.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::Instant;

use super::{panic_message, FanOut, FanOutResult};
use crate::chaos::{ChaosConfig, Fault};
use crate::config::{Strategy, WorkloadParams};
use crate::error::{FanOutError, SpawnError};
use crate::unit::{CompletionStatus, ContextId, ContextReport, WorkUnit};
use crate::workload::WorkloadOutcome;

/// Per-thread argument record
#[derive(Debug)]
struct UnitArgs<'a> {
    unit: WorkUnit,
    params: &'a WorkloadParams,
    fault: Option<Fault>,
}

/// What a thread hands back through its join handle
#[derive(Debug)]
struct UnitExit {
    identity: ContextId,
    outcome: Result<WorkloadOutcome, String>,
}

type Handle<'scope> = ScopedJoinHandle<'scope, UnitExit>;

/// Thread-based fan-out
#[derive(Debug, Clone)]
pub struct ThreadFanOut {
    params: WorkloadParams,
    chaos: ChaosConfig,
}

impl ThreadFanOut {
    pub fn new(params: WorkloadParams, chaos: ChaosConfig) -> Self {
        Self { params, chaos }
    }

    fn spawn<'scope, 'env>(
        &self,
        scope: &'scope Scope<'scope, 'env>,
        args: &'env UnitArgs<'env>,
    ) -> io::Result<Handle<'scope>> {
        if self.chaos.should_fail_spawn(args.unit.index) {
            return Err(io::Error::other("injected spawn fault"));
        }
        thread::Builder::new()
            .name(format!("unit-{}", args.unit.index))
            .spawn_scoped(scope, move || run_thread(args))
    }
}

fn run_thread(args: &UnitArgs<'_>) -> UnitExit {
    let unit = args.unit;
    let identity = ContextId::current_thread();
    tracing::info!("unit {} (tid {}) starting {} worker", unit.index, identity, unit.kind);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        unit.run(identity, args.params, args.fault)
    }))
    .map_err(|payload| panic_message(payload.as_ref()));

    match &outcome {
        Ok(o) if o.is_success() => {
            tracing::info!("unit {} (tid {}) completed", unit.index, identity)
        }
        Ok(o) => tracing::warn!(
            "unit {} (tid {}) completed with {} failed iterations",
            unit.index,
            identity,
            o.failed_iterations
        ),
        Err(msg) => tracing::error!("unit {} (tid {}) panicked: {}", unit.index, identity, msg),
    }

    UnitExit { identity, outcome }
}

/// Join every handle in spawn order
fn join_all(handles: Vec<(WorkUnit, Handle<'_>)>, started: Instant, result: &mut FanOutResult) {
    for (unit, handle) in handles {
        let report = match handle.join() {
            Ok(UnitExit {
                identity,
                outcome: Ok(outcome),
            }) => ContextReport {
                unit,
                identity,
                status: CompletionStatus::from_exit_code(outcome.exit_code()),
                reason: (!outcome.is_success())
                    .then(|| format!("{} failed iterations", outcome.failed_iterations)),
                outcome: Some(outcome),
                elapsed: started.elapsed(),
            },
            Ok(UnitExit {
                identity,
                outcome: Err(msg),
            }) => ContextReport {
                unit,
                identity,
                status: CompletionStatus::Failure(1),
                reason: Some(format!("panicked: {}", msg)),
                outcome: None,
                elapsed: started.elapsed(),
            },
            // run_thread catches generator panics, so only a panic in the
            // logging around it lands here. The tid is unknown.
            Err(payload) => ContextReport {
                unit,
                identity: ContextId(0),
                status: CompletionStatus::Failure(1),
                reason: Some(format!("panicked: {}", panic_message(payload.as_ref()))),
                outcome: None,
                elapsed: started.elapsed(),
            },
        };
        tracing::debug!("joined unit {} (tid {})", unit.index, report.identity);
        result.record(report);
    }
}

impl FanOut for ThreadFanOut {
    fn fan_out(&self, units: &[WorkUnit]) -> Result<FanOutResult, FanOutError> {
        let started = Instant::now();
        let args: Vec<UnitArgs<'_>> = units
            .iter()
            .map(|unit| UnitArgs {
                unit: *unit,
                params: &self.params,
                fault: self.chaos.fault_for(unit.index),
            })
            .collect();

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(args.len());

            for arg in &args {
                match self.spawn(scope, arg) {
                    Ok(handle) => handles.push((arg.unit, handle)),
                    Err(source) => {
                        tracing::error!("thread spawn failed for unit {}: {}", arg.unit.index, source);

                        // No partial fan-out: wait for what was started, then abort
                        let mut drained = FanOutResult::new(Strategy::Thread, handles.len());
                        join_all(handles, started, &mut drained);

                        return Err(SpawnError {
                            strategy: Strategy::Thread,
                            index: arg.unit.index,
                            source,
                        }
                        .into());
                    }
                }
            }

            let mut result = FanOutResult::new(Strategy::Thread, units.len());
            join_all(handles, started, &mut result);
            tracing::info!("all {} threads completed", result.observed());
            Ok(result)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadKind;

    fn cpu_fan_out(chaos: ChaosConfig) -> ThreadFanOut {
        let params = WorkloadParams::new().with_loop_count(2).with_cpu_window(20);
        ThreadFanOut::new(params, chaos)
    }

    #[test]
    fn test_joins_in_spawn_order() {
        let fan_out = cpu_fan_out(ChaosConfig::default());
        let units = WorkUnit::sequence(WorkloadKind::Cpu, 5);
        let result = fan_out.fan_out(&units).unwrap();

        assert!(result.is_complete());
        assert_eq!(result.completed, 5);
        assert_eq!(result.observation_order(), vec![0, 1, 2, 3, 4]);
        assert_eq!(result.distinct_identities(), 5);
        assert!(result.reports.iter().all(|r| r.outcome.is_some()));
    }

    #[test]
    fn test_spawn_failure_aborts_whole_fan_out() {
        let fan_out = cpu_fan_out(ChaosConfig::new().with_spawn_failure(2));
        let units = WorkUnit::sequence(WorkloadKind::Cpu, 5);
        let err = fan_out.fan_out(&units).unwrap_err();

        match err {
            FanOutError::Spawn(spawn) => {
                assert_eq!(spawn.index, 2);
                assert_eq!(spawn.strategy, Strategy::Thread);
            }
            other => panic!("expected spawn error, got {:?}", other),
        }
    }

    #[test]
    fn test_spawn_failure_joins_started_threads_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let params = WorkloadParams::new()
            .with_loop_count(3)
            .with_io_buffer_bytes(1024)
            .with_tmp_dir(dir.path());
        let fan_out = ThreadFanOut::new(params, ChaosConfig::new().with_spawn_failure(2));
        let units = WorkUnit::sequence(WorkloadKind::Io, 5);

        let err = fan_out.fan_out(&units).unwrap_err();
        assert!(matches!(err, FanOutError::Spawn(ref spawn) if spawn.index == 2));

        // Units 0 and 1 ran to completion and removed their files
        let leftover: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftover.is_empty(), "leftover files: {:?}", leftover);
    }

    #[test]
    fn test_unit_failure_is_reported_through_join() {
        let params = WorkloadParams::new()
            .with_loop_count(3)
            .with_mem_buffer_bytes(1024);
        let fan_out = ThreadFanOut::new(params, ChaosConfig::new().with_alloc_failure(1));
        let units = WorkUnit::sequence(WorkloadKind::Memory, 3);
        let result = fan_out.fan_out(&units).unwrap();

        assert!(result.is_complete());
        assert_eq!(result.completed, 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].index, 1);
        assert_eq!(result.failures[0].reason, "1 failed iterations");
    }
}
