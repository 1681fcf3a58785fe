//! Dispatcher: validates the selection, runs the fan-out, aggregates results

use serde::Serialize;

use crate::chaos::ChaosConfig;
use crate::config::{validate_units, BenchConfig, Strategy, WorkloadKind, WorkloadParams};
use crate::error::{ConfigError, Result};
use crate::fanout::{FanOut, FanOutResult, ProcessFanOut, ThreadFanOut, UnitFailure};
use crate::unit::{ContextReport, WorkUnit};
use crate::usage::{UsageMeter, UsageReport};

/// Parse a worker type and unit count as given on the command line
pub fn parse_selection(
    worker_type: &str,
    unit_count: &str,
) -> std::result::Result<(WorkloadKind, usize), ConfigError> {
    let kind = worker_type.parse::<WorkloadKind>()?;
    let count = unit_count
        .trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidUnitCount(unit_count.to_string()))?;
    Ok((kind, validate_units(count)?))
}

/// Aggregate outcome of one dispatched run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub strategy: Strategy,
    pub kind: WorkloadKind,
    pub units: usize,
    pub loop_count: u64,
    pub completed: usize,
    pub failed: usize,
    pub failures: Vec<UnitFailure>,
    pub contexts: Vec<ContextReport>,
    pub usage: UsageReport,
}

impl RunSummary {
    fn new(config: &BenchConfig, result: FanOutResult, usage: UsageReport) -> Self {
        Self {
            strategy: config.strategy,
            kind: config.kind,
            units: result.total_units,
            loop_count: config.params.loop_count,
            completed: result.completed,
            failed: result.failures.len(),
            failures: result.failures,
            contexts: result.reports,
            usage,
        }
    }

    /// Every unit was observed and none failed
    pub fn all_succeeded(&self) -> bool {
        self.completed == self.units && self.failed == 0
    }
}

/// Runs one configured benchmark
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: BenchConfig,
}

impl Dispatcher {
    pub fn new(config: BenchConfig) -> Self {
        Self { config }
    }

    /// Validate raw command-line style input. Nothing is spawned on error.
    pub fn from_args(
        worker_type: &str,
        unit_count: &str,
        strategy: Strategy,
    ) -> std::result::Result<Self, ConfigError> {
        let (kind, units) = parse_selection(worker_type, unit_count)?;
        Ok(Self::new(BenchConfig::new(kind, units, strategy)?))
    }

    pub fn with_params(mut self, params: WorkloadParams) -> Self {
        self.config.params = params;
        self
    }

    pub fn with_chaos(mut self, chaos: ChaosConfig) -> Self {
        self.config.chaos = chaos;
        self
    }

    fn fan_out(&self) -> Box<dyn FanOut> {
        let params = self.config.params.clone();
        let chaos = self.config.chaos.clone();
        match self.config.strategy {
            Strategy::Process => Box::new(ProcessFanOut::new(params, chaos)),
            Strategy::Thread => Box::new(ThreadFanOut::new(params, chaos)),
        }
    }

    /// Fan out every unit and wait for all of them
    pub fn run(&self) -> Result<RunSummary> {
        let config = &self.config;
        validate_units(config.units as i64)?;

        tracing::info!(
            "Creating {} {} with worker '{}' ({} iterations each)",
            config.units,
            config.strategy.plural(),
            config.kind,
            config.params.loop_count
        );

        let units = WorkUnit::sequence(config.kind, config.units);
        let meter = UsageMeter::start(config.strategy);
        let result = self.fan_out().fan_out(&units)?;
        let usage = meter.finish();

        debug_assert!(result.is_complete(), "fan-out returned before observing every unit");
        for failure in &result.failures {
            tracing::warn!("unit {} failed: {}", failure.index, failure.reason);
        }

        Ok(RunSummary::new(config, result, usage))
    }
}

/// Validate and run `worker_type` × `unit_count` with default parameters
pub fn dispatch(worker_type: &str, unit_count: i64, strategy: Strategy) -> Result<RunSummary> {
    let kind = worker_type.parse::<WorkloadKind>()?;
    let units = validate_units(unit_count)?;
    Dispatcher::new(BenchConfig::new(kind, units, strategy)?).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BenchError;

    #[test]
    fn test_parse_selection_valid() {
        assert_eq!(parse_selection("cpu", "4").unwrap(), (WorkloadKind::Cpu, 4));
        assert_eq!(parse_selection("mem", " 100 ").unwrap(), (WorkloadKind::Memory, 100));
    }

    #[test]
    fn test_parse_selection_rejects_bad_input() {
        assert!(matches!(
            parse_selection("gpu", "2"),
            Err(ConfigError::UnknownWorkerType(_))
        ));
        assert!(matches!(
            parse_selection("io", "two"),
            Err(ConfigError::InvalidUnitCount(_))
        ));
        assert!(matches!(
            parse_selection("io", "0"),
            Err(ConfigError::UnitCountOutOfRange { count: 0, .. })
        ));
        assert!(matches!(
            parse_selection("io", "101"),
            Err(ConfigError::UnitCountOutOfRange { count: 101, .. })
        ));
    }

    #[test]
    fn test_dispatch_rejects_before_fan_out() {
        let err = dispatch("cpu", 0, Strategy::Thread).unwrap_err();
        assert!(matches!(err, BenchError::Config(_)));

        let err = dispatch("disk", 1, Strategy::Thread).unwrap_err();
        assert!(matches!(err, BenchError::Config(ConfigError::UnknownWorkerType(_))));
    }

    #[test]
    fn test_thread_run_summary() {
        let params = WorkloadParams::new().with_loop_count(1).with_cpu_window(10);
        let summary = Dispatcher::from_args("cpu", "3", Strategy::Thread)
            .unwrap()
            .with_params(params)
            .run()
            .unwrap();

        assert_eq!(summary.units, 3);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.contexts.len(), 3);
        assert_eq!(summary.loop_count, 1);
        assert!(summary.all_succeeded());
    }
}
