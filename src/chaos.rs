// Fault injection for fan-out runs
//
// Builder pattern for forcing a spawn, allocation or write failure on a
// chosen unit without depending on real resource exhaustion.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A fault that can be injected into one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Creating the unit's execution context fails
    SpawnFailure,
    /// The memory generator's first allocation fails
    AllocFailure,
    /// The I/O generator's first write call fails
    IoWriteFailure,
}

impl Fault {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fault::SpawnFailure => "spawn",
            Fault::AllocFailure => "alloc",
            Fault::IoWriteFailure => "write",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fault injection configuration with builder pattern
///
/// Faults fire on iteration 0 only, so the rest of the unit's work still runs.
///
/// # Example
/// ```
/// use fanbench::chaos::{ChaosConfig, Fault};
///
/// let chaos = ChaosConfig::new()
///     .with_io_write_failure(1)
///     .with_spawn_failure(4);
/// assert_eq!(chaos.fault_for(1), Some(Fault::IoWriteFailure));
/// assert_eq!(chaos.fault_for(0), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChaosConfig {
    faults: BTreeMap<usize, Fault>,
}

impl ChaosConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make spawning unit `index` fail
    pub fn with_spawn_failure(self, index: usize) -> Self {
        self.with_fault(index, Fault::SpawnFailure)
    }

    /// Make the first allocation of unit `index` fail
    pub fn with_alloc_failure(self, index: usize) -> Self {
        self.with_fault(index, Fault::AllocFailure)
    }

    /// Make the first write of unit `index` fail
    pub fn with_io_write_failure(self, index: usize) -> Self {
        self.with_fault(index, Fault::IoWriteFailure)
    }

    /// Inject `fault` into unit `index`, replacing any earlier fault for it
    pub fn with_fault(mut self, index: usize, fault: Fault) -> Self {
        self.faults.insert(index, fault);
        self
    }

    pub fn fault_for(&self, index: usize) -> Option<Fault> {
        self.faults.get(&index).copied()
    }

    pub fn should_fail_spawn(&self, index: usize) -> bool {
        self.fault_for(index) == Some(Fault::SpawnFailure)
    }

    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Parsed `KIND:INDEX` fault specification from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultSpec {
    pub fault: Fault,
    pub index: usize,
}

impl FromStr for FaultSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, index) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid fault '{}'. Expected KIND:INDEX", s))?;
        let fault = match kind {
            "spawn" => Fault::SpawnFailure,
            "alloc" => Fault::AllocFailure,
            "write" => Fault::IoWriteFailure,
            other => return Err(format!("Unknown fault kind '{}' (spawn, alloc, write)", other)),
        };
        let index = index
            .parse::<usize>()
            .map_err(|e| format!("Invalid unit index '{}': {}", index, e))?;
        Ok(Self { fault, index })
    }
}

impl FromIterator<FaultSpec> for ChaosConfig {
    fn from_iter<I: IntoIterator<Item = FaultSpec>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |chaos, spec| chaos.with_fault(spec.index, spec.fault))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chaos_config_default_is_empty() {
        let chaos = ChaosConfig::default();
        assert!(chaos.is_empty());
        assert_eq!(chaos.fault_for(0), None);
        assert!(!chaos.should_fail_spawn(0));
    }

    #[test]
    fn test_chaos_builder_chaining() {
        let chaos = ChaosConfig::new()
            .with_alloc_failure(0)
            .with_spawn_failure(2);
        assert_eq!(chaos.fault_for(0), Some(Fault::AllocFailure));
        assert!(chaos.should_fail_spawn(2));
        assert!(!chaos.should_fail_spawn(0));
    }

    #[test]
    fn test_later_fault_replaces_earlier() {
        let chaos = ChaosConfig::new()
            .with_alloc_failure(1)
            .with_io_write_failure(1);
        assert_eq!(chaos.fault_for(1), Some(Fault::IoWriteFailure));
    }

    #[test]
    fn test_fault_spec_parsing() {
        let spec: FaultSpec = "write:2".parse().unwrap();
        assert_eq!(spec, FaultSpec { fault: Fault::IoWriteFailure, index: 2 });

        assert!("write".parse::<FaultSpec>().is_err());
        assert!("disk:1".parse::<FaultSpec>().is_err());
        assert!("spawn:-1".parse::<FaultSpec>().is_err());
    }

    #[test]
    fn test_collect_specs_into_config() {
        let chaos: ChaosConfig = ["spawn:3", "alloc:0"]
            .iter()
            .map(|s| s.parse::<FaultSpec>().unwrap())
            .collect();
        assert!(chaos.should_fail_spawn(3));
        assert_eq!(chaos.fault_for(0), Some(Fault::AllocFailure));
    }
}
