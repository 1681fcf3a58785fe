//! Resource usage of a fan-out run
//!
//! Snapshots `getrusage` before and after a run and reports the delta
//! alongside wall-clock time: CPU utilization, peak resident memory, context
//! switches and page faults. Process runs read `RUSAGE_CHILDREN` (the reaped
//! children), thread runs read `RUSAGE_SELF`.

use nix::sys::resource::{getrusage, Usage, UsageWho};
use nix::sys::time::TimeVal;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::config::Strategy;

fn timeval_to_duration(tv: TimeVal) -> Duration {
    Duration::new(tv.tv_sec().max(0) as u64, (tv.tv_usec().max(0) as u32) * 1000)
}

/// Raw counters at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub user: Duration,
    pub system: Duration,
    /// Peak resident set size in KiB
    pub max_rss_kb: u64,
    pub minor_faults: u64,
    pub major_faults: u64,
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
}

impl From<Usage> for UsageSnapshot {
    fn from(usage: Usage) -> Self {
        Self {
            user: timeval_to_duration(usage.user_time()),
            system: timeval_to_duration(usage.system_time()),
            max_rss_kb: usage.max_rss().max(0) as u64,
            minor_faults: usage.minor_page_faults().max(0) as u64,
            major_faults: usage.major_page_faults().max(0) as u64,
            voluntary_switches: usage.voluntary_context_switches().max(0) as u64,
            involuntary_switches: usage.involuntary_context_switches().max(0) as u64,
        }
    }
}

impl UsageSnapshot {
    /// Counters for whoever does the work under `strategy`
    pub fn take(strategy: Strategy) -> Self {
        let who = match strategy {
            Strategy::Process => UsageWho::RUSAGE_CHILDREN,
            Strategy::Thread => UsageWho::RUSAGE_SELF,
        };
        match getrusage(who) {
            Ok(usage) => usage.into(),
            Err(e) => {
                tracing::warn!("getrusage failed: {}", e);
                Self::default()
            }
        }
    }

    /// Counters accumulated since `earlier`
    ///
    /// Peak RSS is a high-water mark, not a counter, so the later value is kept.
    pub fn since(&self, earlier: &UsageSnapshot) -> UsageSnapshot {
        UsageSnapshot {
            user: self.user.saturating_sub(earlier.user),
            system: self.system.saturating_sub(earlier.system),
            max_rss_kb: self.max_rss_kb,
            minor_faults: self.minor_faults.saturating_sub(earlier.minor_faults),
            major_faults: self.major_faults.saturating_sub(earlier.major_faults),
            voluntary_switches: self.voluntary_switches.saturating_sub(earlier.voluntary_switches),
            involuntary_switches: self
                .involuntary_switches
                .saturating_sub(earlier.involuntary_switches),
        }
    }
}

/// Derived metrics for one run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageReport {
    pub wall_secs: f64,
    pub user_secs: f64,
    pub system_secs: f64,
    /// (user + system) / wall, in percent. Exceeds 100 with parallelism.
    pub cpu_percent: f64,
    pub max_rss_kb: u64,
    pub voluntary_switches: u64,
    pub involuntary_switches: u64,
    pub context_switches_per_sec: f64,
    pub page_faults_total: u64,
}

impl UsageReport {
    pub fn from_delta(delta: &UsageSnapshot, wall: Duration) -> Self {
        let wall_secs = wall.as_secs_f64();
        let user_secs = delta.user.as_secs_f64();
        let system_secs = delta.system.as_secs_f64();
        let switches = delta.voluntary_switches + delta.involuntary_switches;
        let per_sec = |value: f64| if wall_secs > 0.0 { value / wall_secs } else { 0.0 };

        Self {
            wall_secs,
            user_secs,
            system_secs,
            cpu_percent: per_sec(user_secs + system_secs) * 100.0,
            max_rss_kb: delta.max_rss_kb,
            voluntary_switches: delta.voluntary_switches,
            involuntary_switches: delta.involuntary_switches,
            context_switches_per_sec: per_sec(switches as f64),
            page_faults_total: delta.minor_faults + delta.major_faults,
        }
    }
}

/// Measures wall time and resource usage around a run
#[derive(Debug)]
pub struct UsageMeter {
    strategy: Strategy,
    start: Instant,
    before: UsageSnapshot,
}

impl UsageMeter {
    pub fn start(strategy: Strategy) -> Self {
        Self {
            strategy,
            before: UsageSnapshot::take(strategy),
            start: Instant::now(),
        }
    }

    pub fn finish(self) -> UsageReport {
        let wall = self.start.elapsed();
        let after = UsageSnapshot::take(self.strategy);
        UsageReport::from_delta(&after.since(&self.before), wall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_subtracts_counters_and_keeps_peak_rss() {
        let before = UsageSnapshot {
            user: Duration::from_millis(100),
            system: Duration::from_millis(50),
            max_rss_kb: 1000,
            minor_faults: 10,
            major_faults: 1,
            voluntary_switches: 5,
            involuntary_switches: 2,
        };
        let after = UsageSnapshot {
            user: Duration::from_millis(400),
            system: Duration::from_millis(150),
            max_rss_kb: 4000,
            minor_faults: 30,
            major_faults: 1,
            voluntary_switches: 25,
            involuntary_switches: 12,
        };
        let delta = after.since(&before);
        assert_eq!(delta.user, Duration::from_millis(300));
        assert_eq!(delta.system, Duration::from_millis(100));
        assert_eq!(delta.max_rss_kb, 4000);
        assert_eq!(delta.minor_faults, 20);
        assert_eq!(delta.major_faults, 0);
        assert_eq!(delta.voluntary_switches, 20);
        assert_eq!(delta.involuntary_switches, 10);
    }

    #[test]
    fn test_report_derives_rates() {
        let delta = UsageSnapshot {
            user: Duration::from_secs(3),
            system: Duration::from_secs(1),
            max_rss_kb: 2048,
            minor_faults: 100,
            major_faults: 5,
            voluntary_switches: 30,
            involuntary_switches: 10,
        };
        let report = UsageReport::from_delta(&delta, Duration::from_secs(2));
        assert!((report.cpu_percent - 200.0).abs() < 1e-9);
        assert!((report.context_switches_per_sec - 20.0).abs() < 1e-9);
        assert_eq!(report.page_faults_total, 105);
        assert_eq!(report.max_rss_kb, 2048);
    }

    #[test]
    fn test_report_zero_wall_time() {
        let report = UsageReport::from_delta(&UsageSnapshot::default(), Duration::ZERO);
        assert_eq!(report.cpu_percent, 0.0);
        assert_eq!(report.context_switches_per_sec, 0.0);
    }

    #[test]
    fn test_meter_measures_self() {
        let meter = UsageMeter::start(Strategy::Thread);
        let mut x = 0u64;
        for i in 0..100_000u64 {
            x = std::hint::black_box(x.wrapping_add(i));
        }
        let report = meter.finish();
        assert!(report.wall_secs >= 0.0);
        assert!(report.max_rss_kb > 0);
    }
}
