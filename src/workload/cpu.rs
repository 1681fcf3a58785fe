//! CPU-bound generator: trial-division prime search over a sliding window

use std::hint::black_box;

use super::{UnitContext, WorkloadOutcome};
use crate::config::WorkloadKind;

/// Trial division up to the integer square root of `n`
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    let mut divisor = 2u64;
    while within_root(divisor, n) {
        if n % divisor == 0 {
            return false;
        }
        divisor += 1;
    }
    true
}

/// `divisor * divisor <= n`, without overflowing near `u64::MAX`
fn within_root(divisor: u64, n: u64) -> bool {
    divisor <= n / divisor
}

/// Number of primes in `[start, end)`
pub fn count_primes(start: u64, end: u64) -> u64 {
    (start..end).filter(|&n| is_prime(n)).count() as u64
}

pub(super) fn run(ctx: &UnitContext<'_>) -> WorkloadOutcome {
    let params = ctx.params;
    let mut outcome = WorkloadOutcome::new(WorkloadKind::Cpu);
    let mut prime_count = 0u64;

    for iteration in 0..params.loop_count {
        let start = params.cpu_start + iteration * params.cpu_window;
        prime_count += count_primes(black_box(start), start + params.cpu_window);
        outcome.iterations += 1;
    }

    outcome.observed = black_box(prime_count);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadParams;
    use crate::unit::ContextId;

    #[test]
    fn test_is_prime_known_values() {
        assert!(is_prime(1_000_003));
        assert!(!is_prime(1_000_000));
        assert!(is_prime(2));
        assert!(is_prime(3));
        assert!(!is_prime(1));
        assert!(!is_prime(0));
        assert!(!is_prime(4));
        assert!(!is_prime(1_000_001)); // 101 * 9901
    }

    #[test]
    fn test_within_root_near_u64_max() {
        let root = u64::from(u32::MAX);
        assert!(within_root(root, u64::MAX));
        assert!(!within_root(root + 1, u64::MAX));
        assert!(!is_prime(u64::MAX));
        assert!(!is_prime(u64::MAX - 1));
    }

    #[test]
    fn test_is_prime_square_of_prime() {
        assert!(!is_prime(49));
        assert!(!is_prime(1_009 * 1_009));
    }

    #[test]
    fn test_count_primes_small_range() {
        // 2, 3, 5, 7
        assert_eq!(count_primes(0, 10), 4);
        assert_eq!(count_primes(10, 10), 0);
    }

    #[test]
    fn test_run_scans_sliding_windows() {
        let params = WorkloadParams::new()
            .with_loop_count(3)
            .with_cpu_window(100);
        let ctx = UnitContext {
            index: 0,
            identity: ContextId(0),
            params: &params,
            fault: None,
        };
        let outcome = run(&ctx);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.observed, count_primes(1_000_000, 1_000_300));
        assert!(outcome.is_success());
    }

    #[test]
    fn test_run_zero_iterations() {
        let params = WorkloadParams::new().with_loop_count(0);
        let ctx = UnitContext {
            index: 0,
            identity: ContextId(0),
            params: &params,
            fault: None,
        };
        let outcome = run(&ctx);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.observed, 0);
    }
}
