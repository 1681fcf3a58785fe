//! Memory-bound generator: a ring of large buffers, refilled and scanned
//!
//! Each iteration replaces the buffer in slot `i % slots` with a freshly
//! allocated one, fills it with a byte derived from the iteration index and
//! reads it back in strided passes. Buffers are owned by the ring, so a slot
//! being overwritten or the ring being dropped releases them.

use std::hint::black_box;

use super::{RingStats, UnitContext, WorkloadOutcome};
use crate::chaos::Fault;
use crate::config::WorkloadKind;

/// Fixed-capacity ring of owned buffers
#[derive(Debug)]
pub struct BufferRing {
    slots: Vec<Option<Vec<u8>>>,
}

impl BufferRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity.max(1)).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot used by `iteration`
    pub fn slot_for(&self, iteration: u64) -> usize {
        (iteration % self.slots.len() as u64) as usize
    }

    /// Drop the buffer in `slot`. Returns whether one was there.
    pub fn release(&mut self, slot: usize) -> bool {
        self.slots[slot].take().is_some()
    }

    /// Store `buffer` in `slot`, releasing any previous occupant
    pub fn install(&mut self, slot: usize, buffer: Vec<u8>) -> &mut [u8] {
        self.slots[slot].insert(buffer)
    }

    /// Number of occupied slots
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Release every occupied slot, returning how many there were
    pub fn release_all(&mut self) -> usize {
        self.slots
            .iter_mut()
            .filter_map(Option::take)
            .count()
    }
}

/// Allocate `size` bytes filled with `fill`, or `None` if the allocator refuses
pub fn allocate_filled(size: usize, fill: u8) -> Option<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(size).ok()?;
    buffer.resize(size, fill);
    Some(buffer)
}

/// Sum every `stride`-th byte, `passes` times over
pub fn strided_checksum(buffer: &[u8], passes: usize, stride: usize) -> u64 {
    let stride = stride.max(1);
    let mut sum = 0u64;
    for _ in 0..passes {
        for byte in buffer.iter().step_by(stride) {
            sum = sum.wrapping_add(u64::from(black_box(*byte)));
        }
    }
    sum
}

pub(super) fn run(ctx: &UnitContext<'_>) -> WorkloadOutcome {
    let mut ring = BufferRing::new(ctx.params.mem_slots);
    run_with_ring(ctx, &mut ring)
}

/// Run the generator against a caller-owned ring
///
/// The ring is empty again when this returns.
pub fn run_with_ring(ctx: &UnitContext<'_>, ring: &mut BufferRing) -> WorkloadOutcome {
    let params = ctx.params;
    let mut outcome = WorkloadOutcome::new(WorkloadKind::Memory);
    let mut checksum = 0u64;

    for iteration in 0..params.loop_count {
        outcome.iterations += 1;
        let slot = ring.slot_for(iteration);
        ring.release(slot);

        let fill = (iteration % 256) as u8;
        let buffer = if ctx.injects(Fault::AllocFailure, iteration) {
            None
        } else {
            allocate_filled(params.mem_buffer_bytes, fill)
        };

        let Some(buffer) = buffer else {
            tracing::warn!(
                unit = ctx.index,
                iteration,
                bytes = params.mem_buffer_bytes,
                "allocation failed, skipping iteration"
            );
            outcome.failed_iterations += 1;
            continue;
        };

        let buffer = ring.install(slot, buffer);
        let sum = strided_checksum(buffer, params.mem_passes, params.mem_stride);
        if sum == 0 {
            if let Some(first) = buffer.first_mut() {
                *first = 1;
            }
        }
        checksum = checksum.wrapping_add(sum);
    }

    let live_at_loop_end = ring.live();
    let released_on_teardown = ring.release_all();
    outcome.ring = Some(RingStats {
        live_at_loop_end,
        released_on_teardown,
    });
    outcome.observed = black_box(checksum);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadParams;
    use crate::unit::ContextId;

    fn small_params(loop_count: u64) -> WorkloadParams {
        WorkloadParams::new()
            .with_loop_count(loop_count)
            .with_mem_buffer_bytes(4096)
    }

    fn ctx(params: &WorkloadParams, fault: Option<Fault>) -> UnitContext<'_> {
        UnitContext {
            index: 0,
            identity: ContextId(0),
            params,
            fault,
        }
    }

    #[test]
    fn test_ring_install_and_release() {
        let mut ring = BufferRing::new(3);
        assert_eq!(ring.live(), 0);

        ring.install(0, vec![1; 8]);
        ring.install(2, vec![2; 8]);
        assert_eq!(ring.live(), 2);

        assert!(ring.release(0));
        assert!(!ring.release(0));
        assert_eq!(ring.live(), 1);

        assert_eq!(ring.release_all(), 1);
        assert_eq!(ring.live(), 0);
    }

    #[test]
    fn test_ring_overwrite_keeps_one_buffer_per_slot() {
        let mut ring = BufferRing::new(2);
        ring.install(1, vec![0; 4]);
        ring.install(1, vec![9; 4]);
        assert_eq!(ring.live(), 1);
    }

    #[test]
    fn test_ring_slot_wraps() {
        let ring = BufferRing::new(20);
        assert_eq!(ring.slot_for(0), 0);
        assert_eq!(ring.slot_for(19), 19);
        assert_eq!(ring.slot_for(20), 0);
        assert_eq!(ring.slot_for(45), 5);
    }

    #[test]
    fn test_strided_checksum() {
        let buffer = vec![2u8; 256];
        // 4 samples per pass at stride 64
        assert_eq!(strided_checksum(&buffer, 5, 64), 2 * 4 * 5);
        assert_eq!(strided_checksum(&buffer, 0, 64), 0);
    }

    #[test]
    fn test_allocate_filled() {
        let buffer = allocate_filled(128, 7).unwrap();
        assert_eq!(buffer.len(), 128);
        assert!(buffer.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_ring_full_after_long_run() {
        let params = small_params(25);
        let outcome = run(&ctx(&params, None));
        let ring = outcome.ring.unwrap();
        assert_eq!(ring.live_at_loop_end, 20);
        assert_eq!(ring.released_on_teardown, 20);
        assert_eq!(outcome.iterations, 25);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_ring_partially_filled_after_short_run() {
        let params = small_params(7);
        let mut ring = BufferRing::new(params.mem_slots);
        let outcome = run_with_ring(&ctx(&params, None), &mut ring);
        assert_eq!(outcome.ring.unwrap().live_at_loop_end, 7);
        assert_eq!(ring.live(), 0);
    }

    #[test]
    fn test_checksum_is_deterministic() {
        // 4096 bytes at stride 64 -> 64 samples per pass, 5 passes
        let params = small_params(3);
        let outcome = run(&ctx(&params, None));
        let expected: u64 = (0..3u64).map(|i| i * 64 * 5).sum();
        assert_eq!(outcome.observed, expected);
    }

    #[test]
    fn test_alloc_failure_skips_only_that_iteration() {
        let params = small_params(5);
        let mut ring = BufferRing::new(params.mem_slots);
        let outcome = run_with_ring(&ctx(&params, Some(Fault::AllocFailure)), &mut ring);
        assert_eq!(outcome.iterations, 5);
        assert_eq!(outcome.failed_iterations, 1);
        assert_eq!(outcome.ring.unwrap().live_at_loop_end, 4);
        assert_eq!(ring.live(), 0);
    }
}
