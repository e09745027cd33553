//! Engine-lifetime scratch state shared between the orchestrator and the
//! worker pool.
//!
//! Head and saturation are flat atomic arrays: each slot has exactly one
//! writer during phase 1 and is only read during phase 2, with the step
//! barrier providing the ordering in between. Pending deltas and the edge
//! reservoirs take paired read-modify-write traffic from multiple workers,
//! so each slot sits behind its own mutex and paired transfers follow a
//! fixed acquisition order: cell slots by ascending linear index, a
//! reservoir slot always after the cell slot it is paired with. Workers
//! reaching the same boundary pair from opposite sides therefore cannot
//! deadlock.

use std::sync::Mutex;

use crate::grid::{AtomicF64, Direction, Farm};

/// Sentinel stored in the head/saturation buffers for air entries. The
/// saturated-stack scan in phase 1 relies on it to stop at absent cells.
pub(crate) const AIR_SENTINEL: f64 = -1.0;

pub(crate) struct ScratchBuffers {
    /// Hydraulic head per cell.
    head: Vec<AtomicF64>,
    /// Percent saturation per cell.
    saturation: Vec<AtomicF64>,
    /// Pending water change per cell (mL), applied in phase 3.
    delta: Vec<Mutex<f64>>,
    /// Edge reservoirs: 4 banks of `SIZE * z_count` slots.
    reservoirs: Vec<Mutex<f64>>,
    z_count: usize,
}

impl ScratchBuffers {
    pub(crate) fn new(z_count: usize) -> Self {
        let cells = Farm::SIZE * Farm::SIZE * z_count;
        ScratchBuffers {
            head: (0..cells).map(|_| AtomicF64::new(0.0)).collect(),
            saturation: (0..cells).map(|_| AtomicF64::new(0.0)).collect(),
            delta: (0..cells).map(|_| Mutex::new(0.0)).collect(),
            reservoirs: (0..4 * Farm::SIZE * z_count)
                .map(|_| Mutex::new(0.0))
                .collect(),
            z_count,
        }
    }

    /// Slot index within a reservoir bank.
    #[inline]
    fn reservoir_index(&self, direction: Direction, along: usize, z: usize) -> usize {
        direction.index() * (Farm::SIZE * self.z_count) + along * self.z_count + z
    }

    #[inline]
    pub(crate) fn head(&self, index: usize) -> f64 {
        self.head[index].load()
    }

    #[inline]
    pub(crate) fn set_head(&self, index: usize, value: f64) {
        self.head[index].store(value);
    }

    #[inline]
    pub(crate) fn saturation(&self, index: usize) -> f64 {
        self.saturation[index].load()
    }

    #[inline]
    pub(crate) fn set_saturation(&self, index: usize, value: f64) {
        self.saturation[index].store(value);
    }

    /// Add into a single pending-delta slot.
    pub(crate) fn add_delta(&self, index: usize, amount: f64) {
        *self.delta[index].lock().expect("delta slot lock poisoned") += amount;
    }

    /// Pending delta for one cell.
    pub(crate) fn delta(&self, index: usize) -> f64 {
        *self.delta[index].lock().expect("delta slot lock poisoned")
    }

    /// Move `amount` from one cell's pending delta to another's as a single
    /// atomic unit. Locks are taken in ascending slot order.
    pub(crate) fn transfer(&self, from: usize, to: usize, amount: f64) {
        debug_assert_ne!(from, to);
        let (lo, hi) = (from.min(to), from.max(to));
        let mut lo_slot = self.delta[lo].lock().expect("delta slot lock poisoned");
        let mut hi_slot = self.delta[hi].lock().expect("delta slot lock poisoned");
        if lo == from {
            *lo_slot -= amount;
            *hi_slot += amount;
        } else {
            *hi_slot -= amount;
            *lo_slot += amount;
        }
    }

    /// Move `amount` from a cell's pending delta into an edge reservoir slot
    /// as a single atomic unit. The cell slot is locked first.
    pub(crate) fn transfer_to_reservoir(
        &self,
        from: usize,
        direction: Direction,
        along: usize,
        z: usize,
        amount: f64,
    ) {
        let slot = self.reservoir_index(direction, along, z);
        let mut cell = self.delta[from].lock().expect("delta slot lock poisoned");
        let mut reservoir = self.reservoirs[slot]
            .lock()
            .expect("reservoir slot lock poisoned");
        *cell -= amount;
        *reservoir += amount;
    }

    /// Water accumulated in one reservoir slot (mL).
    pub(crate) fn reservoir(&self, direction: Direction, along: usize, z: usize) -> f64 {
        *self.reservoirs[self.reservoir_index(direction, along, z)]
            .lock()
            .expect("reservoir slot lock poisoned")
    }

    /// Total water across all four reservoir banks (mL).
    pub(crate) fn reservoir_total(&self) -> f64 {
        self.reservoirs
            .iter()
            .map(|slot| *slot.lock().expect("reservoir slot lock poisoned"))
            .sum()
    }

    /// Snapshot one reservoir bank as `[along][depth]` rows.
    pub(crate) fn reservoir_bank(&self, direction: Direction) -> Vec<Vec<f64>> {
        (0..Farm::SIZE)
            .map(|along| {
                (0..self.z_count)
                    .map(|z| self.reservoir(direction, along, z))
                    .collect()
            })
            .collect()
    }

    /// Zero the per-step buffers: head, saturation, pending deltas.
    /// Reservoirs persist across steps until a boundary exchange drains them.
    pub(crate) fn zero_step_buffers(&self) {
        for slot in &self.head {
            slot.store(0.0);
        }
        for slot in &self.saturation {
            slot.store(0.0);
        }
        for slot in &self.delta {
            *slot.lock().expect("delta slot lock poisoned") = 0.0;
        }
    }

    /// Zero all four reservoir banks after an exchange.
    pub(crate) fn zero_reservoirs(&self) {
        for slot in &self.reservoirs {
            *slot.lock().expect("reservoir slot lock poisoned") = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_transfer_conserves_delta_sum() {
        let buffers = ScratchBuffers::new(2);
        buffers.transfer(3, 7, 1.5);
        buffers.transfer(7, 3, 0.25);

        assert_eq!(buffers.delta(3), -1.25);
        assert_eq!(buffers.delta(7), 1.25);
    }

    #[test]
    fn test_reservoir_transfer_and_bank_snapshot() {
        let buffers = ScratchBuffers::new(2);
        buffers.transfer_to_reservoir(0, Direction::West, 5, 1, 2.0);

        assert_eq!(buffers.delta(0), -2.0);
        assert_eq!(buffers.reservoir(Direction::West, 5, 1), 2.0);
        assert_eq!(buffers.reservoir(Direction::East, 5, 1), 0.0);
        assert_eq!(buffers.reservoir_total(), 2.0);

        let bank = buffers.reservoir_bank(Direction::West);
        assert_eq!(bank.len(), Farm::SIZE);
        assert_eq!(bank[5][1], 2.0);
        assert_eq!(bank[5][0], 0.0);

        buffers.zero_reservoirs();
        assert_eq!(buffers.reservoir_total(), 0.0);
    }

    #[test]
    fn test_opposing_transfers_do_not_deadlock() {
        // Two threads hammer the same slot pair from opposite sides; the
        // ordered acquisition means this finishes instead of deadlocking,
        // and the net movement is exact.
        let buffers = Arc::new(ScratchBuffers::new(1));
        let forward = Arc::clone(&buffers);
        let backward = Arc::clone(&buffers);

        let a = thread::spawn(move || {
            for _ in 0..10_000 {
                forward.transfer(11, 12, 1.0);
            }
        });
        let b = thread::spawn(move || {
            for _ in 0..10_000 {
                backward.transfer(12, 11, 1.0);
            }
        });
        a.join().unwrap();
        b.join().unwrap();

        assert_eq!(buffers.delta(11), 0.0);
        assert_eq!(buffers.delta(12), 0.0);
    }

    #[test]
    fn test_zeroing_step_buffers_leaves_reservoirs() {
        let buffers = ScratchBuffers::new(1);
        buffers.set_head(0, 3.0);
        buffers.set_saturation(0, 0.5);
        buffers.add_delta(0, 4.0);
        buffers.transfer_to_reservoir(1, Direction::North, 0, 0, 1.0);

        buffers.zero_step_buffers();
        assert_eq!(buffers.head(0), 0.0);
        assert_eq!(buffers.saturation(0), 0.0);
        assert_eq!(buffers.delta(0), 0.0);
        assert_eq!(buffers.delta(1), 0.0);
        assert_eq!(buffers.reservoir(Direction::North, 0, 0), 1.0);
    }
}
