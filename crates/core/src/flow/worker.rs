//! Per-partition flow computation: the three phases each worker runs inside
//! the orchestrator's barrier protocol.
//!
//! A worker owns a rectangular (x, y) region spanning the full grid depth.
//! Within a phase it writes only its own head/saturation entries and the
//! locked delta/reservoir slots; neighbor state from other regions is read,
//! never written, which is safe because the authoritative volumes do not
//! change before phase 3.

use std::sync::mpsc::Receiver;
use std::sync::{Arc, Barrier};

use tracing::debug;

use super::scratch::{ScratchBuffers, AIR_SENTINEL};
use crate::grid::{Cell, Direction, Farm};

/// Saturation at or above which a cell counts as full: it joins the
/// saturated stack above a cell during head computation and stops accepting
/// lateral inflow.
pub(crate) const SATURATION_CEILING: f64 = 0.99;

/// Rectangular (x, y) partition spanning the full grid depth. Bounds are
/// half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Region {
    pub(crate) min_x: usize,
    pub(crate) max_x: usize,
    pub(crate) min_y: usize,
    pub(crate) max_y: usize,
}

impl Region {
    /// Split the grid into `count` equal rectangles by x/y midpoints:
    /// 1 is the whole grid, 2 splits x, 4 is the quadrant layout.
    pub(crate) fn partition(count: usize) -> Option<Vec<Region>> {
        let mid = Farm::SIZE / 2;
        let full = Farm::SIZE;
        let rect = |min_x, max_x, min_y, max_y| Region {
            min_x,
            max_x,
            min_y,
            max_y,
        };
        match count {
            1 => Some(vec![rect(0, full, 0, full)]),
            2 => Some(vec![rect(0, mid, 0, full), rect(mid, full, 0, full)]),
            4 => Some(vec![
                rect(0, mid, 0, mid),
                rect(mid, full, 0, mid),
                rect(0, mid, mid, full),
                rect(mid, full, mid, full),
            ]),
            _ => None,
        }
    }
}

/// Orchestrator-to-worker control messages.
pub(crate) enum Command {
    /// Run one full step: the three phases with a barrier rendezvous after
    /// each. `uptake_due` is set on the first step of a new simulated day.
    Step { uptake_due: bool },
    /// Exit the worker loop.
    Shutdown,
}

pub(crate) struct FlowWorker {
    region: Region,
    farm: Arc<Farm>,
    buffers: Arc<ScratchBuffers>,
    barrier: Arc<Barrier>,
    commands: Receiver<Command>,
    /// Simulated seconds per step.
    time_step: f64,
    plants_enabled: bool,
}

impl FlowWorker {
    pub(crate) fn new(
        region: Region,
        farm: Arc<Farm>,
        buffers: Arc<ScratchBuffers>,
        barrier: Arc<Barrier>,
        commands: Receiver<Command>,
        time_step: f64,
        plants_enabled: bool,
    ) -> Self {
        FlowWorker {
            region,
            farm,
            buffers,
            barrier,
            commands,
            time_step,
            plants_enabled,
        }
    }

    /// Thread body: idle on the command channel, run the phases when told,
    /// exit on shutdown or when the orchestrator side of the channel is
    /// gone.
    pub(crate) fn run(self) {
        debug!(region = ?self.region, "flow worker started");
        loop {
            match self.commands.recv() {
                Ok(Command::Step { uptake_due }) => {
                    self.compute_heads(uptake_due);
                    self.barrier.wait();
                    self.compute_flows();
                    self.barrier.wait();
                    self.apply_deltas();
                    self.barrier.wait();
                }
                Ok(Command::Shutdown) | Err(_) => break,
            }
        }
        debug!(region = ?self.region, "flow worker stopped");
    }

    /// Phase 1: saturation and hydraulic head for every entry in the region.
    ///
    /// z runs from the top of the grid downward so the saturated-stack scan
    /// above each cell reads entries already computed in this sweep. Plant
    /// uptake runs here, once per simulated day.
    fn compute_heads(&self, uptake_due: bool) {
        for z in (0..self.farm.z_count()).rev() {
            for y in self.region.min_y..self.region.max_y {
                for x in self.region.min_x..self.region.max_x {
                    let index = Farm::index(x, y, z);
                    let Some(cell) = self.farm.cell(x, y, z) else {
                        self.buffers.set_saturation(index, AIR_SENTINEL);
                        self.buffers.set_head(index, AIR_SENTINEL);
                        continue;
                    };

                    let saturation = percent_saturation(cell);
                    self.buffers.set_saturation(index, saturation);
                    self.buffers
                        .set_head(index, self.hydraulic_head(cell, saturation));

                    if uptake_due && self.plants_enabled {
                        self.handle_plant(cell, x, y, z);
                    }
                }
            }
        }
    }

    /// Phase 2: flow deltas for every wet cell in the region, to each of the
    /// six neighbors or, at the farm boundary, the matching edge reservoir.
    fn compute_flows(&self) {
        let z_count = self.farm.z_count();
        for z in 0..z_count {
            for y in self.region.min_y..self.region.max_y {
                for x in self.region.min_x..self.region.max_x {
                    let Some(cell) = self.farm.cell(x, y, z) else {
                        continue;
                    };
                    if cell.water_volume() <= 0.0 {
                        continue;
                    }

                    if x == 0 {
                        self.flow_to_reservoir(cell, Direction::West, y, z);
                    } else {
                        self.flow_sideways(cell, x - 1, y, z);
                    }

                    if x == Farm::SIZE - 1 {
                        self.flow_to_reservoir(cell, Direction::East, y, z);
                    } else {
                        self.flow_sideways(cell, x + 1, y, z);
                    }

                    if y == 0 {
                        self.flow_to_reservoir(cell, Direction::South, x, z);
                    } else {
                        self.flow_sideways(cell, x, y - 1, z);
                    }

                    if y == Farm::SIZE - 1 {
                        self.flow_to_reservoir(cell, Direction::North, x, z);
                    } else {
                        self.flow_sideways(cell, x, y + 1, z);
                    }

                    if z != 0 {
                        self.flow_sideways(cell, x, y, z - 1);
                    }
                    if z != z_count - 1 {
                        self.flow_upward(cell, x, y, z + 1);
                    }
                }
            }
        }
    }

    /// Phase 3: fold the accumulated deltas into the authoritative volumes.
    /// Volumes never go negative; overdraw clamps to dry.
    fn apply_deltas(&self) {
        for z in 0..self.farm.z_count() {
            for y in self.region.min_y..self.region.max_y {
                for x in self.region.min_x..self.region.max_x {
                    let Some(cell) = self.farm.cell(x, y, z) else {
                        continue;
                    };
                    let delta = self.buffers.delta(Farm::index(x, y, z));
                    cell.set_water_volume((cell.water_volume() + delta).max(0.0));
                }
            }
        }
    }

    /// Driving potential for flow: saturation times height, plus the stacked
    /// height of contiguous fully saturated cells directly above. The scan
    /// stops at the first non-saturated or absent entry.
    fn hydraulic_head(&self, cell: &Cell, saturation: f64) -> f64 {
        let p = cell.coordinate();
        let mut height_above = 0.0;
        for z in p.z + 1..self.farm.z_count() {
            if self.buffers.saturation(Farm::index(p.x, p.y, z)) < SATURATION_CEILING {
                break;
            }
            if let Some(above) = self.farm.cell(p.x, p.y, z) {
                height_above += above.height();
            }
        }
        saturation * cell.height() + height_above
    }

    /// Lateral or downward flow from `cell` toward the neighbor at the given
    /// coordinate. Never used for upward flow.
    fn flow_sideways(&self, cell: &Cell, to_x: usize, to_y: usize, to_z: usize) {
        let Some(neighbor) = self.farm.cell(to_x, to_y, to_z) else {
            return;
        };
        if !neighbor.soil().has_capacity() {
            return;
        }

        let p = cell.coordinate();
        let from = Farm::index(p.x, p.y, p.z);
        let to = Farm::index(to_x, to_y, to_z);

        if self.buffers.saturation(from) <= cell.soil().water_adhesion() {
            return;
        }
        let head = self.buffers.head(from);
        let neighbor_head = self.buffers.head(to);
        if head <= neighbor_head {
            return;
        }
        if self.buffers.saturation(to) >= SATURATION_CEILING {
            return;
        }

        let conductivity =
            0.5 * (cell.soil().hydraulic_conductivity() + neighbor.soil().hydraulic_conductivity());
        let face_area = cell.height() * Farm::CELL_SIZE_CM;
        let gradient = (head - neighbor_head).min(1.0);
        let amount = conductivity * face_area * gradient * self.time_step / Farm::CELL_SIZE_CM;

        self.buffers.transfer(from, to, amount);
    }

    /// Capillary flow from `cell` into the cell directly above it.
    fn flow_upward(&self, cell: &Cell, to_x: usize, to_y: usize, to_z: usize) {
        let Some(above) = self.farm.cell(to_x, to_y, to_z) else {
            return;
        };
        if !above.soil().has_capacity() {
            return;
        }

        let p = cell.coordinate();
        let from = Farm::index(p.x, p.y, p.z);
        let to = Farm::index(to_x, to_y, to_z);

        let saturation = self.buffers.saturation(from);
        let above_saturation = self.buffers.saturation(to);
        if saturation <= cell.soil().water_adhesion() {
            return;
        }
        if above_saturation > above.soil().water_adhesion() {
            return;
        }
        if saturation <= above_saturation {
            return;
        }

        let conductivity =
            0.5 * (cell.soil().hydraulic_conductivity() + above.soil().hydraulic_conductivity());
        let face_area = Farm::CELL_SIZE_CM * cell.height();
        let gradient = (saturation - above_saturation) / Farm::CELL_SIZE_CM;
        let amount = conductivity * face_area * gradient * self.time_step;

        self.buffers.transfer(from, to, amount);
    }

    /// Flow across the farm boundary into the matching edge reservoir slot.
    fn flow_to_reservoir(&self, cell: &Cell, direction: Direction, along: usize, z: usize) {
        let p = cell.coordinate();
        let from = Farm::index(p.x, p.y, p.z);

        if self.buffers.saturation(from) <= cell.soil().water_adhesion() {
            return;
        }

        let conductivity = cell.soil().hydraulic_conductivity();
        let face_area = Farm::CELL_SIZE_CM * cell.height();
        let gradient = (self.buffers.head(from) / Farm::CELL_SIZE_CM).min(1.0);
        let amount = conductivity * face_area * gradient * self.time_step / 10_000.0;

        self.buffers
            .transfer_to_reservoir(from, direction, along, z, amount);
    }

    /// Daily uptake for a living planting: census the root span, run the
    /// growth transition, then drain the day's consumption from the span's
    /// pending deltas, seed cell first and deeper cells after, each limited
    /// by its current volume.
    fn handle_plant(&self, cell: &Cell, x: usize, y: usize, z: usize) {
        let Some(slot) = cell.plant() else {
            return;
        };
        let mut plant = slot.lock().expect("plant state lock poisoned");
        if !plant.is_alive() {
            return;
        }

        let span = self.root_span(x, y, z, plant.root_depth_cm());
        let available: f64 = span
            .iter()
            .map(|&span_z| self.farm.cell(x, y, span_z).map_or(0.0, Cell::water_volume))
            .sum();
        plant.grow(available);

        let mut to_drink = plant.species().properties().water_consumption_ml_per_day;
        for &span_z in &span {
            if to_drink <= 0.0 {
                break;
            }
            let Some(span_cell) = self.farm.cell(x, y, span_z) else {
                continue;
            };
            let drained = span_cell.water_volume().min(to_drink);
            self.buffers.add_delta(Farm::index(x, y, span_z), -drained);
            to_drink -= drained;
        }
    }

    /// Cells covered by a root of the given length, walking downward from
    /// the seed cell. The seed cell is always included.
    fn root_span(&self, x: usize, y: usize, seed_z: usize, root_depth_cm: f64) -> Vec<usize> {
        let mut span = Vec::new();
        let mut remaining = root_depth_cm;
        let mut z = seed_z;
        loop {
            let Some(cell) = self.farm.cell(x, y, z) else {
                break;
            };
            span.push(z);
            remaining -= cell.height();
            if remaining <= 0.0 || z == 0 {
                break;
            }
            z -= 1;
        }
        span
    }
}

/// Percent saturation of a cell. Zero-capacity soils are defined as 0 and
/// never divided.
pub(crate) fn percent_saturation(cell: &Cell) -> f64 {
    if cell.soil().has_capacity() {
        cell.water_volume() / cell.soil().water_capacity()
    } else {
        0.0
    }
}

/// Total water volume over one region (mL), read with the same atomic access
/// the apply phase writes with, so a concurrent phase 3 cannot produce a
/// torn value.
pub(crate) fn total_water(farm: &Farm, region: Region) -> f64 {
    let mut total = 0.0;
    for z in 0..farm.z_count() {
        for y in region.min_y..region.max_y {
            for x in region.min_x..region.max_x {
                if let Some(cell) = farm.cell(x, y, z) {
                    total += cell.water_volume();
                }
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Point3D;
    use crate::soil::Soil;
    use approx::assert_relative_eq;
    use std::sync::mpsc;

    fn ground_cell(x: usize, y: usize, z: usize, soil: Soil, volume: f64) -> Cell {
        let cell = Cell::new(100.0, 0.0, false, Point3D::new(x, y, z), soil);
        cell.set_water_volume(volume);
        cell
    }

    fn single_region_worker(farm: Arc<Farm>) -> (FlowWorker, Arc<ScratchBuffers>) {
        let buffers = Arc::new(ScratchBuffers::new(farm.z_count()));
        let barrier = Arc::new(Barrier::new(1));
        let (_tx, rx) = mpsc::channel();
        let region = Region::partition(1).unwrap()[0];
        let worker = FlowWorker::new(
            region,
            farm,
            Arc::clone(&buffers),
            barrier,
            rx,
            1000.0,
            false,
        );
        (worker, buffers)
    }

    #[test]
    fn test_partitions_cover_the_grid_disjointly() {
        for count in [1, 2, 4] {
            let regions = Region::partition(count).unwrap();
            assert_eq!(regions.len(), count);

            let mut covered = vec![false; Farm::SIZE * Farm::SIZE];
            for region in regions {
                for y in region.min_y..region.max_y {
                    for x in region.min_x..region.max_x {
                        let index = y * Farm::SIZE + x;
                        assert!(!covered[index], "column ({x}, {y}) covered twice");
                        covered[index] = true;
                    }
                }
            }
            assert!(covered.iter().all(|&c| c));
        }
        assert!(Region::partition(3).is_none());
        assert!(Region::partition(0).is_none());
    }

    #[test]
    fn test_percent_saturation_special_cases_zero_capacity() {
        let wet_sand = ground_cell(0, 0, 0, Soil::GilaSand, 0.34);
        assert_relative_eq!(percent_saturation(&wet_sand), 2.0);

        let wet_wash = ground_cell(0, 0, 0, Soil::Riverwash, 50.0);
        assert_eq!(percent_saturation(&wet_wash), 0.0);
        assert!(percent_saturation(&wet_wash).is_finite());
    }

    #[test]
    fn test_head_accumulates_saturated_stack_above() {
        let mut farm = Farm::new(4);
        // Column of three cells; the two above the bottom one are saturated
        farm.set_cell(ground_cell(1, 1, 0, Soil::GilaSand, 0.085)); // sat 0.5
        farm.set_cell(ground_cell(1, 1, 1, Soil::GilaSand, 0.17)); // sat 1.0
        farm.set_cell(ground_cell(1, 1, 2, Soil::GilaSand, 0.17)); // sat 1.0
        let farm = Arc::new(farm);
        let (worker, buffers) = single_region_worker(Arc::clone(&farm));

        worker.compute_heads(false);

        // Bottom cell: 0.5 * 100 + two full 100 cm cells stacked above
        assert_relative_eq!(buffers.head(Farm::index(1, 1, 0)), 250.0, epsilon = 1e-9);
        // Middle cell: 1.0 * 100 + one full cell above
        assert_relative_eq!(buffers.head(Farm::index(1, 1, 1)), 200.0, epsilon = 1e-9);
        // Air entries carry the sentinel
        assert_eq!(buffers.saturation(Farm::index(1, 1, 3)), AIR_SENTINEL);
        assert_eq!(buffers.head(Farm::index(0, 0, 0)), AIR_SENTINEL);
    }

    #[test]
    fn test_root_span_walks_downward_from_seed() {
        let mut farm = Farm::new(4);
        for z in 0..3 {
            farm.set_cell(ground_cell(2, 2, z, Soil::GilaSand, 0.0));
        }
        let farm = Arc::new(farm);
        let (worker, _buffers) = single_region_worker(farm);

        // Zero root depth still covers the seed cell
        assert_eq!(worker.root_span(2, 2, 2, 0.0), vec![2]);
        // 150 cm of root spans two 100 cm cells
        assert_eq!(worker.root_span(2, 2, 2, 150.0), vec![2, 1]);
        // A root longer than the column stops at the grid bottom
        assert_eq!(worker.root_span(2, 2, 2, 1000.0), vec![2, 1, 0]);
    }
}
