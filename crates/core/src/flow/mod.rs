//! Flow orchestration: the simulation clock, the shared scratch buffers, and
//! the three-phase barrier protocol that drives the worker pool.
//!
//! Each step is exactly three phases with full synchronization between them:
//! no worker reads phase N+1 inputs before every worker has finished writing
//! phase N outputs. The orchestrator participates in each barrier rendezvous,
//! so when the third one releases it knows the step is complete, zeroes the
//! scratch buffers, and advances the clock.

mod exchange;
mod scratch;
mod worker;

pub use exchange::FlowData;

use std::fmt;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use self::scratch::ScratchBuffers;
use self::worker::{Command, FlowWorker, Region};
use crate::grid::{Direction, Farm};

/// Seconds in a simulated day, the plant-uptake cadence.
const SECONDS_PER_DAY: u64 = 86_400;

/// Runtime engine configuration. The defaults reproduce the reference
/// deployment: 1000-second steps across four quadrant workers, rain every
/// 1000 steps, boundary exchange every 15, a report every 200.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Simulated seconds per step.
    pub time_step_secs: u64,
    /// Worker threads the grid is partitioned across (1, 2 or 4).
    pub worker_count: usize,
    /// Whether periodic rain events fire.
    pub rain_enabled: bool,
    /// Steps between rain events.
    pub rain_interval_steps: u64,
    /// Rain delivered to each surface cell per event (mL).
    pub rain_amount_ml: f64,
    /// Whether plants drink and grow.
    pub plants_enabled: bool,
    /// Whether boundary reservoirs are exchanged. With a single farm the
    /// exchange is a loopback onto the opposing edges.
    pub exchange_enabled: bool,
    /// Steps between boundary exchanges.
    pub exchange_interval_steps: u64,
    /// Steps between progress reports.
    pub report_interval_steps: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        FlowConfig {
            time_step_secs: 1000,
            worker_count: 4,
            rain_enabled: true,
            rain_interval_steps: 1000,
            rain_amount_ml: 11.0,
            plants_enabled: true,
            exchange_enabled: true,
            exchange_interval_steps: 15,
            report_interval_steps: 200,
        }
    }
}

/// Configuration rejected at engine construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// The grid cannot be split into the requested number of partitions.
    UnsupportedWorkerCount(usize),
    /// The time step must be a positive number of seconds.
    ZeroTimeStep,
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::UnsupportedWorkerCount(count) => write!(
                f,
                "cannot partition a {size}x{size} grid into {count} worker regions (supported: 1, 2, 4)",
                size = Farm::SIZE
            ),
            FlowError::ZeroTimeStep => write!(f, "time step must be at least one second"),
        }
    }
}

impl std::error::Error for FlowError {}

/// The flow engine: owns the clock and scratch buffers, partitions the farm
/// among a fixed pool of long-lived worker threads, and drives the
/// three-phase barrier protocol each step.
pub struct WaterFlow {
    farm: Arc<Farm>,
    buffers: Arc<ScratchBuffers>,
    config: FlowConfig,
    regions: Vec<Region>,
    barrier: Arc<Barrier>,
    senders: Vec<Sender<Command>>,
    handles: Vec<JoinHandle<()>>,
    /// Simulated seconds elapsed.
    simulated_time: u64,
    /// Steps completed.
    steps: u64,
    /// Wall-clock time spent stepping.
    real_time: Duration,
}

impl WaterFlow {
    /// Spawn the worker pool over the given farm.
    ///
    /// The engine holds a reference to the farm and mutates cell contents in
    /// place; it never changes the grid's dimensions.
    ///
    /// # Errors
    ///
    /// Rejects a zero time step and worker counts the grid cannot be
    /// partitioned into.
    pub fn new(farm: Arc<Farm>, config: FlowConfig) -> Result<Self, FlowError> {
        if config.time_step_secs == 0 {
            return Err(FlowError::ZeroTimeStep);
        }
        let regions = Region::partition(config.worker_count)
            .ok_or(FlowError::UnsupportedWorkerCount(config.worker_count))?;

        let buffers = Arc::new(ScratchBuffers::new(farm.z_count()));
        let barrier = Arc::new(Barrier::new(regions.len() + 1));
        let mut senders = Vec::with_capacity(regions.len());
        let mut handles = Vec::with_capacity(regions.len());

        for (id, &region) in regions.iter().enumerate() {
            let (sender, receiver) = mpsc::channel();
            let flow_worker = FlowWorker::new(
                region,
                Arc::clone(&farm),
                Arc::clone(&buffers),
                Arc::clone(&barrier),
                receiver,
                config.time_step_secs as f64,
                config.plants_enabled,
            );
            let handle = thread::Builder::new()
                .name(format!("flow-worker-{id}"))
                .spawn(move || flow_worker.run())
                .expect("failed to spawn flow worker");
            senders.push(sender);
            handles.push(handle);
        }

        debug!(
            workers = regions.len(),
            z_count = farm.z_count(),
            "flow engine started"
        );

        Ok(WaterFlow {
            farm,
            buffers,
            config,
            regions,
            barrier,
            senders,
            handles,
            simulated_time: 0,
            steps: 0,
            real_time: Duration::ZERO,
        })
    }

    /// Run the model for at least `seconds` of simulated time.
    ///
    /// The fixed time step may not divide the duration evenly; the model
    /// then simulates slightly past the requested horizon.
    pub fn run(&mut self, seconds: u64) {
        let mut elapsed = 0_u64;
        while elapsed < seconds {
            let started = Instant::now();

            if self.steps % self.config.report_interval_steps == 0 {
                self.report();
            }
            if self.config.exchange_enabled
                && self.steps != 0
                && self.steps % self.config.exchange_interval_steps == 0
            {
                self.exchange_boundaries();
            }
            if self.config.rain_enabled && self.steps % self.config.rain_interval_steps == 0 {
                self.rain(self.config.rain_amount_ml);
            }

            self.step();
            self.real_time += started.elapsed();
            elapsed += self.config.time_step_secs;
        }
    }

    /// Advance the model one time step: three fully barriered phases, then
    /// clear the scratch buffers and advance the clock.
    pub fn step(&mut self) {
        let uptake_due = self.simulated_time != 0
            && self.simulated_time % SECONDS_PER_DAY < self.config.time_step_secs;
        for sender in &self.senders {
            sender
                .send(Command::Step { uptake_due })
                .expect("flow worker channel closed");
        }

        // One rendezvous per phase boundary; the workers run the phases in
        // between.
        self.barrier.wait();
        self.barrier.wait();
        self.barrier.wait();

        self.buffers.zero_step_buffers();
        self.simulated_time += self.config.time_step_secs;
        self.steps += 1;
    }

    /// Add `amount_ml` to the pending delta of every surface cell,
    /// simulating a rainstorm landing within one time step. Non-surface and
    /// air cells are untouched.
    pub fn rain(&self, amount_ml: f64) {
        for z in 0..self.farm.z_count() {
            for y in 0..Farm::SIZE {
                for x in 0..Farm::SIZE {
                    let Some(cell) = self.farm.cell(x, y, z) else {
                        continue;
                    };
                    if cell.is_surface() {
                        self.buffers.add_delta(Farm::index(x, y, z), amount_ml);
                    }
                }
            }
        }
    }

    /// Package each edge's reservoir bank into a directional payload and
    /// apply it to the opposing edge, then zero the reservoirs. A multi-farm
    /// deployment would ship the payloads to neighboring farms instead; a
    /// single farm receives its own outflow back.
    pub fn exchange_boundaries(&self) {
        for direction in Direction::ALL {
            let payload = FlowData::from_reservoirs(&self.buffers, direction);
            self.flow_into_farm(&payload);
        }
        self.buffers.zero_reservoirs();
    }

    /// Apply water arriving from a neighboring farm to this farm's pending
    /// deltas. Payload entries outside the grid's dimensions are ignored.
    pub fn flow_into_farm(&self, data: &FlowData) {
        exchange::flow_into_farm(&self.farm, &self.buffers, data);
    }

    /// Total water in the system: every cell plus every edge reservoir (mL).
    pub fn total_system_water(&self) -> f64 {
        let cells: f64 = self
            .regions
            .iter()
            .map(|&region| worker::total_water(&self.farm, region))
            .sum();
        cells + self.buffers.reservoir_total()
    }

    /// Water held in the edge reservoirs (mL).
    pub fn reservoir_water(&self) -> f64 {
        self.buffers.reservoir_total()
    }

    /// Water in one reservoir slot (mL): `along` indexes the edge, `z` the
    /// depth.
    pub fn reservoir(&self, direction: Direction, along: usize, z: usize) -> f64 {
        self.buffers.reservoir(direction, along, z)
    }

    /// Simulated seconds elapsed.
    pub fn simulated_time(&self) -> u64 {
        self.simulated_time
    }

    /// Steps completed.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Stop the worker pool and wait for every thread to exit. Idempotent;
    /// also runs on drop.
    pub fn shutdown(&mut self) {
        for sender in &self.senders {
            // A worker that already exited has dropped its receiver; that is
            // fine, join below still completes.
            let _ = sender.send(Command::Shutdown);
        }
        self.senders.clear();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("flow worker exited with a panic");
            }
        }
    }

    fn report(&self) {
        let total = self.total_system_water();
        let avg_step_ms = if self.steps == 0 {
            0
        } else {
            self.real_time.as_millis() / u128::from(self.steps)
        };
        if let Some(cell) = self.farm.surface_cell() {
            let p = cell.coordinate();
            info!(
                "{:.3} mL in system; {:.3} mL in surface cell ({}, {}, {}); {} s simulated; {} ms avg per step",
                total,
                cell.water_volume(),
                p.x,
                p.y,
                p.z,
                self.simulated_time,
                avg_step_ms
            );
        } else {
            info!(
                "{:.3} mL in system; no surface cell; {} s simulated; {} ms avg per step",
                total, self.simulated_time, avg_step_ms
            );
        }
    }
}

impl Drop for WaterFlow {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Cell, Point3D};
    use crate::soil::Soil;

    fn flat_farm(z_count: usize) -> Farm {
        let mut farm = Farm::new(z_count);
        for z in 0..z_count - 1 {
            for y in 0..Farm::SIZE {
                for x in 0..Farm::SIZE {
                    farm.set_cell(Cell::new(
                        100.0,
                        ((z_count - 2 - z) * 100) as f64,
                        z == z_count - 2,
                        Point3D::new(x, y, z),
                        Soil::GilaSand,
                    ));
                }
            }
        }
        farm
    }

    fn quiet_config(worker_count: usize) -> FlowConfig {
        FlowConfig {
            worker_count,
            rain_enabled: false,
            plants_enabled: false,
            exchange_enabled: false,
            ..FlowConfig::default()
        }
    }

    #[test]
    fn test_construction_rejects_bad_config() {
        let farm = Arc::new(flat_farm(2));

        let three_workers = WaterFlow::new(Arc::clone(&farm), quiet_config(3));
        assert_eq!(
            three_workers.err(),
            Some(FlowError::UnsupportedWorkerCount(3))
        );

        let mut config = quiet_config(4);
        config.time_step_secs = 0;
        let no_time = WaterFlow::new(farm, config);
        assert_eq!(no_time.err(), Some(FlowError::ZeroTimeStep));
    }

    #[test]
    fn test_step_advances_clock_and_counters() {
        let farm = Arc::new(flat_farm(2));
        let mut flow = WaterFlow::new(farm, quiet_config(4)).unwrap();

        flow.step();
        flow.step();
        assert_eq!(flow.steps(), 2);
        assert_eq!(flow.simulated_time(), 2000);
        flow.shutdown();
    }

    #[test]
    fn test_run_overshoots_to_step_boundary() {
        let farm = Arc::new(flat_farm(2));
        let mut flow = WaterFlow::new(farm, quiet_config(1)).unwrap();

        flow.run(2500);
        assert_eq!(flow.simulated_time(), 3000);
        flow.shutdown();
    }

    #[test]
    fn test_shutdown_is_idempotent_and_joins() {
        let farm = Arc::new(flat_farm(2));
        let mut flow = WaterFlow::new(farm, quiet_config(4)).unwrap();

        flow.step();
        flow.shutdown();
        flow.shutdown();
        // Drop runs shutdown again; nothing to join twice.
    }
}
