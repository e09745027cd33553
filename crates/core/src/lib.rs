//! Groundwater Transport Simulation Core Library
//!
//! Simulates water moving through a voxelized plot of farmland: infiltration,
//! lateral and vertical flow between soil cells, loss to edge reservoirs,
//! and plant uptake and growth, advanced in fixed time steps.
//!
//! The engine partitions the 64x64-column grid among a fixed pool of worker
//! threads and drives them through a three-phase, fully barriered protocol
//! each step, with per-slot locking on the values shared across partition
//! boundaries. Results are independent of how the grid is partitioned.

// Grid data model
pub mod grid;
pub mod plant;
pub mod soil;

// Flow engine
pub mod flow;

// Grid producers
pub mod crops;
pub mod terrain;

// Re-export the data model
pub use grid::{Cell, Direction, Farm, Point3D};
pub use plant::{Plant, PlantProperties, PlantSpecies};
pub use soil::{Soil, SoilProperties};

// Re-export the engine surface
pub use flow::{FlowConfig, FlowData, FlowError, WaterFlow};
