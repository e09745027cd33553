//! Passive grid store: soil cells and the farm that owns them.
//!
//! A `Farm` exclusively owns a fixed 64x64 column grid of variable depth.
//! Absent entries are air above the ground surface and are excluded from all
//! computation. Water volume and plant state are interior-mutable so the flow
//! engine can update them through shared references; everything structural is
//! fixed once the terrain generator has produced the grid.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::plant::Plant;
use crate::soil::Soil;

/// Integer (x, y, z) index into the grid.
pub type Point3D = nalgebra::Point3<usize>;

/// Cardinal edge of the farm. The index doubles as the reservoir bank slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// All four edges in reservoir-bank order.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Reservoir bank index for this edge.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::East => 1,
            Direction::South => 2,
            Direction::West => 3,
        }
    }
}

/// An `f64` stored as bits in an `AtomicU64`.
///
/// Every slot is single-writer within a phase and the step barrier provides
/// the cross-thread ordering, so relaxed loads and stores suffice; readers
/// can never observe a torn value.
#[derive(Debug)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// An individual soil voxel within the farm grid.
#[derive(Debug)]
pub struct Cell {
    /// Vertical extent (cm).
    height: f64,
    /// Distance to the ground surface (cm).
    depth: f64,
    /// True for the topmost ground cell of a column.
    surface: bool,
    coordinate: Point3D,
    soil: Soil,
    /// Stored water (mL). Atomic so the engine can update it in place.
    water_volume: AtomicF64,
    /// Per-planting growth state, present only on seeded cells.
    plant: Option<Mutex<Plant>>,
}

impl Cell {
    /// Create a dry, unplanted cell.
    pub fn new(height: f64, depth: f64, surface: bool, coordinate: Point3D, soil: Soil) -> Self {
        Cell {
            height,
            depth,
            surface,
            coordinate,
            soil,
            water_volume: AtomicF64::new(0.0),
            plant: None,
        }
    }

    /// Vertical extent of the cell (cm).
    #[inline]
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Distance to the ground surface (cm).
    #[inline]
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Whether this is the topmost ground cell of its column.
    #[inline]
    pub fn is_surface(&self) -> bool {
        self.surface
    }

    /// Grid position of this cell.
    #[inline]
    pub fn coordinate(&self) -> Point3D {
        self.coordinate
    }

    /// Soil variant filling the cell.
    #[inline]
    pub fn soil(&self) -> Soil {
        self.soil
    }

    /// Replace the soil variant. Setup-time API.
    pub fn set_soil(&mut self, soil: Soil) {
        self.soil = soil;
    }

    /// Stored water (mL).
    #[inline]
    pub fn water_volume(&self) -> f64 {
        self.water_volume.load()
    }

    /// Overwrite the stored water (mL).
    #[inline]
    pub fn set_water_volume(&self, volume_ml: f64) {
        self.water_volume.store(volume_ml);
    }

    /// Growth state of the planting seeded in this cell, if any.
    pub fn plant(&self) -> Option<&Mutex<Plant>> {
        self.plant.as_ref()
    }

    /// Seed a planting into this cell. Setup-time API.
    pub fn set_plant(&mut self, plant: Plant) {
        self.plant = Some(Mutex::new(plant));
    }
}

/// Exclusive owner of the 3D cell grid.
///
/// Dimensions are immutable after construction: X and Y are fixed at
/// [`Farm::SIZE`], Z is chosen by the terrain generator. The grid is built
/// once through `&mut self` and then only cell contents change.
#[derive(Debug)]
pub struct Farm {
    /// Cells in z-major order: `[(z * SIZE + y) * SIZE + x]`.
    cells: Vec<Option<Cell>>,
    z_count: usize,
}

impl Farm {
    /// Cells along each horizontal axis.
    pub const SIZE: usize = 64;

    /// Horizontal cell edge length (cm): a 6400 cm plot split into SIZE
    /// columns.
    pub const CELL_SIZE_CM: f64 = 100.0;

    /// Create an all-air farm of the given depth.
    pub fn new(z_count: usize) -> Self {
        let cells = std::iter::repeat_with(|| None)
            .take(Self::SIZE * Self::SIZE * z_count)
            .collect();
        Farm { cells, z_count }
    }

    /// Linear index of a grid coordinate.
    #[inline]
    pub(crate) fn index(x: usize, y: usize, z: usize) -> usize {
        (z * Self::SIZE + y) * Self::SIZE + x
    }

    /// Depth of the grid in cells.
    #[inline]
    pub fn z_count(&self) -> usize {
        self.z_count
    }

    /// Cell at the given coordinate; `None` for air or out-of-bounds.
    #[inline]
    pub fn cell(&self, x: usize, y: usize, z: usize) -> Option<&Cell> {
        if x >= Self::SIZE || y >= Self::SIZE || z >= self.z_count {
            return None;
        }
        self.cells[Self::index(x, y, z)].as_ref()
    }

    /// Mutable cell access for setup; `None` for air or out-of-bounds.
    pub fn cell_mut(&mut self, x: usize, y: usize, z: usize) -> Option<&mut Cell> {
        if x >= Self::SIZE || y >= Self::SIZE || z >= self.z_count {
            return None;
        }
        self.cells[Self::index(x, y, z)].as_mut()
    }

    /// Place a cell at its own coordinate. Setup-time API.
    pub fn set_cell(&mut self, cell: Cell) {
        let p = cell.coordinate();
        assert!(
            p.x < Self::SIZE && p.y < Self::SIZE && p.z < self.z_count,
            "cell coordinate {p} outside {}x{}x{} grid",
            Self::SIZE,
            Self::SIZE,
            self.z_count
        );
        self.cells[Self::index(p.x, p.y, p.z)] = Some(cell);
    }

    /// First surface cell in z-then-y-then-x scan order, the reporting probe.
    pub fn surface_cell(&self) -> Option<&Cell> {
        for z in 0..self.z_count {
            for y in 0..Self::SIZE {
                for x in 0..Self::SIZE {
                    if let Some(cell) = self.cell(x, y, z) {
                        if cell.is_surface() {
                            return Some(cell);
                        }
                    }
                }
            }
        }
        None
    }

    /// Number of surface cells in the grid.
    pub fn surface_cell_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|cell| cell.is_surface())
            .count()
    }

    /// Sum of water volume over every cell (mL).
    pub fn total_water(&self) -> f64 {
        self.cells.iter().flatten().map(Cell::water_volume).sum()
    }
}
