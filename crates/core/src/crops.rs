//! Crop layout: quadrant seeding and the living-plant census.

use std::ops::Range;

use tracing::debug;

use crate::grid::{Cell, Farm};
use crate::plant::{Plant, PlantSpecies};

/// Quarter of the farm's (x, y) plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

impl Quadrant {
    /// All four quadrants in planting order.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::NorthWest,
        Quadrant::NorthEast,
        Quadrant::SouthWest,
        Quadrant::SouthEast,
    ];

    /// Half-open (x, y) bounds of this quadrant.
    fn bounds(self) -> (Range<usize>, Range<usize>) {
        let mid = Farm::SIZE / 2;
        let full = Farm::SIZE;
        match self {
            Quadrant::NorthWest => (0..mid, 0..mid),
            Quadrant::NorthEast => (mid..full, 0..mid),
            Quadrant::SouthWest => (0..mid, mid..full),
            Quadrant::SouthEast => (mid..full, mid..full),
        }
    }
}

/// Seed a quadrant with a crop at the species' spacing, each seed placed at
/// the species' seed depth below the column's surface cell. Columns without
/// a reachable seed cell are skipped. Returns the number of plantings.
pub fn plant_quadrant(farm: &mut Farm, quadrant: Quadrant, species: PlantSpecies) -> usize {
    let spacing = species.properties().seed_spacing_cells;
    let seed_depth = species.properties().seed_depth_cells;
    let (x_range, y_range) = quadrant.bounds();

    let mut planted = 0;
    for x in x_range.step_by(spacing) {
        for y in y_range.clone().step_by(spacing) {
            let Some(z) = seed_cell_z(farm, x, y, seed_depth) else {
                continue;
            };
            if let Some(cell) = farm.cell_mut(x, y, z) {
                cell.set_plant(Plant::new(species));
                planted += 1;
            }
        }
    }

    debug!(?quadrant, ?species, planted, "quadrant planted");
    planted
}

/// z index of the cell `seed_depth` cells below the column's surface cell.
fn seed_cell_z(farm: &Farm, x: usize, y: usize, seed_depth: usize) -> Option<usize> {
    let surface_z = (0..farm.z_count()).find(|&z| farm.cell(x, y, z).is_some_and(Cell::is_surface))?;
    surface_z.checked_sub(seed_depth)
}

/// Count living plantings inside a quadrant.
pub fn living_plants(farm: &Farm, quadrant: Quadrant) -> usize {
    let (x_range, y_range) = quadrant.bounds();
    let mut alive = 0;
    for x in x_range {
        for y in y_range.clone() {
            for z in 0..farm.z_count() {
                let Some(cell) = farm.cell(x, y, z) else {
                    continue;
                };
                if let Some(slot) = cell.plant() {
                    if slot.lock().expect("plant state lock poisoned").is_alive() {
                        alive += 1;
                    }
                }
            }
        }
    }
    alive
}
