//! Cross-farm exchange payloads.
//!
//! In a multi-farm deployment these travel between processes; here the
//! engine's boundary exchange is a same-process loopback that applies each
//! edge's payload to the opposing edge of its own farm. The payload shape is
//! the wire contract either way.

use serde::{Deserialize, Serialize};

use super::scratch::ScratchBuffers;
use crate::grid::{Direction, Farm};

/// Water leaving a farm across one cardinal edge, indexed
/// `[along-edge][depth]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowData {
    /// Edge the water left through.
    pub direction: Direction,
    /// Volume per edge position and depth (mL).
    pub water: Vec<Vec<f64>>,
}

impl FlowData {
    /// Package an edge's reservoir bank into a payload.
    pub(crate) fn from_reservoirs(buffers: &ScratchBuffers, direction: Direction) -> Self {
        FlowData {
            direction,
            water: buffers.reservoir_bank(direction),
        }
    }
}

/// Apply a payload from a neighboring farm to the pending deltas of the
/// opposing edge, mirrored by position and depth: NORTH water enters the
/// y=0 row, EAST the x=0 column, SOUTH the y=max row, WEST the x=max
/// column. Entries outside the receiving grid's dimensions are skipped,
/// never an error, as are air cells.
pub(crate) fn flow_into_farm(farm: &Farm, buffers: &ScratchBuffers, data: &FlowData) {
    let max = Farm::SIZE;
    let (x_range, y_range) = match data.direction {
        Direction::North => (0..max, 0..1),
        Direction::East => (0..1, 0..max),
        Direction::South => (0..max, max - 1..max),
        Direction::West => (max - 1..max, 0..max),
    };

    for z in 0..farm.z_count() {
        for y in y_range.clone() {
            for x in x_range.clone() {
                if farm.cell(x, y, z).is_none() {
                    continue;
                }
                let along = match data.direction {
                    Direction::North | Direction::South => x,
                    Direction::East | Direction::West => y,
                };
                let Some(column) = data.water.get(along) else {
                    continue;
                };
                let Some(&amount) = column.get(z) else {
                    continue;
                };
                buffers.add_delta(Farm::index(x, y, z), amount);
            }
        }
    }
}
