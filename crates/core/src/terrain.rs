//! Procedural terrain: shapes a farm grid from a random, smooth heightmap.
//!
//! Stands in for survey elevation data: generates a bounded-relief surface,
//! stacks three coarse soil strata beneath it, and tops each column with
//! one-centimeter topography cells and a guaranteed air layer. Candidate
//! heights are accepted or rejected against their neighbors, which smooths
//! the randomness into gentle hills instead of noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::grid::{Cell, Farm, Point3D};
use crate::soil::Soil;

/// Most the surface is allowed to vary across the whole plot (meters).
const MAX_RELIEF: f64 = 0.05;

/// Largest height change accepted between adjacent columns (meters).
const TOLERANCE: f64 = 0.01;

/// Base strata under the topography, surface-most first:
/// (cell height cm, stratum thickness cm).
const STRATA: [(f64, f64); 3] = [(100.0, 300.0), (100.0, 300.0), (100.0, 400.0)];

/// Candidate rolls per column before falling back to a neighbor's height.
const MAX_CANDIDATE_ATTEMPTS: u32 = 1000;

/// Generate a farm with the given RNG seed. Equal seeds produce equal farms.
///
/// Every cell starts as dry [`Soil::GilaSand`]; callers reassign soil, water
/// and plants before handing the farm to the flow engine.
pub fn generate_farm(seed: u64) -> Farm {
    let mut rng = StdRng::seed_from_u64(seed);
    let (deviation, relief_m) = normalize(smooth_deviations(&mut rng));

    let (_, _, base) = strata_boundaries();
    let topo_layers = (relief_m * 100.0) as usize;
    let z_count = base + topo_layers + 1; // one guaranteed air layer on top
    let mut farm = Farm::new(z_count);

    for y in 0..Farm::SIZE {
        for x in 0..Farm::SIZE {
            let dev_cm = deviation[y * Farm::SIZE + x] * 100.0;
            for z in 0..base + topo_layers {
                let Some(depth) = column_depth(z, dev_cm) else {
                    continue;
                };
                let (height, surface) = if z < base {
                    (stratum_height(z), z == base - 1 && dev_cm == 0.0)
                } else {
                    (1.0, depth == 0.0)
                };
                farm.set_cell(Cell::new(
                    height,
                    depth,
                    surface,
                    Point3D::new(x, y, z),
                    Soil::GilaSand,
                ));
            }
        }
    }

    debug!(z_count, topo_layers, "terrain generated");
    farm
}

/// Layer-index boundaries of the three strata: end of the bottom stratum,
/// end of the middle stratum, end of all base layers.
fn strata_boundaries() -> (usize, usize, usize) {
    let bottom = (STRATA[2].1 / STRATA[2].0) as usize;
    let middle = bottom + (STRATA[1].1 / STRATA[1].0) as usize;
    let base = middle + (STRATA[0].1 / STRATA[0].0) as usize;
    (bottom, middle, base)
}

/// Cell height (cm) for a base layer.
fn stratum_height(z: usize) -> f64 {
    let (bottom, middle, _) = strata_boundaries();
    if z < bottom {
        STRATA[2].0
    } else if z < middle {
        STRATA[1].0
    } else {
        STRATA[0].0
    }
}

/// Depth to the surface (cm) for layer `z` of a column with the given
/// topographic deviation; `None` above the column's surface.
fn column_depth(z: usize, dev_cm: f64) -> Option<f64> {
    let (bottom, middle, base) = strata_boundaries();
    if (z as f64) > base as f64 + dev_cm {
        return None;
    }
    let depth = if z < bottom {
        STRATA[0].1 + STRATA[1].1 + ((bottom - 1 - z) as f64) * STRATA[2].0 + dev_cm
    } else if z < middle {
        STRATA[1].1 + ((middle - 1 - z) as f64) * STRATA[1].0 + dev_cm
    } else if z < base {
        ((base - 1 - z) as f64) * STRATA[0].0 + dev_cm
    } else {
        dev_cm - ((z - base) as f64)
    };
    Some(depth)
}

/// Random column heights (meters above the lowest point), smoothed by
/// accepting or rejecting each candidate against the columns to its left,
/// above, and diagonally up-left.
fn smooth_deviations(rng: &mut StdRng) -> Vec<f64> {
    let mut deviation = vec![0.0_f64; Farm::SIZE * Farm::SIZE];
    for y in 0..Farm::SIZE {
        for x in 0..Farm::SIZE {
            let mut attempts = 0;
            deviation[y * Farm::SIZE + x] = loop {
                let candidate = rng.random::<f64>() * MAX_RELIEF;
                let at = |dx: usize, dy: usize| deviation[(y - dy) * Farm::SIZE + (x - dx)];

                let mut chance = 0.5;
                if x >= 2 {
                    chance += pair_chance(at(1, 0), at(2, 0), candidate);
                } else if x >= 1 {
                    chance += single_chance(at(1, 0), candidate);
                }
                if y >= 2 {
                    chance += pair_chance(at(0, 1), at(0, 2), candidate);
                } else if y >= 1 {
                    chance += single_chance(at(0, 1), candidate);
                }
                if x >= 2 && y >= 2 {
                    chance += pair_chance(at(1, 1), at(2, 2), candidate);
                } else if x >= 1 && y >= 1 {
                    chance += single_chance(at(1, 1), candidate);
                }

                if rng.random::<f64>() <= chance {
                    break candidate;
                }
                attempts += 1;
                if attempts > MAX_CANDIDATE_ATTEMPTS {
                    // Neighbor constraints can pinch the acceptable range
                    // down to almost nothing; reusing the nearest accepted
                    // height keeps the surface continuous.
                    break if x > 0 {
                        at(1, 0)
                    } else if y > 0 {
                        at(0, 1)
                    } else {
                        0.0
                    };
                }
            };
        }
    }
    deviation
}

/// Score a candidate against the two nearest accepted heights in one
/// direction. Changes that continue the established slope read as hills and
/// score higher; changes beyond [`TOLERANCE`] are vetoed outright.
fn pair_chance(nearest: f64, farther: f64, candidate: f64) -> f64 {
    let prior_change = nearest - farther;
    let new_change = candidate - nearest;
    if new_change.abs() > TOLERANCE {
        return -5.0;
    }

    if prior_change.abs() <= new_change.abs() {
        0.1
    } else {
        let mut chance = -0.1;
        if prior_change * new_change > 0.0 {
            chance += 0.025;
        } else if prior_change * new_change < 0.0 {
            chance -= 0.025;
        }
        chance
    }
}

/// Score a candidate against a single accepted neighbor.
fn single_chance(previous: f64, candidate: f64) -> f64 {
    if (candidate - previous).abs() <= TOLERANCE {
        0.1
    } else {
        -5.0
    }
}

/// Shift deviations into the `0..=relief` range and quantize each column to
/// whole centimeters. Returns the normalized map and the total relief.
fn normalize(mut deviation: Vec<f64>) -> (Vec<f64>, f64) {
    let mut min = MAX_RELIEF;
    let mut max = 0.0_f64;
    for &value in &deviation {
        min = min.min(value);
        max = max.max(value);
    }
    for value in &mut deviation {
        *value = ((*value - min) * 100.0).trunc() / 100.0;
    }
    (deviation, max - min)
}
