//! Crop species tables and per-planting growth state.
//!
//! Species constants are a closed table, like the soil records. Growth state
//! lives on the individual planting: each seeded cell carries its own root
//! depth, water allowance, and alive flag, and the only transition is the
//! one-way step from alive to dead.

use serde::{Deserialize, Serialize};

/// Static per-species constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantProperties {
    /// Days from seeding to maturity.
    pub maturation_days: u32,
    /// Root depth at maturity (cm).
    pub mature_root_depth_cm: f64,
    /// Cells left between seeds.
    pub seed_spacing_cells: usize,
    /// Cells below the surface a seed is placed.
    pub seed_depth_cells: usize,
    /// Daily water requirement (mL/day).
    pub water_consumption_ml_per_day: f64,
}

impl PlantProperties {
    /// Daily water lost to transpiration, on average 10% of consumption.
    pub fn transpiration_ml_per_day(&self) -> f64 {
        self.water_consumption_ml_per_day * 0.1
    }

    /// Root growth per sufficiently watered day (cm).
    pub fn growth_rate_cm_per_day(&self) -> f64 {
        self.mature_root_depth_cm / f64::from(self.maturation_days)
    }

    /// Consecutive dry daily checks a planting survives, a quarter of the
    /// maturation time.
    pub fn allowable_days_without_water(&self) -> u32 {
        self.maturation_days / 4
    }
}

const PINTO_BEANS: PlantProperties = PlantProperties {
    maturation_days: 21,
    mature_root_depth_cm: 114.0,
    seed_spacing_cells: 11,
    seed_depth_cells: 4,
    water_consumption_ml_per_day: 0.37,
};

const SUNFLOWER: PlantProperties = PlantProperties {
    maturation_days: 91,
    mature_root_depth_cm: 25.0,
    seed_spacing_cells: 30,
    seed_depth_cells: 12,
    water_consumption_ml_per_day: 0.37,
};

const AMARANTH: PlantProperties = PlantProperties {
    maturation_days: 14,
    mature_root_depth_cm: 18.0,
    seed_spacing_cells: 4,
    seed_depth_cells: 2,
    water_consumption_ml_per_day: 0.19,
};

const CHILE: PlantProperties = PlantProperties {
    maturation_days: 119,
    mature_root_depth_cm: 61.0,
    seed_spacing_cells: 5,
    seed_depth_cells: 1,
    water_consumption_ml_per_day: 0.37,
};

const SWEET_CORN: PlantProperties = PlantProperties {
    maturation_days: 77,
    mature_root_depth_cm: 46.0,
    seed_spacing_cells: 20,
    seed_depth_cells: 3,
    water_consumption_ml_per_day: 0.57,
};

const SUMMER_SQUASH: PlantProperties = PlantProperties {
    maturation_days: 49,
    mature_root_depth_cm: 92.0,
    seed_spacing_cells: 45,
    seed_depth_cells: 3,
    water_consumption_ml_per_day: 0.37,
};

const WINTER_SQUASH: PlantProperties = PlantProperties {
    maturation_days: 112,
    mature_root_depth_cm: 122.0,
    seed_spacing_cells: 120,
    seed_depth_cells: 3,
    water_consumption_ml_per_day: 0.37,
};

const POTATOES: PlantProperties = PlantProperties {
    maturation_days: 119,
    mature_root_depth_cm: 46.0,
    seed_spacing_cells: 30,
    seed_depth_cells: 15,
    water_consumption_ml_per_day: 0.37,
};

const SWEET_PEPPER: PlantProperties = PlantProperties {
    maturation_days: 80,
    mature_root_depth_cm: 31.0,
    seed_spacing_cells: 3,
    seed_depth_cells: 1,
    water_consumption_ml_per_day: 0.37,
};

/// Closed set of crop species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlantSpecies {
    PintoBeans,
    Sunflower,
    Amaranth,
    Chile,
    SweetCorn,
    SummerSquash,
    WinterSquash,
    Potatoes,
    SweetPepper,
}

impl PlantSpecies {
    /// Property record for this species.
    pub const fn properties(self) -> &'static PlantProperties {
        match self {
            PlantSpecies::PintoBeans => &PINTO_BEANS,
            PlantSpecies::Sunflower => &SUNFLOWER,
            PlantSpecies::Amaranth => &AMARANTH,
            PlantSpecies::Chile => &CHILE,
            PlantSpecies::SweetCorn => &SWEET_CORN,
            PlantSpecies::SummerSquash => &SUMMER_SQUASH,
            PlantSpecies::WinterSquash => &WINTER_SQUASH,
            PlantSpecies::Potatoes => &POTATOES,
            PlantSpecies::SweetPepper => &SWEET_PEPPER,
        }
    }
}

/// Mutable state of one seeded planting.
#[derive(Debug, Clone)]
pub struct Plant {
    species: PlantSpecies,
    root_depth_cm: f64,
    alive: bool,
    days_without_water_left: u32,
}

impl Plant {
    /// Seed a new planting: zero root depth, full dry-day allowance.
    pub fn new(species: PlantSpecies) -> Self {
        Plant {
            species,
            root_depth_cm: 0.0,
            alive: true,
            days_without_water_left: species.properties().allowable_days_without_water(),
        }
    }

    /// Species of this planting.
    #[inline]
    pub fn species(&self) -> PlantSpecies {
        self.species
    }

    /// Current root depth (cm).
    #[inline]
    pub fn root_depth_cm(&self) -> f64 {
        self.root_depth_cm
    }

    /// Whether the planting is alive.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Daily growth transition.
    ///
    /// With enough water along the root the root deepens (capped at the
    /// mature depth) and the call returns true. Otherwise the dry-day
    /// allowance is spent down and the planting dies when it runs out;
    /// death is permanent.
    pub fn grow(&mut self, water_available_ml: f64) -> bool {
        if !self.alive {
            return false;
        }
        let props = self.species.properties();
        if water_available_ml >= props.water_consumption_ml_per_day {
            self.root_depth_cm =
                (self.root_depth_cm + props.growth_rate_cm_per_day()).min(props.mature_root_depth_cm);
            true
        } else if self.days_without_water_left == 0 {
            self.alive = false;
            false
        } else {
            self.days_without_water_left -= 1;
            false
        }
    }
}
