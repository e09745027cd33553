//! Soil variants and their water-transport constants.
//!
//! A closed set of Gila River floodplain soil series plus the two degenerate
//! variants, riverwash and air, which hold no water at all. Lookup is pure
//! data: each variant maps to one immutable property record.

use serde::{Deserialize, Serialize};

/// Static water-transport properties of a soil variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoilProperties {
    /// Hydraulic conductivity (cm/s).
    pub hydraulic_conductivity: f64,
    /// Water-holding capacity (mL).
    pub water_capacity: f64,
    /// Saturation floor below which water is bound to the soil and immobile.
    pub water_adhesion: f64,
    /// Surface infiltration rate.
    pub infiltration_rate: f64,
    /// Surface evaporation rate.
    pub evaporation_rate: f64,
}

const GILA_SAND: SoilProperties = SoilProperties {
    hydraulic_conductivity: 9.17e-6,
    water_capacity: 0.17,
    water_adhesion: 7.6,
    infiltration_rate: 0.3,
    evaporation_rate: 6.0,
};

const GILA_FINE_SANDY_LOAM: SoilProperties = SoilProperties {
    hydraulic_conductivity: 9.17e-6,
    water_capacity: 0.17,
    water_adhesion: 7.6,
    infiltration_rate: 0.3,
    evaporation_rate: 9.0,
};

const GILA_LOAM: SoilProperties = SoilProperties {
    hydraulic_conductivity: 9.17e-6,
    water_capacity: 0.18,
    water_adhesion: 7.3,
    infiltration_rate: 0.3,
    evaporation_rate: 10.0,
};

const GILA_CLAY_LOAM: SoilProperties = SoilProperties {
    hydraulic_conductivity: 8.027e-6,
    water_capacity: 0.17,
    water_adhesion: 9.4,
    infiltration_rate: 0.2,
    evaporation_rate: 11.0,
};

const GILA_CLAY: SoilProperties = SoilProperties {
    hydraulic_conductivity: 8.027e-6,
    water_capacity: 0.17,
    water_adhesion: 9.4,
    infiltration_rate: 0.15,
    evaporation_rate: 8.0,
};

/// Riverwash and air: no capacity, no conductivity, nothing moves.
const INERT: SoilProperties = SoilProperties {
    hydraulic_conductivity: 0.0,
    water_capacity: 0.0,
    water_adhesion: 0.0,
    infiltration_rate: 0.0,
    evaporation_rate: 0.0,
};

/// Closed set of soil variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Soil {
    GilaSand,
    GilaFineSandyLoam,
    GilaLoam,
    GilaClayLoam,
    GilaClay,
    Riverwash,
    Air,
}

impl Soil {
    /// Property record for this variant.
    pub const fn properties(self) -> &'static SoilProperties {
        match self {
            Soil::GilaSand => &GILA_SAND,
            Soil::GilaFineSandyLoam => &GILA_FINE_SANDY_LOAM,
            Soil::GilaLoam => &GILA_LOAM,
            Soil::GilaClayLoam => &GILA_CLAY_LOAM,
            Soil::GilaClay => &GILA_CLAY,
            Soil::Riverwash | Soil::Air => &INERT,
        }
    }

    /// Hydraulic conductivity (cm/s).
    #[inline]
    pub fn hydraulic_conductivity(self) -> f64 {
        self.properties().hydraulic_conductivity
    }

    /// Water-holding capacity (mL).
    #[inline]
    pub fn water_capacity(self) -> f64 {
        self.properties().water_capacity
    }

    /// Saturation floor below which water is immobile.
    #[inline]
    pub fn water_adhesion(self) -> f64 {
        self.properties().water_adhesion
    }

    /// Whether this variant can hold water at all. Saturation is undefined
    /// for the zero-capacity variants and must never be computed by
    /// division; the flow engine treats it as 0 and keeps them out of every
    /// flow gate.
    #[inline]
    pub fn has_capacity(self) -> bool {
        self.properties().water_capacity > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_variants_have_no_capacity() {
        assert!(!Soil::Riverwash.has_capacity());
        assert!(!Soil::Air.has_capacity());
        assert_eq!(Soil::Riverwash.hydraulic_conductivity(), 0.0);
        assert_eq!(Soil::Air.water_adhesion(), 0.0);
    }

    #[test]
    fn test_series_property_lookup() {
        assert!(Soil::GilaSand.has_capacity());
        assert_eq!(Soil::GilaSand.water_capacity(), 0.17);
        assert_eq!(Soil::GilaLoam.water_capacity(), 0.18);
        assert_eq!(Soil::GilaLoam.water_adhesion(), 7.3);
        // The clay soils drain slower than the sandy ones
        assert!(
            Soil::GilaClay.hydraulic_conductivity() < Soil::GilaSand.hydraulic_conductivity()
        );
    }
}
