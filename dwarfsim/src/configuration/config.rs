//! Configuration types for loading a simulation from a parameter file.
//!
//! This module defines a thin, `serde`-deserializable representation of the
//! parameter file. It mirrors the file's structure one to one:
//!
//! - [`ParametersFile`]          – top-level wrapper (`nbody-parameters-file`)
//! - [`ContextConfig`]           – solver options, potential and dwarf model
//! - [`PotentialConfig`]         – optional disk / spherical / halo components
//! - [`DwarfModelConfig`]        – the dwarf's distribution family
//! - [`InitialConditionsConfig`] – where the dwarf's center of mass ends up
//!
//! # File format
//! JSON with line comments and trailing commas allowed (parsed as JSON5):
//!
//! ```text
//! { "nbody-parameters-file": {
//!     "nbody-context": {
//!         "headline" : "example",
//!         "criterion" : "sw93",                // exact | bh86 | new-criterion | sw93
//!         "use-quadrupole-corrections" : true,
//!         "accuracy-parameter" : 1.0,
//!         "seed" : 0,
//!         "potential" : {
//!             "disk" : { "miyamoto-nagai" : { "mass" : 4.45865888E5, "scale-length" : 6.5, "scale-height" : 0.26 } },
//!             "spherical" : { "sphere" : { "mass" : 1.52954402E5, "r0-scale" : 0.7 } },
//!             "halo" : { "logarithmic" : { "vhalo" : 73, "scale-length" : 12.0, "z-flattening" : 1.1 } },
//!         },
//!         "dwarf-model": {
//!             "plummer" : { "mass" : 10, "nbody" : 100, "scale-radius" : 0.3, "time-orbit" : 4, "time-dwarf" : 3.945 }
//!         }
//!     },
//!     "initial-conditions": {
//!         "useGalC" : false,
//!         "angle-use-radians" : false,
//!         "velocity" : [ -156, 79, 107 ],
//!         "position" : [ 28.6, 218.0, 53.5 ],
//!     },
//! }}
//! ```
//!
//! Unknown fields and unknown tokens are rejected, as are counts and seeds
//! that are not whole numbers and potential categories naming more than one
//! model. Range checks happen when the file is turned into a
//! [`SimulationConfig`](crate::configuration::context::SimulationConfig).

use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::error::Result;

/// Implements `Deserialize` for a category enum written as an object with
/// exactly one key, the model name, whose value holds that model's fields.
macro_rules! one_model_of {
    ($ty:ident, $what:literal, { $($key:literal => $variant:ident($inner:ty)),+ $(,)? }) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                struct OneModel;

                impl<'de> Visitor<'de> for OneModel {
                    type Value = $ty;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "an object naming exactly one {}", $what)
                    }

                    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<$ty, A::Error> {
                        const MODELS: &[&str] = &[$($key),+];
                        let Some(key) = map.next_key::<String>()? else {
                            return Err(de::Error::custom(concat!("no ", $what, " given")));
                        };
                        let model = match key.as_str() {
                            $($key => $ty::$variant(map.next_value::<$inner>()?),)+
                            other => return Err(de::Error::unknown_variant(other, MODELS)),
                        };
                        if let Some(extra) = map.next_key::<String>()? {
                            return Err(de::Error::custom(format!(
                                "only one {} allowed, found `{extra}` after `{key}`",
                                $what
                            )));
                        }
                        Ok(model)
                    }
                }

                deserializer.deserialize_map(OneModel)
            }
        }
    };
}

/// Top-level parameter file
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ParametersFile {
    #[serde(rename = "nbody-parameters-file")]
    pub parameters: ParametersConfig,
}

impl ParametersFile {
    /// Parse a parameter file from text
    pub fn parse(text: &str) -> Result<Self> {
        Ok(json5::from_str(text)?)
    }

    /// Read and parse a parameter file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ParametersConfig {
    pub nbody_context: ContextConfig,
    pub initial_conditions: InitialConditionsConfig,
}

/// Tree opening criterion token
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriterionConfig {
    #[serde(rename = "exact")] // every interaction particle-particle
    Exact,

    #[serde(rename = "bh86", alias = "simple")] // size / distance < accuracy parameter
    Bh86,

    #[serde(rename = "new-criterion")] // bh86 plus the COM offset from the cell center
    NewCriterion,

    #[serde(rename = "sw93")] // farthest-corner distance plus the particle's sweep over a step
    Sw93,
}

/// Run descriptor
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ContextConfig {
    #[serde(default)]
    pub headline: String, // free-text label
    pub criterion: CriterionConfig, // tree opening criterion
    pub use_quadrupole_corrections: bool, // add quadrupole terms for admitted cells
    pub accuracy_parameter: f64, // opening angle theta, > 0
    #[serde(deserialize_with = "seed")]
    pub seed: u64, // deterministic seed for the dwarf's initial conditions
    #[serde(default)]
    pub sun_gc_dist: Option<f64>, // Sun to galactic center distance, default 8 kpc
    #[serde(default, deserialize_with = "optional_count")]
    pub freq_out: Option<usize>, // snapshot every `freq-out` steps
    #[serde(default)]
    pub output_cartesian: Option<bool>, // snapshot positions as x,y,z (default) or l,b,r
    #[serde(default)]
    pub potential: PotentialConfig, // external galaxy, every component optional
    pub dwarf_model: DwarfModelConfig, // dwarf's internal structure and run durations
}

/// External potential. An absent category contributes nothing.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct PotentialConfig {
    pub disk: Option<DiskConfig>,
    pub spherical: Option<SphericalConfig>,
    pub halo: Option<HaloConfig>,
}

#[derive(Debug, Clone)]
pub enum DiskConfig {
    MiyamotoNagai(MiyamotoNagaiConfig),
    Exponential(ExponentialDiskConfig),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MiyamotoNagaiConfig {
    pub mass: f64,
    pub scale_length: f64, // radial scale a
    pub scale_height: f64, // vertical scale b
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExponentialDiskConfig {
    pub mass: f64,
    pub scale_length: f64,
}

#[derive(Debug, Clone)]
pub enum SphericalConfig {
    Sphere(SphereConfig),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SphereConfig {
    pub mass: f64,
    pub r0_scale: f64, // Hernquist scale radius
}

#[derive(Debug, Clone)]
pub enum HaloConfig {
    Logarithmic(LogarithmicHaloConfig),
    Nfw(NfwHaloConfig),
    Triaxial(TriaxialHaloConfig),
}

/// Axisymmetric logarithmic halo. The x/y flattenings and the triaxial
/// angle are accepted so a file can switch between `logarithmic` and
/// `triaxial` by renaming the key, but only `z-flattening` is used.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LogarithmicHaloConfig {
    pub vhalo: f64,
    pub scale_length: f64,
    pub z_flattening: f64,
    #[serde(default)]
    pub x_flattening: Option<f64>,
    #[serde(default)]
    pub y_flattening: Option<f64>,
    #[serde(default)]
    pub triaxial_angle: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NfwHaloConfig {
    pub vhalo: f64,
    pub scale_length: f64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TriaxialHaloConfig {
    pub vhalo: f64,
    pub scale_length: f64,
    pub x_flattening: f64,
    pub y_flattening: f64,
    pub z_flattening: f64,
    pub triaxial_angle: f64, // degrees
}

#[derive(Debug, Clone)]
pub enum DwarfModelConfig {
    Plummer(PlummerConfig),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PlummerConfig {
    pub mass: f64, // total dwarf mass
    #[serde(deserialize_with = "count")]
    pub nbody: usize, // particle count
    pub scale_radius: f64, // Plummer scale radius
    pub time_orbit: f64, // how far back the center of mass is integrated
    pub time_dwarf: f64, // simulated time of the disruption run
    #[serde(default)]
    pub timestep: Option<f64>, // overrides the step derived from mass and radius
    #[serde(default)]
    pub orbit_timestep: Option<f64>, // step of the orbit phase, defaults to `timestep`
    #[serde(default)]
    pub eps: Option<f64>, // softening length, overrides the derived one
}

one_model_of!(DiskConfig, "disk model", {
    "miyamoto-nagai" => MiyamotoNagai(MiyamotoNagaiConfig),
    "exponential" => Exponential(ExponentialDiskConfig),
});

one_model_of!(SphericalConfig, "spherical model", {
    "sphere" => Sphere(SphereConfig),
});

one_model_of!(HaloConfig, "halo model", {
    "logarithmic" => Logarithmic(LogarithmicHaloConfig),
    "nfw" => Nfw(NfwHaloConfig),
    "triaxial" => Triaxial(TriaxialHaloConfig),
});

one_model_of!(DwarfModelConfig, "dwarf model", {
    "plummer" => Plummer(PlummerConfig),
});

/// Present-day position and velocity of the dwarf's center of mass
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct InitialConditionsConfig {
    #[serde(rename = "useGalC")]
    pub use_gal_c: bool, // `true` - position is galactocentric x,y,z, `false` - heliocentric l,b,r
    #[serde(rename = "angle-use-radians")]
    pub angle_use_radians: bool, // unit of l and b when `useGalC` is false
    pub velocity: [f64; 3], // galactocentric Cartesian
    pub position: [f64; 3],
}

/// Largest seed that survives the file's floating-point numbers unchanged
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0; // 2^53

/// Read a number that must be a whole number in `0..=max`
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D, max: f64) -> std::result::Result<f64, D::Error> {
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value.fract() != 0.0 || value < 0.0 || value > max {
        return Err(de::Error::invalid_value(
            de::Unexpected::Float(value),
            &"a non-negative whole number",
        ));
    }
    Ok(value)
}

fn count<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<usize, D::Error> {
    let max = (usize::MAX as f64).min(MAX_EXACT_INTEGER);
    Ok(whole_number(deserializer, max)? as usize)
}

fn optional_count<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<usize>, D::Error> {
    count(deserializer).map(Some)
}

fn seed<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    Ok(whole_number(deserializer, MAX_EXACT_INTEGER)? as u64)
}
