//! Normalization of configured positions into galactocentric Cartesian
//!
//! Positions can be given either directly as galactocentric `(x, y, z)` or
//! as heliocentric galactic `(l, b, r)`. The Sun sits on the negative x axis
//! at `(-sun_gc_dist, 0, 0)`. Velocities are always galactocentric
//! Cartesian and pass through unchanged.

use std::f64::consts::TAU;
use std::fmt;

use crate::simulation::states::NVec3;

/// Default Sun to galactic center distance in kpc
pub const DEFAULT_SUN_GC_DIST: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnit {
    Degrees,
    Radians,
}

impl AngleUnit {
    pub fn from_radians_flag(use_radians: bool) -> Self {
        if use_radians {
            AngleUnit::Radians
        } else {
            AngleUnit::Degrees
        }
    }

    pub fn to_radians(self, angle: f64) -> f64 {
        match self {
            AngleUnit::Degrees => angle.to_radians(),
            AngleUnit::Radians => angle,
        }
    }

    pub fn from_radians(self, angle: f64) -> f64 {
        match self {
            AngleUnit::Degrees => angle.to_degrees(),
            AngleUnit::Radians => angle,
        }
    }
}

/// How the configured position triple is to be read
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    /// `(x, y, z)` in kpc about the galactic center
    Galactocentric,
    /// `(l, b, r)` about the Sun
    Heliocentric { angles: AngleUnit, sun_gc_dist: f64 },
}

impl Frame {
    pub fn from_flags(use_gal_c: bool, use_radians: bool, sun_gc_dist: f64) -> Self {
        if use_gal_c {
            Frame::Galactocentric
        } else {
            Frame::Heliocentric {
                angles: AngleUnit::from_radians_flag(use_radians),
                sun_gc_dist,
            }
        }
    }

    /// Map a position triple in this frame to galactocentric Cartesian
    pub fn to_cartesian(&self, coords: [f64; 3]) -> NVec3 {
        match *self {
            Frame::Galactocentric => NVec3::new(coords[0], coords[1], coords[2]),
            Frame::Heliocentric { angles, sun_gc_dist } => {
                let l = angles.to_radians(coords[0]);
                let b = angles.to_radians(coords[1]);
                lbr_to_cartesian(l, b, coords[2], sun_gc_dist)
            }
        }
    }

    /// Inverse of [`Frame::to_cartesian`]; heliocentric longitudes land in
    /// `[0, 2pi)` (or `[0, 360)` degrees)
    pub fn from_cartesian(&self, pos: &NVec3) -> [f64; 3] {
        match *self {
            Frame::Galactocentric => [pos.x, pos.y, pos.z],
            Frame::Heliocentric { angles, sun_gc_dist } => {
                let (l, b, r) = cartesian_to_lbr(pos, sun_gc_dist);
                [angles.from_radians(l), angles.from_radians(b), r]
            }
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Galactocentric => f.write_str("galactocentric (x, y, z)"),
            Frame::Heliocentric { angles, sun_gc_dist } => write!(
                f,
                "heliocentric (l, b, r) in {}, sun at {sun_gc_dist} kpc",
                match angles {
                    AngleUnit::Degrees => "degrees",
                    AngleUnit::Radians => "radians",
                }
            ),
        }
    }
}

/// Heliocentric galactic longitude/latitude (radians) and distance to
/// galactocentric Cartesian
pub fn lbr_to_cartesian(l: f64, b: f64, r: f64, sun_gc_dist: f64) -> NVec3 {
    let (sin_b, cos_b) = b.sin_cos();
    let (sin_l, cos_l) = l.sin_cos();
    let d = r * cos_b; // distance projected on the galactic plane

    NVec3::new(d * cos_l - sun_gc_dist, d * sin_l, r * sin_b)
}

/// Galactocentric Cartesian to heliocentric `(l, b, r)`, angles in radians
pub fn cartesian_to_lbr(pos: &NVec3, sun_gc_dist: f64) -> (f64, f64, f64) {
    let xs = pos.x + sun_gc_dist;
    let d = (xs * xs + pos.y * pos.y).sqrt();
    let r = (d * d + pos.z * pos.z).sqrt();

    let l = pos.y.atan2(xs).rem_euclid(TAU);
    let b = pos.z.atan2(d);
    (l, b, r)
}
