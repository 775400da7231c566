//! Dwarf galaxy models and their initial-condition sampling
//!
//! A [`DwarfModel`] describes the internal structure of the dwarf. Sampling
//! happens in the dwarf's rest frame: radii by inverse transform of the
//! cumulative mass profile, speeds by rejection against the isotropic
//! distribution function below the local escape speed. The sample is then
//! recentered so its center of mass and center of momentum are exactly zero,
//! and finally shifted to the requested position and velocity.
//!
//! Sampling draws from a single `ChaChaRng` stream in particle order, so a
//! seed fully determines the particle set. Only Plummer dwarfs can be
//! sampled. The Hernquist and NFW models provide their analytic profiles.

use std::f64::consts::{PI, TAU};
use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

use crate::error::{Result, SimError};
use crate::simulation::states::{NVec3, Particle};

/// Radii beyond this many scale radii are redrawn
const MAX_RADIUS_SCALE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DwarfModel {
    Plummer {
        mass: f64,
        nbody: usize,
        scale_radius: f64,
    },
    Hernquist {
        mass: f64,
        nbody: usize,
        scale_radius: f64,
    },
    /// `mass` sets the profile normalization. The total mass diverges.
    Nfw {
        mass: f64,
        nbody: usize,
        scale_radius: f64,
    },
}

impl DwarfModel {
    pub fn mass(&self) -> f64 {
        match *self {
            DwarfModel::Plummer { mass, .. }
            | DwarfModel::Hernquist { mass, .. }
            | DwarfModel::Nfw { mass, .. } => mass,
        }
    }

    pub fn nbody(&self) -> usize {
        match *self {
            DwarfModel::Plummer { nbody, .. }
            | DwarfModel::Hernquist { nbody, .. }
            | DwarfModel::Nfw { nbody, .. } => nbody,
        }
    }

    pub fn scale_radius(&self) -> f64 {
        match *self {
            DwarfModel::Plummer { scale_radius, .. }
            | DwarfModel::Hernquist { scale_radius, .. }
            | DwarfModel::Nfw { scale_radius, .. } => scale_radius,
        }
    }

    /// Density at radius `r`
    pub fn density(&self, r: f64) -> f64 {
        match *self {
            DwarfModel::Plummer {
                mass, scale_radius, ..
            } => {
                let a = scale_radius;
                3.0 / (4.0 * PI) * (mass / (a * a * a)) * (1.0 + r * r / (a * a)).powf(-2.5)
            }
            DwarfModel::Hernquist {
                mass, scale_radius, ..
            } => {
                let a = scale_radius;
                mass * a / (2.0 * PI * r * (r + a).powi(3))
            }
            DwarfModel::Nfw {
                mass, scale_radius, ..
            } => {
                let x = r / scale_radius;
                mass / (4.0 * PI * scale_radius.powi(3) * x * (1.0 + x) * (1.0 + x))
            }
        }
    }

    /// Self-potential of the model at radius `r`
    pub fn potential(&self, r: f64) -> f64 {
        match *self {
            DwarfModel::Plummer {
                mass, scale_radius, ..
            } => -mass / (r * r + scale_radius * scale_radius).sqrt(),
            DwarfModel::Hernquist {
                mass, scale_radius, ..
            } => -mass / (r + scale_radius),
            DwarfModel::Nfw {
                mass, scale_radius, ..
            } => {
                if r == 0.0 {
                    return -mass / scale_radius;
                }
                -mass * (r / scale_radius).ln_1p() / r
            }
        }
    }

    /// Mass enclosed within radius `r`
    pub fn enclosed_mass(&self, r: f64) -> f64 {
        match *self {
            DwarfModel::Plummer {
                mass, scale_radius, ..
            } => {
                let r2 = r * r;
                mass * r2 * r / (r2 + scale_radius * scale_radius).powf(1.5)
            }
            DwarfModel::Hernquist {
                mass, scale_radius, ..
            } => {
                let s = r / (r + scale_radius);
                mass * s * s
            }
            DwarfModel::Nfw {
                mass, scale_radius, ..
            } => {
                let x = r / scale_radius;
                mass * (x.ln_1p() - x / (1.0 + x))
            }
        }
    }

    /// Sample `nbody` particles centered on `(shift_x, shift_v)`
    pub fn generate(&self, seed: u64, shift_x: NVec3, shift_v: NVec3) -> Result<Vec<Particle>> {
        let mut rng = ChaChaRng::seed_from_u64(seed);
        let mut particles = match *self {
            DwarfModel::Plummer {
                mass,
                nbody,
                scale_radius,
            } => sample_plummer(&mut rng, mass, nbody, scale_radius),
            DwarfModel::Hernquist { .. } | DwarfModel::Nfw { .. } => {
                return Err(SimError::Configuration(format!(
                    "cannot sample a {} dwarf, only plummer dwarfs can be sampled",
                    self.name()
                )));
            }
        };

        center_on_origin(&mut particles);
        for p in particles.iter_mut() {
            p.x += shift_x;
            p.v += shift_v;
        }
        Ok(particles)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DwarfModel::Plummer { .. } => "plummer",
            DwarfModel::Hernquist { .. } => "hernquist",
            DwarfModel::Nfw { .. } => "nfw",
        }
    }
}

impl fmt::Display for DwarfModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {{ mass = {}, nbody = {}, scale-radius = {} }}",
            self.name(),
            self.mass(),
            self.nbody(),
            self.scale_radius()
        )
    }
}

fn sample_plummer(rng: &mut ChaChaRng, mass: f64, nbody: usize, scale_radius: f64) -> Vec<Particle> {
    let m = mass / nbody as f64;
    let vel_scale = (mass / scale_radius).sqrt();

    (0..nbody)
        .map(|_| {
            // radius and speed in units of the scale radius / sqrt(M/a)
            let r = plummer_radius(rng);
            let v = plummer_speed(rng, r);
            Particle::new(
                random_direction(rng) * (r * scale_radius),
                random_direction(rng) * (v * vel_scale),
                m,
            )
        })
        .collect()
}

/// Inverse transform of `M(<r)/M = r^3 / (1 + r^2)^(3/2)`
fn plummer_radius(rng: &mut ChaChaRng) -> f64 {
    loop {
        let u: f64 = rng.random();
        if u == 0.0 {
            continue;
        }
        let r = 1.0 / (u.powf(-2.0 / 3.0) - 1.0).sqrt();
        if r.is_finite() && r <= MAX_RADIUS_SCALE {
            return r;
        }
    }
}

/// Von Neumann rejection on `g(q) = q^2 (1 - q^2)^(7/2)`, `q = v / v_esc`.
/// The maximum of `g` is just under 0.1.
fn plummer_speed(rng: &mut ChaChaRng, r: f64) -> f64 {
    let q = loop {
        let x: f64 = rng.random();
        let y: f64 = rng.random_range(0.0..0.1);
        if y <= x * x * (1.0 - x * x).powf(3.5) {
            break x;
        }
    };
    q * std::f64::consts::SQRT_2 * (1.0 + r * r).powf(-0.25)
}

/// Uniform point on the unit sphere
fn random_direction(rng: &mut ChaChaRng) -> NVec3 {
    let cos_theta: f64 = rng.random_range(-1.0..=1.0);
    let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
    let phi: f64 = rng.random_range(0.0..TAU);
    let (sin_phi, cos_phi) = phi.sin_cos();
    NVec3::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta)
}

/// Remove the mass-weighted mean position and velocity
fn center_on_origin(particles: &mut [Particle]) {
    let mass: f64 = particles.iter().map(|p| p.m).sum();
    if mass <= 0.0 {
        return;
    }
    let (cm_x, cm_v) = particles
        .iter()
        .fold((NVec3::zeros(), NVec3::zeros()), |(x, v), p| {
            (x + p.x * p.m, v + p.v * p.m)
        });
    let (cm_x, cm_v) = (cm_x / mass, cm_v / mass);

    for p in particles.iter_mut() {
        p.x -= cm_x;
        p.v -= cm_v;
    }
}
