//! Core state types for the N-body simulation.
//!
//! - `Particle` holds one dwarf-galaxy particle (position, velocity, mass)
//! - `System3` holds the particle array and the current simulation time `t`
//!
//! Particle identity is its index in `System3::particles`, which never
//! changes during a run.

use nalgebra::{Matrix3, Vector3};
pub type NVec3 = Vector3<f64>;
pub type NMat3 = Matrix3<f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub x: NVec3, // position
    pub v: NVec3, // velocity
    pub m: f64, // mass
}

impl Particle {
    pub fn new(x: NVec3, v: NVec3, m: f64) -> Self {
        Self { x, v, m }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct System3 {
    pub particles: Vec<Particle>, // dwarf particles, indexed by identity
    pub t: f64, // time
}

impl System3 {
    pub fn new(particles: Vec<Particle>) -> Self {
        Self { particles, t: 0.0 }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn total_mass(&self) -> f64 {
        self.particles.iter().map(|p| p.m).sum()
    }

    /// Total linear momentum `sum(m v)`
    pub fn momentum(&self) -> NVec3 {
        self.particles
            .iter()
            .fold(NVec3::zeros(), |acc, p| acc + p.v * p.m)
    }

    /// Mass-weighted mean position, zero for an empty or massless system
    pub fn center_of_mass(&self) -> NVec3 {
        let mass = self.total_mass();
        if mass <= 0.0 {
            return NVec3::zeros();
        }
        self.particles
            .iter()
            .fold(NVec3::zeros(), |acc, p| acc + p.x * p.m)
            / mass
    }

    /// Mass-weighted mean velocity
    pub fn center_of_momentum(&self) -> NVec3 {
        let mass = self.total_mass();
        if mass <= 0.0 {
            return NVec3::zeros();
        }
        self.momentum() / mass
    }
}
