//! Point-mass orbits through the external potential
//!
//! Used to place the dwarf: its center of mass is integrated backward from
//! the configured present-day point for `time-orbit`, and the dwarf is
//! sampled at the resulting position and velocity. The integrator is the
//! same kick-drift-kick leapfrog as the N-body run, with a negative step for
//! the backward direction, so integrating back and then forward again
//! returns to the starting point up to rounding.

use crate::simulation::params::Parameters;
use crate::simulation::potential::GalaxyPotential;
use crate::simulation::states::NVec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitPoint {
    pub x: NVec3,
    pub v: NVec3,
}

/// Integrate a test particle through `potential` for `duration` in the given
/// direction, with steps no longer than `dt`
pub fn integrate_orbit(
    potential: &GalaxyPotential,
    start: OrbitPoint,
    duration: f64,
    dt: f64,
    direction: Direction,
) -> OrbitPoint {
    let (steps, h) = Parameters::step_plan(duration, dt);
    let h = match direction {
        Direction::Forward => h,
        Direction::Backward => -h,
    };
    let half_h = 0.5 * h;

    let mut x = start.x;
    let mut v = start.v;
    let mut acc = potential.acceleration(&x);

    for _ in 0..steps {
        v += half_h * acc;
        x += h * v;
        acc = potential.acceleration(&x);
        v += half_h * acc;
    }

    OrbitPoint { x, v }
}

/// Where the dwarf's center of mass was `duration` ago
pub fn reverse_orbit(potential: &GalaxyPotential, present: OrbitPoint, duration: f64, dt: f64) -> OrbitPoint {
    integrate_orbit(potential, present, duration, dt, Direction::Backward)
}

pub fn forward_orbit(potential: &GalaxyPotential, start: OrbitPoint, duration: f64, dt: f64) -> OrbitPoint {
    integrate_orbit(potential, start, duration, dt, Direction::Forward)
}
