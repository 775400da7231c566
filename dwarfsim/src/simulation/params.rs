//! Numerical parameters for a run
//!
//! `Parameters` holds the runtime settings that are not part of the force
//! solver: step sizes, the two phase durations, the sampling seed and the
//! snapshot frequency.

use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub seed: u64, // deterministic seed for initial conditions
    pub timestep: f64, // nominal step size for the dwarf phase
    pub orbit_timestep: f64, // step size for the center-of-mass orbit phase
    pub time_orbit: f64, // how far back the orbit is integrated
    pub time_dwarf: f64, // simulated time of the disruption run
    pub freq_out: Option<usize>, // snapshot every `freq_out` steps
}

impl Parameters {
    /// Number of fixed steps needed to cover `duration` with steps no longer
    /// than `dt`, and the step size that lands exactly on `duration`.
    pub fn step_plan(duration: f64, dt: f64) -> (usize, f64) {
        if duration <= 0.0 {
            return (0, dt);
        }
        let n = (duration / dt).ceil().max(1.0) as usize;
        (n, duration / n as f64)
    }

    /// Steps and step size of the dwarf phase
    pub fn dwarf_steps(&self) -> (usize, f64) {
        Self::step_plan(self.time_dwarf, self.timestep)
    }
}

/// A hundredth of the dynamical time `sqrt(4/3 pi a^3 / M)` of the model
pub fn calculate_timestep(mass: f64, scale_radius: f64) -> f64 {
    let dynamical = (4.0 / 3.0 * PI * scale_radius.powi(3) / mass).sqrt();
    (1.0 / 10.0_f64).powi(2) * dynamical
}

/// Softening squared `(a / (10 sqrt(N)))^2`
pub fn calculate_eps2(nbody: usize, scale_radius: f64) -> f64 {
    let eps = scale_radius / (10.0 * (nbody as f64).sqrt());
    eps * eps
}
