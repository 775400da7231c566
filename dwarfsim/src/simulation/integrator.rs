//! Fixed-step leapfrog time integrator
//!
//! Kick-drift-kick with cached accelerations: the accelerations computed at
//! the end of one step are the ones used for the first half-kick of the
//! next, so each step costs one force evaluation (one tree build and walk).
//! The caller owns the acceleration buffer and must prime it once with
//! [`prime_accelerations`] before the first step.

use crate::error::{Result, SimError};
use crate::simulation::forces::AccelSet3;
use crate::simulation::states::{NVec3, System3};

/// Fill `accels` with the accelerations of the current state
pub fn prime_accelerations(sys: &System3, forces: &AccelSet3, accels: &mut [NVec3], step: usize) -> Result<()> {
    forces.accumulate_accels(sys.t, sys, accels);
    check_finite(accels.iter(), step, "acceleration")
}

/// Advance the system by one step of length `dt`.
///
/// On entry `accels` holds `a_n` for the current positions, on exit it holds
/// `a_n+1`. `step` is only used to label a [`SimError::NumericInstability`].
pub fn leapfrog_step(sys: &mut System3, forces: &AccelSet3, accels: &mut [NVec3], dt: f64, step: usize) -> Result<()> {
    if sys.particles.is_empty() {
        sys.t += dt;
        return Ok(());
    }
    let half_dt = 0.5 * dt;

    // Kick: v_n+1/2 = v_n + (dt/2) a_n
    for (p, a) in sys.particles.iter_mut().zip(accels.iter()) {
        p.v += *a * half_dt;
    }

    // Drift: x_n+1 = x_n + dt v_n+1/2
    for p in sys.particles.iter_mut() {
        p.x += p.v * dt;
    }
    check_finite(sys.particles.iter().map(|p| &p.x), step, "position")?;

    // advance time: t_n+1 = t_n + dt
    sys.t += dt;

    // a_n+1 from x_n+1, rebuilding the tree
    forces.accumulate_accels(sys.t, sys, accels);
    check_finite(accels.iter(), step, "acceleration")?;

    // Second kick: v_n+1 = v_n+1/2 + (dt/2) a_n+1
    for (p, a) in sys.particles.iter_mut().zip(accels.iter()) {
        p.v += *a * half_dt;
    }

    Ok(())
}

fn check_finite<'a>(values: impl Iterator<Item = &'a NVec3>, step: usize, quantity: &'static str) -> Result<()> {
    for (particle, value) in values.enumerate() {
        if !value.iter().all(|c| c.is_finite()) {
            return Err(SimError::NumericInstability {
                step,
                particle,
                quantity,
            });
        }
    }
    Ok(())
}
