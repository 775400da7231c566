//! Build a fully-initialized run from configuration and drive it
//!
//! Takes a validated [`SimulationConfig`] and produces a runtime bundle
//! containing:
//! - engine settings (`Engine`)
//! - numerical parameters (`Parameters`)
//! - the external galaxy (`GalaxyPotential`)
//! - system state (`System3` with the sampled dwarf at t = 0)
//! - active force set (`AccelSet3`: tree self-gravity plus the external field)
//!
//! [`Scenario::run`] then advances the system with the leapfrog integrator
//! until `time-dwarf` has elapsed, handing snapshots to an observer.

use crate::configuration::context::SimulationConfig;
use crate::error::Result;
use crate::simulation::diagnostics::Diagnostics;
use crate::simulation::engine::Engine;
use crate::simulation::forces::{AccelSet3, ExternalField, NewtonianGravityBarnesHut3};
use crate::simulation::integrator::{leapfrog_step, prime_accelerations};
use crate::simulation::orbit::{reverse_orbit, OrbitPoint};
use crate::simulation::params::Parameters;
use crate::simulation::potential::GalaxyPotential;
use crate::simulation::states::{NVec3, System3};

/// Fully-initialized simulation run
///
/// This is the main "runtime bundle" constructed from a [`SimulationConfig`]:
/// it contains the engine settings, parameters, the external potential,
/// current system state, and the set of active accelerations
pub struct Scenario {
    pub engine: Engine,
    pub parameters: Parameters,
    pub potential: GalaxyPotential,
    pub system: System3,
    pub forces: AccelSet3,
    pub start: OrbitPoint, // center of mass the dwarf was sampled around
}

/// What a finished run reports back
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub dt: f64,
    pub snapshots: usize,
    pub initial: Diagnostics,
    pub last: Diagnostics,
}

impl Scenario {
    pub fn build_scenario(cfg: &SimulationConfig) -> Result<Self> {
        let p = &cfg.parameters;
        let present = OrbitPoint {
            x: cfg.initial.position,
            v: cfg.initial.velocity,
        };

        // Place the center of mass: orbit it back in time, or use it as is
        let start = if p.time_orbit > 0.0 {
            let start = reverse_orbit(&cfg.potential, present, p.time_orbit, p.orbit_timestep);
            log::info!(
                "orbit integrated back {} from ({:.4}, {:.4}, {:.4}) to ({:.4}, {:.4}, {:.4})",
                p.time_orbit,
                present.x.x, present.x.y, present.x.z,
                start.x.x, start.x.y, start.x.z,
            );
            start
        } else {
            present
        };

        // Dwarf particles sampled around the starting point
        let particles = cfg.dwarf.generate(p.seed, start.x, start.v)?;
        let system = System3::new(particles);
        log::info!("generated {} particles, total mass {}", system.len(), system.total_mass());

        // Forces: tree self-gravity plus the galaxy, if there is one
        let (_, dt) = p.dwarf_steps();
        let mut forces = AccelSet3::new().with(NewtonianGravityBarnesHut3 {
            engine: cfg.engine,
            dt,
        });
        if !cfg.potential.is_empty() {
            forces = forces.with(ExternalField {
                potential: cfg.potential,
            });
        }

        Ok(Self {
            engine: cfg.engine,
            parameters: p.clone(),
            potential: cfg.potential,
            system,
            forces,
            start,
        })
    }

    /// Run the dwarf phase to completion.
    ///
    /// `observer` sees the system after step 0 (the initial state), after
    /// every `freq_out` steps, and after the last step. The final time is
    /// exactly `time_dwarf`. An observer error stops the run.
    pub fn run<F>(&mut self, mut observer: F) -> Result<RunSummary>
    where
        F: FnMut(&System3, usize) -> Result<()>,
    {
        let (steps, dt) = self.parameters.dwarf_steps();
        let eps2 = self.engine.eps2;

        let initial = Diagnostics::measure(&self.system, &self.potential, eps2);
        log::info!("start: {initial}");
        log::info!("{steps} steps of {dt} with criterion {}", self.engine.criterion);

        let mut accels = vec![NVec3::zeros(); self.system.len()];
        prime_accelerations(&self.system, &self.forces, &mut accels, 0)?;

        observer(&self.system, 0)?;
        let mut snapshots = 1;

        for step in 1..=steps {
            leapfrog_step(&mut self.system, &self.forces, &mut accels, dt, step)?;
            if step == steps {
                // land on the end time without accumulated rounding
                self.system.t = self.parameters.time_dwarf;
            }

            let periodic = self.parameters.freq_out.is_some_and(|k| step % k == 0);
            if periodic || step == steps {
                log::debug!("snapshot at step {step}, t = {}", self.system.t);
                observer(&self.system, step)?;
                snapshots += 1;
            }
        }

        let last = Diagnostics::measure(&self.system, &self.potential, eps2);
        log::info!("end: {last}");
        log::info!(
            "relative energy drift {:.3e}",
            relative_drift(initial.total_energy(), last.total_energy())
        );

        Ok(RunSummary {
            steps,
            dt,
            snapshots,
            initial,
            last,
        })
    }
}

fn relative_drift(e0: f64, e1: f64) -> f64 {
    if e0 == 0.0 {
        e1 - e0
    } else {
        (e1 - e0) / e0.abs()
    }
}
