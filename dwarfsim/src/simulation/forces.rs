//! Force / acceleration contributors for the n-body engine
//!
//! Defines the acceleration trait, the set that sums its terms, and the
//! three terms a run uses: tree self-gravity, direct self-gravity (for
//! validation and benchmarks) and the external galaxy field.

use rayon::prelude::*;

use crate::simulation::barnes_hut::BarnesHutTree3;
use crate::simulation::engine::{Criterion, Engine};
use crate::simulation::potential::GalaxyPotential;
use crate::simulation::states::{NVec3, System3};

/// Collection of acceleration terms (self-gravity, external field)
/// Each term implements [`Acceleration3`] and their contributions are summed
/// into a single acceleration vector per particle
#[derive(Default)]
pub struct AccelSet3 {
    terms: Vec<Box<dyn Acceleration3 + Send + Sync>>,
}

impl AccelSet3 {
    /// Constructor
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Add an acceleration term
    pub fn with(mut self, term: impl Acceleration3 + Send + Sync + 'static) -> Self {
        self.terms.push(Box::new(term));
        self
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Compute total accelerations at time `t` for all particles in `sys`
    /// - `out[i]` will be set to the sum of contributions from all terms
    pub fn accumulate_accels(&self, t: f64, sys: &System3, out: &mut [NVec3]) {
        // Zero buffer
        for a in out.iter_mut() {
            *a = NVec3::zeros();
        }
        // Iterate over all acceleration contributors
        for term in &self.terms {
            term.acceleration(t, sys, out);
        }
    }
}

/// An acceleration source. Implementations add their contribution into
/// `out[i]` for each particle and must not overwrite other terms.
pub trait Acceleration3 {
    fn acceleration(&self, t: f64, sys: &System3, out: &mut [NVec3]);
}

/// Newtonian self-gravity with softening (direct n^2 sum)
pub struct NewtonianGravity3 {
    pub eps2: f64,
}

impl Acceleration3 for NewtonianGravity3 {
    fn acceleration(&self, _t: f64, sys: &System3, out: &mut [NVec3]) {
        let n = sys.particles.len();

        // Loop over each unordered pair (i, j) with i < j
        for i in 0..n {
            let pi = &sys.particles[i];
            for j in (i + 1)..n {
                let pj = &sys.particles[j];

                // r points from i to j: i is pulled along +r, j along -r
                let r = pj.x - pi.x;
                let d2 = r.norm_squared() + self.eps2;
                let inv_r = d2.sqrt().recip();
                let coef = inv_r * inv_r * inv_r;

                out[i] += r * (coef * pj.m);
                out[j] -= r * (coef * pi.m);
            }
        }
    }
}

/// Newtonian self-gravity evaluated via a Barnes–Hut octree
/// The tree is rebuilt from `sys` on every call and walked in parallel,
/// one independent walk per particle
pub struct NewtonianGravityBarnesHut3 {
    pub engine: Engine,
    pub dt: f64, // step length, bounds how far a particle moves for Sw93
}

impl Acceleration3 for NewtonianGravityBarnesHut3 {
    fn acceleration(&self, _t: f64, sys: &System3, out: &mut [NVec3]) {
        let tree = BarnesHutTree3::build(sys, &self.engine);
        log::trace!("octree: {} nodes, depth {}", tree.node_count(), tree.depth());

        let sweep = match self.engine.criterion {
            Criterion::Sw93 => self.dt.abs(),
            _ => 0.0,
        };

        out.par_iter_mut().enumerate().for_each(|(i, a)| {
            let drift = sys.particles[i].v.norm() * sweep;
            *a += tree.force_on_body(i, sys, drift);
        });
    }
}

/// Acceleration from the static galaxy potential at each particle position
pub struct ExternalField {
    pub potential: GalaxyPotential,
}

impl Acceleration3 for ExternalField {
    fn acceleration(&self, _t: f64, sys: &System3, out: &mut [NVec3]) {
        out.par_iter_mut()
            .zip(sys.particles.par_iter())
            .for_each(|(a, p)| *a += self.potential.acceleration(&p.x));
    }
}
