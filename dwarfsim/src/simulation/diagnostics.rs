//! Conserved-quantity diagnostics logged at the start and end of a run

use std::fmt;

use crate::simulation::potential::GalaxyPotential;
use crate::simulation::states::{NVec3, System3};

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub t: f64,
    pub total_mass: f64,
    pub momentum: NVec3,
    pub center_of_mass: NVec3,
    pub center_of_momentum: NVec3,
    pub kinetic: f64,
    pub self_potential: f64, // softened pairwise sum
    pub external_potential: f64,
}

impl Diagnostics {
    pub fn measure(sys: &System3, potential: &GalaxyPotential, eps2: f64) -> Self {
        let kinetic = sys
            .particles
            .iter()
            .map(|p| 0.5 * p.m * p.v.norm_squared())
            .sum();

        let mut self_potential = 0.0;
        for (i, pi) in sys.particles.iter().enumerate() {
            for pj in &sys.particles[i + 1..] {
                let d2 = (pj.x - pi.x).norm_squared() + eps2;
                self_potential -= pi.m * pj.m / d2.sqrt();
            }
        }

        let external_potential = sys
            .particles
            .iter()
            .map(|p| p.m * potential.potential(&p.x))
            .sum();

        Self {
            t: sys.t,
            total_mass: sys.total_mass(),
            momentum: sys.momentum(),
            center_of_mass: sys.center_of_mass(),
            center_of_momentum: sys.center_of_momentum(),
            kinetic,
            self_potential,
            external_potential,
        }
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic + self.self_potential + self.external_potential
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, v) = (&self.center_of_mass, &self.center_of_momentum);
        write!(
            f,
            "t = {:.6}, mass = {:.6}, E = {:.6e} (K = {:.6e}, W = {:.6e}, U_ext = {:.6e}), \
             com = ({:.4}, {:.4}, {:.4}), vcom = ({:.4}, {:.4}, {:.4})",
            self.t,
            self.total_mass,
            self.total_energy(),
            self.kinetic,
            self.self_potential,
            self.external_potential,
            x.x, x.y, x.z,
            v.x, v.y, v.z,
        )
    }
}
