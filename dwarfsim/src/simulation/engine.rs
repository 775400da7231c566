//! Force-solver engine settings
//!
//! Selects the tree opening criterion, the accuracy parameter, quadrupole
//! corrections and softening used when building and walking the octree.

use std::fmt;

/// Rule deciding whether a tree cell is far enough away to be treated as a
/// single aggregate source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Never admit a cell; every interaction is particle-particle
    Exact,
    /// Barnes & Hut (1986): admit when `size / distance < theta`
    Bh86,
    /// Barnes (1993): like `Bh86` plus the offset of the center of mass from
    /// the cell's geometric center
    NewCriterion,
    /// Salmon & Warren (1993): uses the distance from the center of mass to
    /// the farthest cell corner, plus the distance the particle sweeps
    /// during one step
    Sw93,
}

impl Criterion {
    pub fn token(&self) -> &'static str {
        match self {
            Criterion::Exact => "exact",
            Criterion::Bh86 => "bh86",
            Criterion::NewCriterion => "new-criterion",
            Criterion::Sw93 => "sw93",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Engine {
    pub criterion: Criterion, // cell admission rule
    pub theta: f64, // accuracy parameter, smaller opens more cells
    pub use_quad: bool, // add quadrupole corrections for admitted cells
    pub eps2: f64, // softening length squared
}

impl Engine {
    pub fn new(criterion: Criterion, theta: f64, use_quad: bool, eps2: f64) -> Self {
        Self {
            criterion,
            theta,
            use_quad,
            eps2,
        }
    }
}
