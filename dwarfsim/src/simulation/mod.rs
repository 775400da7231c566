pub mod states;
pub mod params;
pub mod engine;
pub mod potential;
pub mod coordinates;
pub mod dwarf;
pub mod orbit;
pub mod barnes_hut;
pub mod forces;
pub mod integrator;
pub mod diagnostics;
pub mod scenario;
