pub mod error;
pub mod simulation;
pub mod configuration;
pub mod output;
pub mod benchmark;

pub use error::{Result, SimError};

pub use simulation::states::{Particle, System3, NVec3, NMat3};
pub use simulation::engine::{Criterion, Engine};
pub use simulation::params::Parameters;
pub use simulation::potential::{Disk, GalaxyPotential, Halo, Spherical};
pub use simulation::dwarf::DwarfModel;
pub use simulation::forces::{Acceleration3, AccelSet3, ExternalField, NewtonianGravity3, NewtonianGravityBarnesHut3};
pub use simulation::integrator::{leapfrog_step, prime_accelerations};
pub use simulation::scenario::{RunSummary, Scenario};

pub use configuration::config::ParametersFile;
pub use configuration::context::SimulationConfig;

pub use output::snapshot::{save_snapshot, write_snapshot, SnapshotFormat};

pub use benchmark::benchmark::{bench_gravity, bench_leapfrog};
