//! Validated runtime configuration
//!
//! [`SimulationConfig`] is what the rest of the crate consumes. Building it
//! from a [`ParametersFile`] checks every range constraint, derives the
//! default timestep and softening from the dwarf model, and normalizes the
//! initial position to galactocentric Cartesian. Any failure here aborts
//! before a single step runs.

use std::fmt;
use std::path::Path;

use crate::configuration::config::{
    ContextConfig, CriterionConfig, DiskConfig, DwarfModelConfig, HaloConfig, InitialConditionsConfig,
    ParametersFile, PotentialConfig, SphericalConfig,
};
use crate::error::{Result, SimError};
use crate::simulation::coordinates::{Frame, DEFAULT_SUN_GC_DIST};
use crate::simulation::dwarf::DwarfModel;
use crate::simulation::engine::{Criterion, Engine};
use crate::simulation::params::{calculate_eps2, calculate_timestep, Parameters};
use crate::simulation::potential::{Disk, GalaxyPotential, Halo, Spherical};
use crate::simulation::states::NVec3;

/// Present-day state of the dwarf's center of mass, galactocentric Cartesian
#[derive(Debug, Clone, PartialEq)]
pub struct InitialConditions {
    pub frame: Frame, // how `position` was given in the file
    pub position: NVec3,
    pub velocity: NVec3,
}

impl InitialConditions {
    pub fn from_config(cfg: &InitialConditionsConfig, sun_gc_dist: f64) -> Result<Self> {
        let frame = Frame::from_flags(cfg.use_gal_c, cfg.angle_use_radians, sun_gc_dist);
        finite_triple("initial-conditions.position", &cfg.position)?;
        finite_triple("initial-conditions.velocity", &cfg.velocity)?;
        if matches!(frame, Frame::Heliocentric { .. }) && cfg.position[2] < 0.0 {
            return Err(SimError::Configuration(format!(
                "initial-conditions.position: heliocentric distance must be >= 0, got {}",
                cfg.position[2]
            )));
        }

        Ok(Self {
            frame,
            position: frame.to_cartesian(cfg.position),
            velocity: NVec3::new(cfg.velocity[0], cfg.velocity[1], cfg.velocity[2]),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub headline: String,
    pub engine: Engine,
    pub parameters: Parameters,
    pub potential: GalaxyPotential,
    pub dwarf: DwarfModel,
    pub initial: InitialConditions,
    pub sun_gc_dist: f64,
    pub output_cartesian: bool,
}

impl SimulationConfig {
    /// Read, parse and validate a parameter file
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_file(&ParametersFile::load(path)?)
    }

    /// Parse and validate parameter file text
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_file(&ParametersFile::parse(text)?)
    }

    pub fn from_file(file: &ParametersFile) -> Result<Self> {
        let ctx: &ContextConfig = &file.parameters.nbody_context;

        let theta = positive("accuracy-parameter", ctx.accuracy_parameter)?;
        let sun_gc_dist = match ctx.sun_gc_dist {
            Some(d) => non_negative("sun-gc-dist", d)?,
            None => DEFAULT_SUN_GC_DIST,
        };
        if ctx.freq_out == Some(0) {
            return Err(SimError::Configuration("freq-out must be at least 1".into()));
        }

        let potential = potential_from_config(&ctx.potential)?;

        let DwarfModelConfig::Plummer(plummer) = &ctx.dwarf_model;
        let mass = positive("dwarf-model.plummer.mass", plummer.mass)?;
        let scale_radius = positive("dwarf-model.plummer.scale-radius", plummer.scale_radius)?;
        if plummer.nbody == 0 {
            return Err(SimError::Configuration("dwarf-model.plummer.nbody must be at least 1".into()));
        }
        let dwarf = DwarfModel::Plummer {
            mass,
            nbody: plummer.nbody,
            scale_radius,
        };

        let timestep = match plummer.timestep {
            Some(dt) => positive("dwarf-model.plummer.timestep", dt)?,
            None => calculate_timestep(mass, scale_radius),
        };
        let orbit_timestep = match plummer.orbit_timestep {
            Some(dt) => positive("dwarf-model.plummer.orbit-timestep", dt)?,
            None => timestep,
        };
        let eps2 = match plummer.eps {
            Some(eps) => positive("dwarf-model.plummer.eps", eps)?.powi(2),
            None => calculate_eps2(plummer.nbody, scale_radius),
        };

        let parameters = Parameters {
            seed: ctx.seed,
            timestep,
            orbit_timestep,
            time_orbit: non_negative("dwarf-model.plummer.time-orbit", plummer.time_orbit)?,
            time_dwarf: non_negative("dwarf-model.plummer.time-dwarf", plummer.time_dwarf)?,
            freq_out: ctx.freq_out,
        };

        let criterion = match ctx.criterion {
            CriterionConfig::Exact => Criterion::Exact,
            CriterionConfig::Bh86 => Criterion::Bh86,
            CriterionConfig::NewCriterion => Criterion::NewCriterion,
            CriterionConfig::Sw93 => Criterion::Sw93,
        };
        let engine = Engine::new(criterion, theta, ctx.use_quadrupole_corrections, eps2);

        let initial = InitialConditions::from_config(&file.parameters.initial_conditions, sun_gc_dist)?;

        Ok(Self {
            headline: ctx.headline.clone(),
            engine,
            parameters,
            potential,
            dwarf,
            initial,
            sun_gc_dist,
            output_cartesian: ctx.output_cartesian.unwrap_or(true),
        })
    }
}

fn potential_from_config(cfg: &PotentialConfig) -> Result<GalaxyPotential> {
    let disk = match &cfg.disk {
        None => None,
        Some(DiskConfig::MiyamotoNagai(d)) => Some(Disk::MiyamotoNagai {
            mass: positive("potential.disk.miyamoto-nagai.mass", d.mass)?,
            scale_length: positive("potential.disk.miyamoto-nagai.scale-length", d.scale_length)?,
            scale_height: positive("potential.disk.miyamoto-nagai.scale-height", d.scale_height)?,
        }),
        Some(DiskConfig::Exponential(d)) => Some(Disk::Exponential {
            mass: positive("potential.disk.exponential.mass", d.mass)?,
            scale_length: positive("potential.disk.exponential.scale-length", d.scale_length)?,
        }),
    };

    let spherical = match &cfg.spherical {
        None => None,
        Some(SphericalConfig::Sphere(s)) => Some(Spherical::Hernquist {
            mass: positive("potential.spherical.sphere.mass", s.mass)?,
            scale: positive("potential.spherical.sphere.r0-scale", s.r0_scale)?,
        }),
    };

    let halo = match &cfg.halo {
        None => None,
        Some(HaloConfig::Logarithmic(h)) => {
            if h.x_flattening.is_some() || h.y_flattening.is_some() || h.triaxial_angle.is_some() {
                log::debug!("logarithmic halo ignores x-flattening, y-flattening and triaxial-angle");
            }
            Some(Halo::Logarithmic {
                vhalo: positive("potential.halo.logarithmic.vhalo", h.vhalo)?,
                scale_length: positive("potential.halo.logarithmic.scale-length", h.scale_length)?,
                flatten_z: positive("potential.halo.logarithmic.z-flattening", h.z_flattening)?,
            })
        }
        Some(HaloConfig::Nfw(h)) => Some(Halo::Nfw {
            vhalo: positive("potential.halo.nfw.vhalo", h.vhalo)?,
            scale_length: positive("potential.halo.nfw.scale-length", h.scale_length)?,
        }),
        Some(HaloConfig::Triaxial(h)) => Some(Halo::Triaxial {
            vhalo: positive("potential.halo.triaxial.vhalo", h.vhalo)?,
            scale_length: positive("potential.halo.triaxial.scale-length", h.scale_length)?,
            flatten_x: positive("potential.halo.triaxial.x-flattening", h.x_flattening)?,
            flatten_y: positive("potential.halo.triaxial.y-flattening", h.y_flattening)?,
            flatten_z: positive("potential.halo.triaxial.z-flattening", h.z_flattening)?,
            triax_angle: finite("potential.halo.triaxial.triaxial-angle", h.triaxial_angle)?,
        }),
    };

    Ok(GalaxyPotential {
        disk,
        spherical,
        halo,
    })
}

fn finite(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SimError::Configuration(format!("{name} must be finite, got {value}")))
    }
}

fn positive(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(SimError::Configuration(format!("{name} must be positive, got {value}")))
    }
}

fn non_negative(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(SimError::Configuration(format!("{name} must be >= 0, got {value}")))
    }
}

fn finite_triple(name: &str, values: &[f64; 3]) -> Result<()> {
    for v in values {
        finite(name, *v)?;
    }
    Ok(())
}

impl fmt::Display for InitialConditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, v) = (&self.position, &self.velocity);
        writeln!(f, "initial-conditions = {{")?;
        writeln!(f, "  given in = {}", self.frame)?;
        writeln!(f, "  position = {{ {}, {}, {} }}", x.x, x.y, x.z)?;
        writeln!(f, "  velocity = {{ {}, {}, {} }}", v.x, v.y, v.z)?;
        write!(f, "}}")
    }
}

impl fmt::Display for SimulationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.parameters;
        writeln!(f, "ctx = {{")?;
        writeln!(f, "  headline        = {}", self.headline)?;
        writeln!(f, "  pot             = {}", self.potential)?;
        writeln!(f, "  model           = {}", self.dwarf)?;
        writeln!(f, "  criterion       = {}", self.engine.criterion)?;
        writeln!(f, "  usequad         = {}", self.engine.use_quad)?;
        writeln!(f, "  theta           = {}", self.engine.theta)?;
        writeln!(f, "  eps2            = {}", self.engine.eps2)?;
        writeln!(f, "  seed            = {}", p.seed)?;
        writeln!(f, "  timestep        = {}", p.timestep)?;
        writeln!(f, "  orbit_timestep  = {}", p.orbit_timestep)?;
        writeln!(f, "  time_orbit      = {}", p.time_orbit)?;
        writeln!(f, "  time_dwarf      = {}", p.time_dwarf)?;
        match p.freq_out {
            Some(k) => writeln!(f, "  freqout         = {k}")?,
            None => writeln!(f, "  freqout         = final only")?,
        }
        writeln!(f, "  sunGCDist       = {}", self.sun_gc_dist)?;
        writeln!(f, "  outputCartesian = {}", self.output_cartesian)?;
        writeln!(f, "}};")?;
        write!(f, "{}", self.initial)
    }
}
