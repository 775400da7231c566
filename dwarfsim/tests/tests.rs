use std::fs;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;

use dwarfsim::simulation::barnes_hut::{BarnesHutTree3, LEAF_CAPACITY, MAX_DEPTH};
use dwarfsim::simulation::coordinates::{cartesian_to_lbr, lbr_to_cartesian, AngleUnit, Frame};
use dwarfsim::simulation::diagnostics::Diagnostics;
use dwarfsim::simulation::dwarf::DwarfModel;
use dwarfsim::simulation::engine::{Criterion, Engine};
use dwarfsim::simulation::forces::{AccelSet3, Acceleration3, ExternalField, NewtonianGravity3, NewtonianGravityBarnesHut3};
use dwarfsim::simulation::integrator::{leapfrog_step, prime_accelerations};
use dwarfsim::simulation::orbit::{forward_orbit, reverse_orbit, OrbitPoint};
use dwarfsim::simulation::params::{calculate_eps2, calculate_timestep, Parameters};
use dwarfsim::simulation::potential::{Disk, GalaxyPotential, Halo, Spherical};
use dwarfsim::simulation::states::{NVec3, Particle, System3};
use dwarfsim::output::snapshot::{step_path, write_snapshot, SnapshotFormat};
use dwarfsim::{Scenario, SimError, SimulationConfig};

/// Build a simple 2-particle System3 separated along x-axis
pub fn two_particle_system(dist: f64, m1: f64, m2: f64) -> System3 {
    System3::new(vec![
        Particle::new(NVec3::new(-dist / 2.0, 0.0, 0.0), NVec3::zeros(), m1),
        Particle::new(NVec3::new(dist / 2.0, 0.0, 0.0), NVec3::zeros(), m2),
    ])
}

/// Plummer sphere of `n` particles at rest at the origin
pub fn plummer_system(n: usize, seed: u64) -> System3 {
    let model = DwarfModel::Plummer {
        mass: 10.0,
        nbody: n,
        scale_radius: 0.3,
    };
    System3::new(model.generate(seed, NVec3::zeros(), NVec3::zeros()).unwrap())
}

/// Build a direct gravity term + AccelSet
pub fn gravity_set(eps2: f64) -> AccelSet3 {
    AccelSet3::new().with(NewtonianGravity3 { eps2 })
}

pub fn accels_of(term: &impl Acceleration3, sys: &System3) -> Vec<NVec3> {
    let mut out = vec![NVec3::zeros(); sys.len()];
    term.acceleration(sys.t, sys, &mut out);
    out
}

/// Norm of the error over norm of the exact accelerations, over all particles
pub fn rms_rel_err(approx: &[NVec3], exact: &[NVec3]) -> f64 {
    let err: f64 = approx.iter().zip(exact).map(|(a, b)| (a - b).norm_squared()).sum();
    let norm: f64 = exact.iter().map(|b| b.norm_squared()).sum();
    (err / norm).sqrt()
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(name)
}

pub fn fixture_text() -> String {
    fs::read_to_string(fixture_path("test_set1.js")).unwrap()
}

pub fn milky_way() -> GalaxyPotential {
    GalaxyPotential {
        disk: Some(Disk::MiyamotoNagai {
            mass: 4.45865888e5,
            scale_length: 6.5,
            scale_height: 0.26,
        }),
        spherical: Some(Spherical::Hernquist {
            mass: 1.52954402e5,
            scale: 0.7,
        }),
        halo: Some(Halo::Logarithmic {
            vhalo: 73.0,
            scale_length: 12.0,
            flatten_z: 1.1,
        }),
    }
}

// ==================================================================================
// Gravity tests
// ==================================================================================

#[test]
fn gravity_newton_third_law() {
    let sys = two_particle_system(1.0, 2.0, 3.0);
    let forces = gravity_set(0.0);

    let mut acc = vec![NVec3::zeros(); 2];
    forces.accumulate_accels(sys.t, &sys, &mut acc);

    let net = acc[0] * sys.particles[0].m + acc[1] * sys.particles[1].m;

    assert!(net.norm() < 1e-12, "Net force not zero: {:?}", net);
}

#[test]
fn gravity_points_toward_other_particle() {
    let sys = two_particle_system(2.0, 1.0, 1.0);
    let forces = gravity_set(0.0);

    let mut acc = vec![NVec3::zeros(); 2];
    forces.accumulate_accels(sys.t, &sys, &mut acc);

    let dx = sys.particles[1].x - sys.particles[0].x;
    assert!(acc[0].dot(&dx) > 0.0, "Acceleration is not toward second particle");
    assert_relative_eq!(acc[0].norm(), 0.25, max_relative = 1e-12);
}

#[test]
fn gravity_inverse_square_law() {
    let sys_r = two_particle_system(1.0, 1.0, 1.0);
    let sys_2r = two_particle_system(2.0, 1.0, 1.0);
    let forces = gravity_set(0.0);

    let mut acc_r = vec![NVec3::zeros(); 2];
    let mut acc_2r = vec![NVec3::zeros(); 2];
    forces.accumulate_accels(sys_r.t, &sys_r, &mut acc_r);
    forces.accumulate_accels(sys_2r.t, &sys_2r, &mut acc_2r);

    let ratio = acc_r[0].norm() / acc_2r[0].norm();
    assert_relative_eq!(ratio, 4.0, max_relative = 1e-12);
}

#[test]
fn gravity_softening_prevents_blowup() {
    let sys = two_particle_system(1e-9, 1.0, 1.0);
    let forces = gravity_set(0.1);

    let mut acc = vec![NVec3::zeros(); 2];
    forces.accumulate_accels(sys.t, &sys, &mut acc);

    assert!(acc[0].norm() < 1e-6, "Softening failed; acceleration too large");
}

#[test]
fn accel_set_sums_terms() {
    let sys = two_particle_system(1.0, 1.0, 1.0);
    let pot = milky_way();
    let forces = AccelSet3::new()
        .with(NewtonianGravity3 { eps2: 0.0 })
        .with(ExternalField { potential: pot });
    assert_eq!(forces.len(), 2);

    // stale values in the buffer must not leak into the sum
    let mut acc = vec![NVec3::repeat(1.0e3); 2];
    forces.accumulate_accels(0.0, &sys, &mut acc);

    let expected = NVec3::new(1.0, 0.0, 0.0) + pot.acceleration(&sys.particles[0].x);
    assert_relative_eq!(acc[0], expected, max_relative = 1e-12);
}

// ==================================================================================
// Potential tests
// ==================================================================================

fn all_components() -> Vec<GalaxyPotential> {
    let disks = [
        Disk::MiyamotoNagai {
            mass: 4.45865888e5,
            scale_length: 6.5,
            scale_height: 0.26,
        },
        Disk::Exponential {
            mass: 2.2e5,
            scale_length: 4.0,
        },
    ];
    let halos = [
        Halo::Logarithmic {
            vhalo: 73.0,
            scale_length: 12.0,
            flatten_z: 1.1,
        },
        Halo::Nfw {
            vhalo: 155.0,
            scale_length: 22.25,
        },
        Halo::Triaxial {
            vhalo: 116.0,
            scale_length: 16.3,
            flatten_x: 1.38,
            flatten_y: 1.0,
            flatten_z: 1.36,
            triax_angle: 96.0,
        },
    ];

    let mut out: Vec<GalaxyPotential> = disks
        .iter()
        .map(|d| GalaxyPotential {
            disk: Some(*d),
            ..Default::default()
        })
        .collect();
    out.push(GalaxyPotential {
        spherical: Some(Spherical::Hernquist {
            mass: 1.52954402e5,
            scale: 0.7,
        }),
        ..Default::default()
    });
    out.extend(halos.iter().map(|h| GalaxyPotential {
        halo: Some(*h),
        ..Default::default()
    }));
    out
}

#[test]
fn potential_acceleration_is_minus_gradient() {
    let points = [
        NVec3::new(8.0, 0.0, 0.0),
        NVec3::new(-3.0, 5.0, 1.5),
        NVec3::new(20.0, -11.0, 30.0),
        NVec3::new(0.3, 0.2, -0.4),
    ];
    let h = 1e-5;

    for pot in all_components() {
        for x in &points {
            let mut grad = NVec3::zeros();
            for k in 0..3 {
                let mut xp = *x;
                let mut xm = *x;
                xp[k] += h;
                xm[k] -= h;
                grad[k] = (pot.potential(&xp) - pot.potential(&xm)) / (2.0 * h);
            }
            let acc = pot.acceleration(x);
            assert!(
                (acc + grad).norm() <= 1e-5 * acc.norm(),
                "{pot:?} at {x:?}: acc = {acc:?}, -grad = {:?}",
                -grad
            );
        }
    }
}

#[test]
fn potential_finite_at_origin() {
    for pot in all_components() {
        let acc = pot.acceleration(&NVec3::zeros());
        assert!(acc.iter().all(|c| c.is_finite()), "{pot:?}");
        assert!(pot.potential(&NVec3::zeros()).is_finite(), "{pot:?}");
    }
}

#[test]
fn empty_potential_contributes_nothing() {
    let pot = GalaxyPotential::default();
    assert!(pot.is_empty());
    assert_eq!(pot.acceleration(&NVec3::new(1.0, 2.0, 3.0)), NVec3::zeros());
    assert_eq!(pot.potential(&NVec3::new(1.0, 2.0, 3.0)), 0.0);
}

#[test]
fn components_add_up() {
    let pot = milky_way();
    let x = NVec3::new(4.0, -7.0, 2.5);
    let parts = pot.disk.unwrap().acceleration(&x)
        + pot.spherical.unwrap().acceleration(&x)
        + pot.halo.unwrap().acceleration(&x);
    assert_relative_eq!(pot.acceleration(&x), parts, max_relative = 1e-14);
}

#[test]
fn round_triaxial_halo_matches_logarithmic() {
    let log = Halo::Logarithmic {
        vhalo: 73.0,
        scale_length: 12.0,
        flatten_z: 1.1,
    };
    let tri = Halo::Triaxial {
        vhalo: 73.0,
        scale_length: 12.0,
        flatten_x: 1.0,
        flatten_y: 1.0,
        flatten_z: 1.1,
        triax_angle: 37.0,
    };
    let x = NVec3::new(5.0, -2.0, 9.0);
    assert_relative_eq!(log.acceleration(&x), tri.acceleration(&x), max_relative = 1e-12);
    assert_relative_eq!(log.potential(&x), tri.potential(&x), max_relative = 1e-12);
}

#[test]
fn disk_pulls_toward_midplane() {
    let disk = Disk::MiyamotoNagai {
        mass: 4.45865888e5,
        scale_length: 6.5,
        scale_height: 0.26,
    };
    let above = disk.acceleration(&NVec3::new(8.0, 0.0, 1.0));
    let below = disk.acceleration(&NVec3::new(8.0, 0.0, -1.0));
    assert!(above.z < 0.0 && below.z > 0.0);
    assert_relative_eq!(above.z, -below.z, max_relative = 1e-14);
}

#[test]
fn exponential_disk_is_smooth_near_center() {
    let disk = Disk::Exponential {
        mass: 1.0,
        scale_length: 1.0,
    };
    // |a| tends to M / (2 b^2)
    for r in [1e-3, 1e-6, 1e-7, 1e-8, 1e-9, 1e-10] {
        let x = NVec3::new(r, 0.0, 0.0);
        let acc = disk.acceleration(&x);
        assert_relative_eq!(acc.x, -0.5 + r / 3.0 - r * r / 8.0, max_relative = 1e-9);
        assert_eq!((acc.y, acc.z), (0.0, 0.0));
        assert_relative_eq!(disk.potential(&x), -1.0 + r / 2.0 - r * r / 6.0, max_relative = 1e-9);
    }

    // no jump where the series hands over to the closed form
    let below = disk.acceleration(&NVec3::new(0.0, 0.0, 0.01 * (1.0 - 1e-9)));
    let above = disk.acceleration(&NVec3::new(0.0, 0.0, 0.01 * (1.0 + 1e-9)));
    assert_relative_eq!(below.z, above.z, max_relative = 1e-8);

    // the closed form is still accurate enough to compare against here
    let r: f64 = 0.005;
    let closed = ((-r).exp() * (1.0 + r) - 1.0) / (r * r);
    assert_relative_eq!(disk.acceleration(&NVec3::new(r, 0.0, 0.0)).x, closed, max_relative = 1e-9);
}

// ==================================================================================
// Coordinate tests
// ==================================================================================

#[test]
fn galactocentric_position_passes_through() {
    let frame = Frame::from_flags(true, false, 8.0);
    assert_eq!(frame.to_cartesian([1.0, -2.0, 3.0]), NVec3::new(1.0, -2.0, 3.0));
}

#[test]
fn sun_and_galactic_center_in_lbr() {
    let sun = lbr_to_cartesian(1.0, 0.5, 0.0, 8.0);
    assert_relative_eq!(sun, NVec3::new(-8.0, 0.0, 0.0));

    let center = lbr_to_cartesian(0.0, 0.0, 8.0, 8.0);
    assert_relative_eq!(center, NVec3::zeros(), epsilon = 1e-12);

    let (l, b, r) = cartesian_to_lbr(&NVec3::new(-8.0, 3.0, 0.0), 8.0);
    assert_relative_eq!(l, std::f64::consts::FRAC_PI_2);
    assert_relative_eq!(b, 0.0);
    assert_relative_eq!(r, 3.0);
}

#[test]
fn degree_and_radian_flags_agree() {
    let deg = Frame::from_flags(false, false, 8.0);
    let rad = Frame::from_flags(false, true, 8.0);

    let from_deg = deg.to_cartesian([28.6, 218.0, 53.5]);
    let from_rad = rad.to_cartesian([28.6_f64.to_radians(), 218.0_f64.to_radians(), 53.5]);
    assert_relative_eq!(from_deg, from_rad, max_relative = 1e-12);
}

#[test]
fn lbr_round_trips_through_cartesian() {
    let points = [
        NVec3::new(12.0, -4.5, 20.0),
        NVec3::new(-30.0, 0.1, -2.0),
        NVec3::new(0.0, 0.0, 0.0),
        NVec3::new(-7.9, -0.3, 0.05),
    ];
    for unit in [false, true] {
        let frame = Frame::from_flags(false, unit, 8.0);
        for x in &points {
            let lbr = frame.to_cartesian(frame.from_cartesian(x));
            assert_relative_eq!(lbr, *x, epsilon = 1e-10);
        }
    }

    // both conventions describe the same point
    let x = NVec3::new(12.0, -4.5, 20.0);
    let helio = Frame::from_flags(false, false, 8.0);
    let galc = Frame::from_flags(true, false, 8.0);
    assert_relative_eq!(
        helio.to_cartesian(helio.from_cartesian(&x)),
        galc.to_cartesian(galc.from_cartesian(&x)),
        epsilon = 1e-10
    );
}

#[test]
fn longitude_is_wrapped() {
    let frame = Frame::Heliocentric {
        angles: AngleUnit::Degrees,
        sun_gc_dist: 8.0,
    };
    let [l, _, _] = frame.from_cartesian(&NVec3::new(-8.0, -5.0, 0.0));
    assert_relative_eq!(l, 270.0, epsilon = 1e-10);
}

// ==================================================================================
// Initial condition tests
// ==================================================================================

#[test]
fn same_seed_same_particles() {
    let a = plummer_system(500, 3);
    let b = plummer_system(500, 3);
    let c = plummer_system(500, 4);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn sample_is_centered_then_shifted() {
    let sys = plummer_system(1000, 0);
    assert!(sys.center_of_mass().norm() < 1e-12);
    assert!(sys.center_of_momentum().norm() < 1e-12);

    let model = DwarfModel::Plummer {
        mass: 10.0,
        nbody: 1000,
        scale_radius: 0.3,
    };
    let shift_x = NVec3::new(30.0, -5.0, 12.0);
    let shift_v = NVec3::new(-156.0, 79.0, 107.0);
    let shifted = System3::new(model.generate(0, shift_x, shift_v).unwrap());
    assert_relative_eq!(shifted.center_of_mass(), shift_x, max_relative = 1e-12);
    assert_relative_eq!(shifted.center_of_momentum(), shift_v, max_relative = 1e-12);
}

#[test]
fn sample_has_equal_masses() {
    let sys = plummer_system(250, 1);
    assert_eq!(sys.len(), 250);
    for p in &sys.particles {
        assert_relative_eq!(p.m, 10.0 / 250.0);
    }
    assert_relative_eq!(sys.total_mass(), 10.0, max_relative = 1e-12);
}

#[test]
fn sample_follows_plummer_mass_profile() {
    let n = 20_000;
    let sys = plummer_system(n, 11);
    let a = 0.3;

    let mut radii: Vec<f64> = sys.particles.iter().map(|p| p.x.norm()).collect();
    radii.sort_by(|x, y| x.total_cmp(y));
    assert!(radii[n - 1] < 100.0 * a + 1.0);

    // half-mass radius of a Plummer sphere is a / sqrt(2^(2/3) - 1)
    let half_mass = a / (2.0_f64.powf(2.0 / 3.0) - 1.0).sqrt();
    assert_relative_eq!(radii[n / 2], half_mass, max_relative = 0.05);

    let model = DwarfModel::Plummer {
        mass: 10.0,
        nbody: n,
        scale_radius: a,
    };
    assert_relative_eq!(model.enclosed_mass(half_mass), 5.0, max_relative = 1e-12);
}

#[test]
fn plummer_profile_is_self_consistent() {
    let model = DwarfModel::Plummer {
        mass: 10.0,
        nbody: 100,
        scale_radius: 0.3,
    };
    let h = 1e-6;
    for r in [0.05, 0.3, 1.0, 4.0] {
        // dM/dr = 4 pi r^2 rho
        let dm = (model.enclosed_mass(r + h) - model.enclosed_mass(r - h)) / (2.0 * h);
        assert_relative_eq!(dm, 4.0 * std::f64::consts::PI * r * r * model.density(r), max_relative = 1e-6);

        // -dPhi/dr = -M(<r) / r^2
        let dphi = (model.potential(r + h) - model.potential(r - h)) / (2.0 * h);
        assert_relative_eq!(dphi, model.enclosed_mass(r) / (r * r), max_relative = 1e-6);
    }
    assert_relative_eq!(model.enclosed_mass(1.0e6), 10.0, max_relative = 1e-9);
}

#[test]
fn hernquist_and_nfw_profiles_are_self_consistent() {
    let models = [
        DwarfModel::Hernquist {
            mass: 10.0,
            nbody: 100,
            scale_radius: 0.3,
        },
        DwarfModel::Nfw {
            mass: 10.0,
            nbody: 100,
            scale_radius: 0.3,
        },
    ];
    let h = 1e-6;
    for model in models {
        for r in [0.05, 0.3, 1.0, 4.0] {
            let dm = (model.enclosed_mass(r + h) - model.enclosed_mass(r - h)) / (2.0 * h);
            assert_relative_eq!(dm, 4.0 * std::f64::consts::PI * r * r * model.density(r), max_relative = 1e-6);

            let dphi = (model.potential(r + h) - model.potential(r - h)) / (2.0 * h);
            assert_relative_eq!(dphi, model.enclosed_mass(r) / (r * r), max_relative = 1e-6);
        }
        assert!(model.potential(0.0).is_finite());
        assert_eq!(model.enclosed_mass(0.0), 0.0);
    }

    // Hernquist holds half its mass inside (1 + sqrt 2) a
    let hernquist = models[0];
    assert_relative_eq!(hernquist.enclosed_mass(0.3 * (1.0 + 2.0_f64.sqrt())), 5.0, max_relative = 1e-12);
    assert_relative_eq!(hernquist.potential(0.0), -10.0 / 0.3, max_relative = 1e-12);
}

#[test]
fn only_plummer_dwarfs_are_sampled() {
    let nfw = DwarfModel::Nfw {
        mass: 10.0,
        nbody: 100,
        scale_radius: 0.3,
    };
    let err = nfw.generate(0, NVec3::zeros(), NVec3::zeros()).unwrap_err();
    assert!(matches!(err, SimError::Configuration(_)));
    assert_eq!(nfw.to_string(), "nfw { mass = 10, nbody = 100, scale-radius = 0.3 }");
}

#[test]
fn sample_is_near_virial_equilibrium() {
    let sys = plummer_system(2000, 5);
    let diag = Diagnostics::measure(&sys, &GalaxyPotential::default(), calculate_eps2(2000, 0.3));
    let ratio = 2.0 * diag.kinetic / -diag.self_potential;
    assert!((ratio - 1.0).abs() < 0.15, "2K/|W| = {ratio}");
}

#[test]
fn derived_timestep_and_softening() {
    let dt = calculate_timestep(10.0, 0.3);
    let dynamical = (4.0 / 3.0 * std::f64::consts::PI * 0.027 / 10.0_f64).sqrt();
    assert_relative_eq!(dt, 0.01 * dynamical, max_relative = 1e-12);
    assert_relative_eq!(calculate_eps2(100, 0.3), (0.3_f64 / 100.0).powi(2), max_relative = 1e-12);
}

// ==================================================================================
// Barnes-Hut tests
// ==================================================================================

fn engine(criterion: Criterion, theta: f64, use_quad: bool) -> Engine {
    Engine::new(criterion, theta, use_quad, calculate_eps2(500, 0.3))
}

#[test]
fn empty_tree() {
    let sys = System3::new(Vec::new());
    let tree = BarnesHutTree3::build(&sys, &engine(Criterion::Sw93, 1.0, true));
    assert!(tree.is_empty());

    let bh = NewtonianGravityBarnesHut3 {
        engine: engine(Criterion::Sw93, 1.0, true),
        dt: 0.01,
    };
    assert!(accels_of(&bh, &sys).is_empty());
}

#[test]
fn single_particle_feels_nothing() {
    let sys = System3::new(vec![Particle::new(NVec3::new(1.0, 2.0, 3.0), NVec3::zeros(), 5.0)]);
    let tree = BarnesHutTree3::build(&sys, &engine(Criterion::Bh86, 1.0, true));
    assert_eq!(tree.node_count(), 1);
    assert!(tree.nodes[tree.root].is_leaf());
    assert_eq!(tree.force_on_body(0, &sys, 0.0), NVec3::zeros());
}

#[test]
fn coincident_particles_terminate() {
    let x = NVec3::new(0.5, 0.5, 0.5);
    let mut particles = vec![Particle::new(x, NVec3::zeros(), 1.0); 10];
    particles.push(Particle::new(NVec3::new(2.0, 0.0, 0.0), NVec3::zeros(), 1.0));
    let sys = System3::new(particles);

    let tree = BarnesHutTree3::build(&sys, &engine(Criterion::Sw93, 1.0, true));
    assert!(tree.depth() <= MAX_DEPTH);
    assert_relative_eq!(tree.nodes[tree.root].mass, 11.0);

    let bh = NewtonianGravityBarnesHut3 {
        engine: engine(Criterion::Sw93, 1.0, true),
        dt: 0.01,
    };
    let acc = accels_of(&bh, &sys);
    assert!(acc.iter().all(|a| a.iter().all(|c| c.is_finite())));
    // only the distant particle pulls on the stack
    assert!(acc[0].x > 0.0);
}

#[test]
fn tree_moments_match_system() {
    let sys = plummer_system(500, 2);
    let tree = BarnesHutTree3::build(&sys, &engine(Criterion::Bh86, 1.0, true));
    let root = &tree.nodes[tree.root];

    assert_relative_eq!(root.mass, sys.total_mass(), max_relative = 1e-12);
    assert_relative_eq!(root.com, sys.center_of_mass(), epsilon = 1e-12);

    // trace of a traceless quadrupole
    assert!(root.quad.trace().abs() < 1e-9 * root.quad.norm());

    for idx in 0..tree.node_count() {
        let sum: f64 = tree.bodies_of(idx).iter().map(|&b| sys.particles[b].m).sum();
        assert_relative_eq!(tree.nodes[idx].mass, sum, max_relative = 1e-12);
    }
}

#[test]
fn every_particle_in_exactly_one_leaf() {
    let sys = plummer_system(500, 9);
    let tree = BarnesHutTree3::build(&sys, &engine(Criterion::Bh86, 1.0, false));

    let mut seen: Vec<usize> = (0..tree.node_count())
        .filter(|&i| tree.nodes[i].is_leaf())
        .flat_map(|i| tree.bodies_of(i).to_vec())
        .collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..500).collect::<Vec<_>>());

    for i in 0..tree.node_count() {
        let node = &tree.nodes[i];
        for &b in tree.bodies_of(i) {
            assert!(node.contains(&sys.particles[b].x));
        }
    }
}

#[test]
fn small_nodes_are_not_split() {
    let sys = two_particle_system(1.0, 1.0, 2.0);
    let tree = BarnesHutTree3::build(&sys, &engine(Criterion::Bh86, 1.0, false));
    let leaves: Vec<usize> = (0..tree.node_count()).filter(|&i| tree.nodes[i].is_leaf()).collect();
    assert_eq!(leaves.len(), 2);

    let sys = plummer_system(500, 4);
    let tree = BarnesHutTree3::build(&sys, &engine(Criterion::Bh86, 1.0, false));
    for (i, node) in tree.nodes.iter().enumerate() {
        if node.is_leaf() {
            assert!(node.body_count <= LEAF_CAPACITY || node.depth >= MAX_DEPTH);
        } else {
            assert!(tree.bodies_of(i).len() > LEAF_CAPACITY);
        }
    }
}

#[test]
fn exact_criterion_equals_direct_sum() {
    let sys = plummer_system(300, 4);
    let eps2 = calculate_eps2(300, 0.3);
    let direct = accels_of(&NewtonianGravity3 { eps2 }, &sys);

    for use_quad in [false, true] {
        let bh = NewtonianGravityBarnesHut3 {
            engine: Engine::new(Criterion::Exact, 1.0, use_quad, eps2),
            dt: 0.01,
        };
        let tree = accels_of(&bh, &sys);
        for (a, b) in tree.iter().zip(&direct) {
            assert_relative_eq!(*a, *b, max_relative = 1e-10, epsilon = 1e-12);
        }
    }
}

#[test]
fn quadrupole_is_inert_for_exact() {
    let sys = plummer_system(200, 8);
    let without = accels_of(
        &NewtonianGravityBarnesHut3 {
            engine: engine(Criterion::Exact, 1.0, false),
            dt: 0.01,
        },
        &sys,
    );
    let with = accels_of(
        &NewtonianGravityBarnesHut3 {
            engine: engine(Criterion::Exact, 1.0, true),
            dt: 0.01,
        },
        &sys,
    );
    assert_eq!(without, with);
}

#[test]
fn tree_converges_to_direct_as_theta_shrinks() {
    let sys = plummer_system(800, 6);
    let eps2 = calculate_eps2(800, 0.3);
    let direct = accels_of(&NewtonianGravity3 { eps2 }, &sys);

    for criterion in [Criterion::Bh86, Criterion::NewCriterion, Criterion::Sw93] {
        let err_at = |theta: f64| {
            let bh = NewtonianGravityBarnesHut3 {
                engine: Engine::new(criterion, theta, false, eps2),
                dt: 0.0,
            };
            rms_rel_err(&accels_of(&bh, &sys), &direct)
        };
        let coarse = err_at(1.0);
        let fine = err_at(0.2);
        assert!(fine < coarse, "{criterion}: fine {fine} !< coarse {coarse}");
        assert!(fine < 1e-2, "{criterion}: fine {fine}");
    }
}

#[test]
fn quadrupole_improves_far_field() {
    // an asymmetric clump far from a light tracer
    let clump = [
        (NVec3::new(-1.0, -0.9, -0.3), 3.0),
        (NVec3::new(-0.2, -0.8, -0.7), 1.0),
        (NVec3::new(-0.6, -0.2, -1.0), 2.0),
        (NVec3::new(-0.9, -0.5, -0.6), 0.5),
        (NVec3::new(-0.3, -0.4, -0.2), 1.5),
        (NVec3::new(-0.7, -1.0, -0.9), 2.5),
    ];
    let mut particles: Vec<Particle> = clump
        .iter()
        .map(|(x, m)| Particle::new(*x, NVec3::zeros(), *m))
        .collect();
    particles.push(Particle::new(NVec3::new(20.0, 20.0, 20.0), NVec3::zeros(), 1e-6));
    let sys = System3::new(particles);
    let tracer = sys.len() - 1;

    let direct = accels_of(&NewtonianGravity3 { eps2: 0.0 }, &sys)[tracer];
    let force = |use_quad| {
        let tree = BarnesHutTree3::build(&sys, &Engine::new(Criterion::Bh86, 1.0, use_quad, 0.0));
        tree.force_on_body(tracer, &sys, 0.0)
    };

    let err_mono = (force(false) - direct).norm();
    let err_quad = (force(true) - direct).norm();
    assert!(err_mono > 0.0);
    assert!(err_quad < err_mono, "quad {err_quad} !< mono {err_mono}");
}

#[test]
fn sw93_never_admits_more_than_bh86() {
    let sys = plummer_system(400, 12);
    let bh86 = BarnesHutTree3::build(&sys, &engine(Criterion::Bh86, 0.8, false));
    let sw93 = BarnesHutTree3::build(&sys, &engine(Criterion::Sw93, 0.8, false));
    assert_eq!(bh86.node_count(), sw93.node_count());

    for drift in [0.0, 0.05] {
        for p in &sys.particles {
            for idx in 0..sw93.node_count() {
                if sw93.admits(idx, &p.x, drift) {
                    assert!(bh86.admits(idx, &p.x, 0.0));
                }
            }
        }
    }
}

#[test]
fn containing_node_is_never_admitted() {
    let sys = plummer_system(300, 13);
    for criterion in [Criterion::Bh86, Criterion::NewCriterion, Criterion::Sw93] {
        // a huge theta would otherwise admit almost everything
        let tree = BarnesHutTree3::build(&sys, &engine(criterion, 100.0, false));
        for p in &sys.particles {
            for idx in 0..tree.node_count() {
                if tree.nodes[idx].contains(&p.x) {
                    assert!(!tree.admits(idx, &p.x, 0.0));
                }
            }
        }
    }
}

// ==================================================================================
// Integrator tests
// ==================================================================================

#[test]
fn leapfrog_conserves_momentum_and_mass() {
    let mut sys = plummer_system(100, 21);
    let eps2 = calculate_eps2(100, 0.3);
    let dt = calculate_timestep(10.0, 0.3);
    let forces = AccelSet3::new().with(NewtonianGravityBarnesHut3 {
        engine: Engine::new(Criterion::Exact, 1.0, false, eps2),
        dt,
    });

    let mut acc = vec![NVec3::zeros(); sys.len()];
    prime_accelerations(&sys, &forces, &mut acc, 0).unwrap();
    for step in 1..=100 {
        leapfrog_step(&mut sys, &forces, &mut acc, dt, step).unwrap();
    }

    assert_eq!(sys.len(), 100);
    assert_relative_eq!(sys.total_mass(), 10.0, max_relative = 1e-12);
    assert!(sys.momentum().norm() < 1e-9, "momentum = {:?}", sys.momentum());
    assert_relative_eq!(sys.t, 100.0 * dt, max_relative = 1e-12);
}

#[test]
fn leapfrog_conserves_energy() {
    let mut sys = plummer_system(64, 22);
    let eps2 = 0.05 * 0.05;
    let dt = calculate_timestep(10.0, 0.3);
    let forces = gravity_set(eps2);
    let none = GalaxyPotential::default();

    let e0 = Diagnostics::measure(&sys, &none, eps2).total_energy();
    let mut acc = vec![NVec3::zeros(); sys.len()];
    prime_accelerations(&sys, &forces, &mut acc, 0).unwrap();
    for step in 1..=200 {
        leapfrog_step(&mut sys, &forces, &mut acc, dt, step).unwrap();
    }
    let e1 = Diagnostics::measure(&sys, &none, eps2).total_energy();

    assert!(((e1 - e0) / e0).abs() < 1e-3, "E0 = {e0}, E1 = {e1}");
}

#[test]
fn leapfrog_is_time_reversible() {
    let start = plummer_system(50, 23);
    let mut sys = start.clone();
    let dt = calculate_timestep(10.0, 0.3);
    let forces = gravity_set(calculate_eps2(50, 0.3));

    let mut acc = vec![NVec3::zeros(); sys.len()];
    prime_accelerations(&sys, &forces, &mut acc, 0).unwrap();
    for step in 1..=20 {
        leapfrog_step(&mut sys, &forces, &mut acc, dt, step).unwrap();
    }
    for p in sys.particles.iter_mut() {
        p.v = -p.v;
    }
    for step in 21..=40 {
        leapfrog_step(&mut sys, &forces, &mut acc, dt, step).unwrap();
    }

    for (p, q) in sys.particles.iter().zip(&start.particles) {
        assert_relative_eq!(p.x, q.x, epsilon = 1e-9);
        assert_relative_eq!(-p.v, q.v, epsilon = 1e-8);
    }
}

#[test]
fn non_finite_position_is_reported() {
    let mut sys = plummer_system(4, 24);
    let forces = gravity_set(0.01);
    let mut acc = vec![NVec3::zeros(); sys.len()];
    prime_accelerations(&sys, &forces, &mut acc, 0).unwrap();

    sys.particles[2].v = NVec3::new(f64::NAN, 0.0, 0.0);
    let err = leapfrog_step(&mut sys, &forces, &mut acc, 0.01, 7).unwrap_err();
    match err {
        SimError::NumericInstability { step, particle, quantity } => {
            assert_eq!(step, 7);
            assert_eq!(particle, 2);
            assert_eq!(quantity, "position");
        }
        other => panic!("unexpected error {other}"),
    }
}

// ==================================================================================
// Orbit tests
// ==================================================================================

#[test]
fn step_plan_lands_on_duration() {
    let (n, h) = Parameters::step_plan(3.945, 0.001);
    assert_eq!(n, 3945);
    assert_relative_eq!(n as f64 * h, 3.945, max_relative = 1e-12);
    assert!(h <= 0.001 * (1.0 + 1e-12));

    let (n, h) = Parameters::step_plan(1.0, 0.3);
    assert_eq!(n, 4);
    assert_relative_eq!(h, 0.25);

    assert_eq!(Parameters::step_plan(0.0, 0.1).0, 0);
}

#[test]
fn reverse_then_forward_orbit_returns() {
    let pot = milky_way();
    let present = OrbitPoint {
        x: NVec3::new(12.0, -4.5, 20.0),
        v: NVec3::new(-156.0, 79.0, 107.0),
    };
    let past = reverse_orbit(&pot, present, 4.0, 0.001);
    assert!((past.x - present.x).norm() > 1.0);

    let back = forward_orbit(&pot, past, 4.0, 0.001);
    assert_relative_eq!(back.x, present.x, epsilon = 1e-8);
    assert_relative_eq!(back.v, present.v, epsilon = 1e-7);
}

#[test]
fn zero_length_orbit_is_identity() {
    let present = OrbitPoint {
        x: NVec3::new(1.0, 2.0, 3.0),
        v: NVec3::new(4.0, 5.0, 6.0),
    };
    assert_eq!(reverse_orbit(&milky_way(), present, 0.0, 0.01), present);
}

#[test]
fn circular_orbit_keeps_radius() {
    let (mass, scale) = (1.52954402e5, 0.7);
    let pot = GalaxyPotential {
        spherical: Some(Spherical::Hernquist { mass, scale }),
        ..Default::default()
    };
    let r = 10.0;
    let vc = (mass * r).sqrt() / (r + scale);
    let start = OrbitPoint {
        x: NVec3::new(r, 0.0, 0.0),
        v: NVec3::new(0.0, vc, 0.0),
    };
    let period = 2.0 * std::f64::consts::PI * r / vc;
    let end = forward_orbit(&pot, start, period, period / 2000.0);

    assert_relative_eq!(end.x.norm(), r, max_relative = 1e-4);
    assert_relative_eq!(end.x, start.x, epsilon = 1e-2 * r);
}

// ==================================================================================
// Configuration tests
// ==================================================================================

#[test]
fn fixture_parses() {
    let cfg = SimulationConfig::parse(&fixture_text()).unwrap();

    assert_eq!(cfg.engine.criterion, Criterion::Sw93);
    assert!(cfg.engine.use_quad);
    assert_relative_eq!(cfg.engine.theta, 1.0);
    assert_relative_eq!(cfg.engine.eps2, calculate_eps2(100, 0.3));
    assert_eq!(cfg.parameters.seed, 0);
    assert_eq!(cfg.parameters.time_dwarf, 3.945);
    assert_eq!(cfg.parameters.time_orbit, 4.0);
    assert_relative_eq!(cfg.parameters.timestep, calculate_timestep(10.0, 0.3));
    assert_eq!(cfg.parameters.orbit_timestep, cfg.parameters.timestep);
    assert_eq!(cfg.parameters.freq_out, None);
    assert!(cfg.output_cartesian);

    assert_eq!(cfg.dwarf.nbody(), 100);
    assert_eq!(
        cfg.potential.halo,
        Some(Halo::Logarithmic {
            vhalo: 73.0,
            scale_length: 12.0,
            flatten_z: 1.1
        })
    );
    assert_eq!(cfg.potential, milky_way());

    let expected = lbr_to_cartesian(28.6_f64.to_radians(), 218.0_f64.to_radians(), 53.5, 8.0);
    assert_relative_eq!(cfg.initial.position, expected, max_relative = 1e-12);
    assert_eq!(cfg.initial.velocity, NVec3::new(-156.0, 79.0, 107.0));
}

#[test]
fn fixture_loads_from_disk() {
    let cfg = SimulationConfig::load(&fixture_path("test_set1.js")).unwrap();
    assert_eq!(cfg.headline, "disk=miyamoto-nagai_halo=logarithmic_quad=true_criterion=sw93");
}

#[test]
fn missing_file_is_io_error() {
    let err = SimulationConfig::load(Path::new("/nonexistent/dwarfsim.js")).unwrap_err();
    assert!(matches!(err, SimError::Io(_)));
    assert!(!err.is_configuration());
}

fn assert_range_error(text: &str) {
    match SimulationConfig::parse(text) {
        Err(SimError::Configuration(_)) => {}
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

fn assert_malformed(text: &str) {
    match SimulationConfig::parse(text) {
        Err(e @ SimError::Malformed(_)) => assert!(e.is_configuration()),
        other => panic!("expected a malformed file, got {other:?}"),
    }
}

#[test]
fn rejects_out_of_range_values() {
    let text = fixture_text();
    assert_range_error(&text.replace("\"mass\" : 10,", "\"mass\" : -10,"));
    assert_range_error(&text.replace("\"nbody\" : 100,", "\"nbody\" : 0,"));
    assert_range_error(&text.replace("\"accuracy-parameter\" : 1.0,", "\"accuracy-parameter\" : 0.0,"));
    assert_range_error(&text.replace("\"scale-radius\" : 0.3,", "\"scale-radius\" : -0.3,"));
    assert_range_error(&text.replace("\"time-dwarf\" : 3.945", "\"time-dwarf\" : -1"));
    assert_range_error(&text.replace("\"z-flattening\" : 1.1,", "\"z-flattening\" : 0,"));
    assert_range_error(&text.replace("\"seed\" : 0,", "\"seed\" : 0, \"freq-out\" : 0,"));
    assert_range_error(&text.replace("[ 28.6, 218.0, 53.5 ]", "[ 28.6, 218.0, -53.5 ]"));
}

#[test]
fn rejects_malformed_files() {
    let text = fixture_text();
    assert_malformed(&text.replace("\"criterion\" : \"sw93\",", "\"criterion\" : \"sw94\","));
    assert_malformed(&text.replace("\"seed\" : 0,", ""));
    assert_malformed(&text.replace("\"seed\" : 0,", "\"seed\" : 0, \"frobnicate\" : 1,"));
    assert_malformed(&text.replace("\"logarithmic\"", "\"isothermal\""));
    assert_malformed(&text.replace("\"nbody\" : 100,", "\"nbody\" : 100.5,"));
    assert_malformed(&text.replace("\"nbody\" : 100,", "\"nbody\" : -5,"));
    assert_malformed(&text.replace("\"seed\" : 0,", "\"seed\" : 3.9,"));
    assert_malformed(&text.replace("\"seed\" : 0,", "\"seed\" : -1,"));
    assert_malformed(&text.replace("\"seed\" : 0,", "\"seed\" : 0, \"freq-out\" : 2.5,"));
    assert_malformed("{ \"nbody-parameters-file\": ");
}

#[test]
fn rejects_second_model_in_a_category() {
    let text = fixture_text();
    assert_malformed(&text.replace(
        "\"disk\" : {",
        "\"disk\" : { \"exponential\" : { \"mass\" : 1, \"scale-length\" : 2 },",
    ));
    assert_malformed(&text.replace(
        "\"halo\" : {",
        "\"halo\" : { \"nfw\" : { \"vhalo\" : 155, \"scale-length\" : 22.25 },",
    ));
    assert_malformed(&text.replace(
        "\"sphere\" : {",
        "\"sphere\" : { \"mass\" : 1, \"r0-scale\" : 1 }, \"sphere2\" : {",
    ));
}

#[test]
fn whole_number_fields_parse() {
    let text = fixture_text()
        .replace("\"seed\" : 0,", "\"seed\" : 7, \"freq-out\" : 5,")
        .replace("\"nbody\" : 100,", "\"nbody\" : 64,");
    let cfg = SimulationConfig::parse(&text).unwrap();
    assert_eq!(cfg.parameters.seed, 7);
    assert_eq!(cfg.parameters.freq_out, Some(5));
    assert_eq!(cfg.dwarf.nbody(), 64);
}

#[test]
fn simple_is_bh86() {
    let cfg = SimulationConfig::parse(&fixture_text().replace("\"sw93\",", "\"simple\",")).unwrap();
    assert_eq!(cfg.engine.criterion, Criterion::Bh86);
}

#[test]
fn optional_overrides_apply() {
    let text = fixture_text().replace(
        "\"time-dwarf\" : 3.945",
        "\"time-dwarf\" : 3.945, \"timestep\" : 0.002, \"orbit-timestep\" : 0.01, \"eps\" : 0.05",
    );
    let cfg = SimulationConfig::parse(&text).unwrap();
    assert_eq!(cfg.parameters.timestep, 0.002);
    assert_eq!(cfg.parameters.orbit_timestep, 0.01);
    assert_relative_eq!(cfg.engine.eps2, 0.0025);
}

#[test]
fn potential_may_be_absent() {
    let text = fixture_text();
    let start = text.find("\"potential\"").unwrap();
    let end = text.find("\"dwarf-model\"").unwrap();
    let stripped = format!("{}{}", &text[..start], &text[end..]);

    let cfg = SimulationConfig::parse(&stripped).unwrap();
    assert!(cfg.potential.is_empty());
}

// ==================================================================================
// Scenario tests
// ==================================================================================

#[test]
fn fixture_runs_to_completion() {
    let cfg = SimulationConfig::parse(&fixture_text()).unwrap();
    let mut scenario = Scenario::build_scenario(&cfg).unwrap();
    assert_eq!(scenario.system.len(), 100);
    assert_eq!(scenario.forces.len(), 2);

    let mut seen = Vec::new();
    let summary = scenario
        .run(|sys, step| {
            assert_eq!(sys.len(), 100);
            seen.push(step);
            Ok(())
        })
        .unwrap();

    assert_eq!(summary.last.t, 3.945);
    assert_eq!(scenario.system.t, 3.945);
    assert_eq!(seen, vec![0, summary.steps]);
    assert_eq!(summary.snapshots, 2);
    assert!(summary.steps as f64 * summary.dt <= 3.945 * (1.0 + 1e-12));
    assert!(summary.dt <= cfg.parameters.timestep);
    assert_relative_eq!(summary.last.total_mass, 10.0, max_relative = 1e-12);
    assert!(scenario.system.particles.iter().all(|p| p.x.iter().all(|c| c.is_finite())));
}

#[test]
fn repeated_runs_are_identical() {
    let cfg = SimulationConfig::parse(
        &fixture_text().replace("\"time-dwarf\" : 3.945", "\"time-dwarf\" : 0.5"),
    )
    .unwrap();

    let run = || {
        let mut scenario = Scenario::build_scenario(&cfg).unwrap();
        scenario.run(|_, _| Ok(())).unwrap();
        scenario.system
    };
    assert_eq!(run(), run());
}

#[test]
fn snapshots_follow_freq_out() {
    let cfg = SimulationConfig::load(&fixture_path("nfw_galactocentric.js")).unwrap();
    let k = cfg.parameters.freq_out.unwrap();
    let mut scenario = Scenario::build_scenario(&cfg).unwrap();

    // no orbit phase: the dwarf starts at the configured point
    assert_relative_eq!(scenario.system.center_of_mass(), cfg.initial.position, max_relative = 1e-12);
    assert_relative_eq!(scenario.system.center_of_momentum(), cfg.initial.velocity, max_relative = 1e-12);

    let mut seen = Vec::new();
    let summary = scenario
        .run(|_, step| {
            seen.push(step);
            Ok(())
        })
        .unwrap();

    let mut expected: Vec<usize> = (0..=summary.steps).step_by(k).collect();
    if summary.steps % k != 0 {
        expected.push(summary.steps);
    }
    assert_eq!(seen, expected);
    assert_eq!(summary.snapshots, expected.len());
    assert_eq!(summary.last.t, 1.0);
}

#[test]
fn observer_error_stops_run() {
    let cfg = SimulationConfig::parse(&fixture_text()).unwrap();
    let mut scenario = Scenario::build_scenario(&cfg).unwrap();
    let err = scenario
        .run(|_, _| Err(SimError::Configuration("stop".into())))
        .unwrap_err();
    assert!(matches!(err, SimError::Configuration(_)));
    assert_eq!(scenario.system.t, 0.0);
}

#[test]
fn orbit_phase_moves_the_start() {
    let cfg = SimulationConfig::parse(&fixture_text()).unwrap();
    let scenario = Scenario::build_scenario(&cfg).unwrap();
    let expected = reverse_orbit(
        &cfg.potential,
        OrbitPoint {
            x: cfg.initial.position,
            v: cfg.initial.velocity,
        },
        4.0,
        cfg.parameters.orbit_timestep,
    );
    assert_eq!(scenario.start, expected);
    assert_relative_eq!(scenario.system.center_of_mass(), expected.x, max_relative = 1e-12);
}

// ==================================================================================
// Output tests
// ==================================================================================

#[test]
fn snapshot_has_header_and_one_row_per_particle() {
    let sys = plummer_system(20, 30);
    let mut buf = Vec::new();
    write_snapshot(&mut buf, &sys, SnapshotFormat::Cartesian).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines.len(), 4 + 20);
    assert!(lines[0].starts_with("# t = "));
    assert!(lines[3].starts_with("# id x y z"));

    let row: Vec<f64> = lines[4].split_whitespace().skip(1).map(|s| s.parse().unwrap()).collect();
    assert_eq!(row.len(), 7);
    assert_relative_eq!(row[0], sys.particles[0].x.x, max_relative = 1e-11);
    assert_relative_eq!(row[6], 0.5, max_relative = 1e-11);
}

#[test]
fn lbr_snapshot_reports_heliocentric_distance() {
    let sys = System3::new(vec![Particle::new(NVec3::new(-8.0, 3.0, 4.0), NVec3::zeros(), 1.0)]);
    let mut buf = Vec::new();
    write_snapshot(&mut buf, &sys, SnapshotFormat::new(false, 8.0)).unwrap();
    let text = String::from_utf8(buf).unwrap();

    let row: Vec<f64> = text.lines().nth(4).unwrap().split_whitespace().skip(1).map(|s| s.parse().unwrap()).collect();
    assert_relative_eq!(row[0], 90.0, max_relative = 1e-11);
    assert_relative_eq!(row[2], 5.0, max_relative = 1e-11);
}

#[test]
fn periodic_snapshot_paths() {
    assert_eq!(step_path(Path::new("out/run.txt"), 40), PathBuf::from("out/run.40.txt"));
    assert_eq!(step_path(Path::new("run"), 3), PathBuf::from("run.3"));
}
