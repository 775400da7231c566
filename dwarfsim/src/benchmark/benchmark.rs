use std::time::Instant;

use crate::simulation::dwarf::DwarfModel;
use crate::simulation::engine::{Criterion, Engine};
use crate::simulation::forces::{AccelSet3, Acceleration3, NewtonianGravity3, NewtonianGravityBarnesHut3};
use crate::simulation::integrator::{leapfrog_step, prime_accelerations};
use crate::simulation::params::{calculate_eps2, calculate_timestep};
use crate::simulation::states::{NVec3, System3};
use crate::error::Result;

const MASS: f64 = 10.0;
const SCALE_RADIUS: f64 = 0.3;

/// Helper to build a Plummer sphere of size `n` at the origin
fn make_system3(n: usize) -> Result<System3> {
    let model = DwarfModel::Plummer {
        mass: MASS,
        nbody: n,
        scale_radius: SCALE_RADIUS,
    };
    Ok(System3::new(model.generate(42, NVec3::zeros(), NVec3::zeros())?))
}

fn make_engine(n: usize, criterion: Criterion) -> Engine {
    Engine::new(criterion, 1.0, true, calculate_eps2(n, SCALE_RADIUS))
}

/// Time one force evaluation, direct sum vs tree, for a range of n.
/// Also reports the tree's RMS relative error against the direct sum.
pub fn bench_gravity() -> Result<()> {
    // Different system sizes to test
    let ns = [200, 400, 800, 1600, 3200, 6400];

    for n in ns {
        let sys = make_system3(n)?;
        let engine = make_engine(n, Criterion::Sw93);
        let dt = calculate_timestep(MASS, SCALE_RADIUS);

        let mut out_direct = vec![NVec3::zeros(); n];
        let mut out_bh = vec![NVec3::zeros(); n];

        // Set up gravity models
        let direct = NewtonianGravity3 { eps2: engine.eps2 };
        let bh = NewtonianGravityBarnesHut3 { engine, dt };

        // Warm up
        direct.acceleration(0.0, &sys, &mut out_direct);
        bh.acceleration(0.0, &sys, &mut out_bh);

        // Time direct
        out_direct.fill(NVec3::zeros());
        let t0 = Instant::now();
        direct.acceleration(0.0, &sys, &mut out_direct);
        let dt_direct = t0.elapsed().as_secs_f64();

        // Time barnes-hut
        out_bh.fill(NVec3::zeros());
        let t1 = Instant::now();
        bh.acceleration(0.0, &sys, &mut out_bh);
        let dt_bh = t1.elapsed().as_secs_f64();

        let rms = (out_direct
            .iter()
            .zip(&out_bh)
            .map(|(a, b)| (a - b).norm_squared() / a.norm_squared().max(f64::MIN_POSITIVE))
            .sum::<f64>()
            / n as f64)
            .sqrt();

        println!("N = {n:5}, direct = {dt_direct:8.6} s, BH = {dt_bh:8.6} s, rms rel err = {rms:.3e}");
    }
    Ok(())
}

/// Time full leapfrog steps for each opening criterion
pub fn bench_leapfrog() -> Result<()> {
    let ns = [200, 400, 800, 1600, 3200, 6400, 12800];
    let steps = 2; // number of integrator steps per model (tune as needed)
    let dt = calculate_timestep(MASS, SCALE_RADIUS);

    println!("N,exact_ms,bh86_ms,new_criterion_ms,sw93_ms");

    for n in ns {
        let sys_template = make_system3(n)?;
        let mut row = vec![n.to_string()];

        for criterion in [Criterion::Exact, Criterion::Bh86, Criterion::NewCriterion, Criterion::Sw93] {
            let mut sys = sys_template.clone();
            let forces = AccelSet3::new().with(NewtonianGravityBarnesHut3 {
                engine: make_engine(n, criterion),
                dt,
            });
            let mut accels = vec![NVec3::zeros(); n];
            prime_accelerations(&sys, &forces, &mut accels, 0)?;

            let t0 = Instant::now();
            for step in 1..=steps {
                leapfrog_step(&mut sys, &forces, &mut accels, dt, step)?;
            }
            let ms = t0.elapsed().as_secs_f64() * 1000.0 / steps as f64;
            row.push(format!("{ms:.6}"));
        }

        println!("{}", row.join(","));
    }
    Ok(())
}
