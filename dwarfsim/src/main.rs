use dwarfsim::{Scenario, SimulationConfig, SnapshotFormat};
use dwarfsim::{bench_gravity, bench_leapfrog};
use dwarfsim::output::snapshot::{save_snapshot, step_path};

use anyhow::{Context, Result};
use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Barnes-Hut simulation of a dwarf galaxy disrupted by a galactic potential")]
struct Args {
    /// Parameter file, looked up as given and then under `scenarios/`
    #[arg(short, default_value = "test_set1.js")]
    file_name: String,

    /// Write snapshots here; nothing is written when absent
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the validated run context before starting
    #[arg(long)]
    print_context: bool,

    /// Run the gravity and leapfrog benchmarks instead of a scenario
    #[arg(long)]
    bench: bool,

    /// Worker threads for force evaluation, 0 uses every core
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

// resolve here to keep main clean
fn resolve_scenario_path(file_name: &str) -> PathBuf {
    let direct = PathBuf::from(file_name);
    if direct.exists() {
        return direct;
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .context("failed to configure the worker pool")?;

    if args.bench {
        bench_gravity()?;
        bench_leapfrog()?;
        return Ok(());
    }

    let config_path = resolve_scenario_path(&args.file_name);
    let cfg = SimulationConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    log::info!("loaded {}: {}", config_path.display(), cfg.headline);

    if args.print_context {
        println!("{cfg}");
    }

    let mut scenario = Scenario::build_scenario(&cfg)?;
    let (final_step, _) = scenario.parameters.dwarf_steps();
    let format = SnapshotFormat::new(cfg.output_cartesian, cfg.sun_gc_dist);

    let summary = scenario.run(|sys, step| {
        if let Some(base) = &args.output {
            let path = if step == final_step { base.clone() } else { step_path(base, step) };
            save_snapshot(&path, sys, format)?;
            log::debug!("wrote {}", path.display());
        }
        Ok(())
    })?;

    log::info!(
        "done: {} steps of {}, {} snapshots, t = {}",
        summary.steps,
        summary.dt,
        summary.snapshots,
        summary.last.t
    );

    Ok(())
}
