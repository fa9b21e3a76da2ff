use quadgrav::{bench_gravity, bench_integrators};
use quadgrav::{Scenario, ScenarioConfig};

use anyhow::{Context, Result};
use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Planar Barnes–Hut n-body simulator")]
struct Args {
    /// Scenario file under `scenarios/`
    #[arg(short, default_value = "figure_eight.yaml")]
    file_name: String,

    /// Run the benchmarks instead of a scenario
    #[arg(long)]
    bench: bool,
}

// load here to keep main clean
fn load_scenario_from_yaml(file_name: &str) -> Result<ScenarioConfig> {
    let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name);
    let scenario_cfg = ScenarioConfig::from_path(&config_path)
        .with_context(|| format!("failed to load scenario {}", config_path.display()))?;
    Ok(scenario_cfg)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.bench {
        bench_gravity()?;
        bench_integrators()?;
        return Ok(());
    }

    let scenario_cfg = load_scenario_from_yaml(&args.file_name)?;
    let mut scenario = Scenario::build_scenario(scenario_cfg)?;
    let summary = scenario.run()?;

    println!("t            = {:.6}", summary.t);
    println!("steps        = {}", summary.steps);
    println!("bodies       = {} ({} merged)", summary.bodies, summary.merges);
    println!("energy       = {:.9e} -> {:.9e}", summary.initial_energy.total, summary.final_energy.total);
    println!("energy drift = {:.3e}", summary.max_energy_drift);
    println!("momentum     = ({:.3e}, {:.3e})", summary.momentum.x, summary.momentum.y);
    println!("ang. mom.    = {:.9e}", summary.angular_momentum);

    for (i, b) in scenario.system.bodies.iter().enumerate() {
        println!("body {i:3}: x = ({:12.6}, {:12.6}) v = ({:12.6}, {:12.6}) m = {}", b.x.x, b.x.y, b.v.x, b.v.y, b.m);
    }

    Ok(())
}
