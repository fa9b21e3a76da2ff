use std::time::Instant;

use crate::error::SimError;
use crate::simulation::forces::{BarnesHutGravity, DirectGravity, ForceProvider};
use crate::simulation::integrator::{Integrator, Scheme};
use crate::simulation::params::Parameters;
use crate::simulation::states::Body;
use crate::simulation::vector::NVec2;

/// Wall-clock of one force evaluation, direct summation vs Barnes–Hut
pub fn bench_gravity() -> Result<(), SimError> {
    // Different system sizes to test
    let ns = [200, 400, 800, 1600, 3200, 6400, 12800];
    let params = make_params();

    let direct = DirectGravity::new(params.g, params.eps);
    let bh = BarnesHutGravity::new(params.g, params.eps).with_theta(0.7);

    println!("{:>6} {:>12} {:>12} {:>8}", "N", "direct [s]", "BH [s]", "speedup");
    for n in ns {
        let mut bodies = make_bodies(n);

        // Warm up
        direct.compute_forces(&mut bodies)?;
        bh.compute_forces(&mut bodies)?;

        let t0 = Instant::now();
        direct.compute_forces(&mut bodies)?;
        let dt_direct = t0.elapsed().as_secs_f64();

        let t1 = Instant::now();
        bh.compute_forces(&mut bodies)?;
        let dt_bh = t1.elapsed().as_secs_f64();

        println!("{n:6} {dt_direct:12.6} {dt_bh:12.6} {:8.2}", dt_direct / dt_bh);
    }
    Ok(())
}

/// Cost per step of every scheme on a Barnes–Hut system
pub fn bench_integrators() -> Result<(), SimError> {
    let ns = [500, 2000, 8000];
    let steps = 3; // integrator steps timed per scheme
    let schemes = [Scheme::Rk4, Scheme::AdaptiveRk4, Scheme::Leapfrog, Scheme::Verlet];

    let params = make_params();
    let forces = BarnesHutGravity::new(params.g, params.eps).with_theta(0.7);
    // Loose enough that the adaptive scheme rarely retries
    let integrator = Integrator::new(1.0e-3, params.max_retries, params.min_dt);

    println!("{:>6} {:>14} {:>14}", "N", "scheme", "per step [s]");
    for n in ns {
        for scheme in schemes {
            let mut bodies = make_bodies(n);
            let mut cache = None;

            // Warm-up
            integrator.step(scheme, &mut bodies, params.h0, &forces, &mut cache)?;

            let t0 = Instant::now();
            for _ in 0..steps {
                integrator.step(scheme, &mut bodies, params.h0, &forces, &mut cache)?;
            }
            let per_step = t0.elapsed().as_secs_f64() / steps as f64;

            println!("{n:6} {:>14} {per_step:14.6}", format!("{scheme:?}"));
        }
    }
    Ok(())
}

/// Deterministic spread of unit masses, no rand needed
fn make_bodies(n: usize) -> Vec<Body> {
    (0..n)
        .map(|i| {
            let i_f = i as f64;
            let x = NVec2::new(
                (i_f * 0.37).sin() * 500.0 + (i_f * 1.7).cos() * 100.0,
                (i_f * 0.13).cos() * 500.0 + (i_f * 2.3).sin() * 100.0,
            );
            Body::new(x, NVec2::zeros(), 1.0).with_radius(0.01)
        })
        .collect()
}

fn make_params() -> Parameters {
    Parameters {
        h0: 0.001,
        eps: 1.0,
        g: 0.1,
        ..Parameters::default()
    }
}
