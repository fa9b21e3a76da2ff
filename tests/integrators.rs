use std::cell::Cell;
use std::f64::consts::PI;

use approx::assert_relative_eq;

use quadgrav::simulation::diagnostics::{relative_drift, system_energy, total_angular_momentum};
use quadgrav::simulation::forces::{BarnesHutGravity, DirectGravity, ForceProvider};
use quadgrav::simulation::integrator::{Integrator, Scheme, DEFAULT_MIN_DT};
use quadgrav::simulation::states::Body;
use quadgrav::simulation::vector::NVec2;
use quadgrav::SimError;

/// Equal-mass circular binary with G = 1, separation 1
fn kepler_pair() -> Vec<Body> {
    let v = 0.5 * 2.0_f64.sqrt();
    vec![
        Body::new(NVec2::new(-0.5, 0.0), NVec2::new(0.0, -v), 1.0),
        Body::new(NVec2::new(0.5, 0.0), NVec2::new(0.0, v), 1.0),
    ]
}

fn kepler_period() -> f64 {
    2.0 * PI / 2.0_f64.sqrt()
}

/// Scaled Chenciner–Montgomery figure-eight: G = 5000, m = 50
fn figure_eight() -> Vec<Body> {
    vec![
        Body::new(NVec2::new(-97.000436, 24.308753), NVec2::new(23.310184, 21.618287), 50.0),
        Body::new(NVec2::new(97.000436, -24.308753), NVec2::new(23.310184, 21.618287), 50.0),
        Body::new(NVec2::new(0.0, 0.0), NVec2::new(-46.620369, -43.236573), 50.0),
    ]
}

/// Harmonic pull toward the origin with angular frequency 1000
fn stiff_spring(bodies: &mut [Body]) -> Result<(), SimError> {
    for b in bodies.iter_mut() {
        let pull = b.x * (-1.0e6 * b.m);
        b.f += pull;
    }
    Ok(())
}

/// Uniform push of (m, m) on every body that fails on its `n`th evaluation
fn failing_on_call(n: usize) -> impl Fn(&mut [Body]) -> Result<(), SimError> {
    let calls = Cell::new(0);
    move |bodies: &mut [Body]| {
        calls.set(calls.get() + 1);
        if calls.get() == n {
            return Err(SimError::InvalidParameter { name: "force evaluation", value: n as f64 });
        }
        for b in bodies.iter_mut() {
            b.f += NVec2::new(b.m, b.m);
        }
        Ok(())
    }
}

fn launched_body() -> Vec<Body> {
    vec![Body::new(NVec2::zeros(), NVec2::new(0.0, 1.0), 1.0)]
}

fn assert_at_launch(bodies: &[Body], label: &str) {
    assert_eq!(bodies[0].x, NVec2::zeros(), "{label} moved the body");
    assert_eq!(bodies[0].v, NVec2::new(0.0, 1.0), "{label} changed the velocity");
    assert_eq!(bodies[0].f, NVec2::zeros(), "{label} left a force behind");
    assert!(bodies[0].trail.is_empty(), "{label} recorded a trail point");
}

struct Conservation {
    energy_drift: f64,
    angular_momentum_drift: f64,
    position_error: f64,
}

/// Ten orbits at 200 steps per orbit
fn run_kepler(scheme: Scheme) -> Conservation {
    let mut bodies = kepler_pair();
    let start = bodies[0].x;
    let forces = BarnesHutGravity::new(1.0, 0.0);
    let integrator = Integrator::default();

    let e0 = system_energy(&bodies, 1.0, 0.0).total;
    let l0 = total_angular_momentum(&bodies);

    let dt = kepler_period() / 200.0;
    let mut cache = None;
    for _ in 0..2000 {
        integrator.step(scheme, &mut bodies, dt, &forces, &mut cache).unwrap();
    }

    Conservation {
        energy_drift: relative_drift(e0, system_energy(&bodies, 1.0, 0.0).total),
        angular_momentum_drift: relative_drift(l0, total_angular_momentum(&bodies)),
        position_error: (bodies[0].x - start).norm(),
    }
}

// ==================================================================================
// Fixed-step schemes
// ==================================================================================

#[test]
fn rk4_kepler_orbit_conserves_energy() {
    let c = run_kepler(Scheme::Rk4);
    assert!(c.energy_drift < 1e-3, "energy drift {:e}", c.energy_drift);
    assert!(c.angular_momentum_drift < 1e-3, "angular momentum drift {:e}", c.angular_momentum_drift);
    assert!(c.position_error < 0.05, "did not return to start: {:e}", c.position_error);
}

#[test]
fn verlet_kepler_orbit_conserves_energy() {
    let c = run_kepler(Scheme::Verlet);
    assert!(c.energy_drift < 1e-3, "energy drift {:e}", c.energy_drift);
    assert!(c.angular_momentum_drift < 1e-3, "angular momentum drift {:e}", c.angular_momentum_drift);
    assert!(c.position_error < 0.05, "did not return to start: {:e}", c.position_error);
}

#[test]
fn leapfrog_kepler_orbit_conserves_energy() {
    let c = run_kepler(Scheme::Leapfrog);
    assert!(c.energy_drift < 1e-3, "energy drift {:e}", c.energy_drift);
    assert!(c.angular_momentum_drift < 1e-3, "angular momentum drift {:e}", c.angular_momentum_drift);
    assert!(c.position_error < 0.05, "did not return to start: {:e}", c.position_error);
}

#[test]
fn figure_eight_stays_bounded() {
    let mut bodies = figure_eight();
    let forces = BarnesHutGravity::new(5000.0, 0.0).with_theta(0.5);
    let integrator = Integrator::default();

    // Ten periods of ~12.65
    for _ in 0..12_650 {
        integrator.rk4_step(&mut bodies, 0.01, &forces).unwrap();
        for b in &bodies {
            assert!(b.x.norm() < 200.0, "body escaped to {:?}", b.x);
        }
    }
}

#[test]
fn steps_run_post_step_hooks() {
    let integrator = Integrator::default();
    let forces = DirectGravity::new(1.0, 0.0);

    for scheme in [Scheme::Rk4, Scheme::AdaptiveRk4, Scheme::Leapfrog, Scheme::Verlet] {
        let mut bodies = kepler_pair();
        let mut cache = None;
        for _ in 0..3 {
            integrator.step(scheme, &mut bodies, 0.01, &forces, &mut cache).unwrap();
        }

        for b in &bodies {
            assert_eq!(b.f, NVec2::zeros(), "{scheme:?} left a force behind");
            assert_eq!(b.m, 1.0, "{scheme:?} changed a mass");
            assert_eq!(b.trail.len(), 3, "{scheme:?} trail");
            assert_eq!(b.trail.last(), Some(&b.x));
            assert_relative_eq!(b.kinetic, b.kinetic_energy());
            assert!(b.glow > 0.0 && b.glow < 1.0);
        }
    }
}

#[test]
fn empty_system_is_a_no_op() {
    let integrator = Integrator::default();
    let forces = BarnesHutGravity::default();

    for scheme in [Scheme::Rk4, Scheme::AdaptiveRk4, Scheme::Leapfrog, Scheme::Verlet] {
        let mut bodies: Vec<Body> = Vec::new();
        let report = integrator.step(scheme, &mut bodies, 0.1, &forces, &mut None).unwrap();
        assert_eq!(report.used, 0.1);
    }
}

#[test]
fn trail_is_bounded() {
    let integrator = Integrator::default();
    let forces = DirectGravity::new(1.0, 0.0);
    let mut bodies: Vec<Body> = kepler_pair().into_iter().map(|b| b.with_trail_length(5)).collect();

    for _ in 0..20 {
        integrator.leapfrog_step(&mut bodies, 0.01, &forces).unwrap();
    }
    assert_eq!(bodies[0].trail.len(), 5);
}

#[test]
fn rk4_rolls_back_when_a_stage_fails() {
    let integrator = Integrator::default();
    let forces = failing_on_call(3);
    let mut bodies = launched_body();

    let result = integrator.rk4_step(&mut bodies, 1.0, &forces);
    assert!(matches!(result, Err(SimError::InvalidParameter { .. })));
    assert_at_launch(&bodies, "rk4");

    // Constant force: a retried step lands on the exact parabola
    integrator.rk4_step(&mut bodies, 1.0, &forces).unwrap();
    assert_relative_eq!(bodies[0].x.x, 0.5, epsilon = 1e-12);
    assert_relative_eq!(bodies[0].x.y, 1.5, epsilon = 1e-12);
    assert_relative_eq!(bodies[0].v.x, 1.0, epsilon = 1e-12);
    assert_relative_eq!(bodies[0].v.y, 2.0, epsilon = 1e-12);
}

#[test]
fn leapfrog_rolls_back_when_second_kick_fails() {
    let integrator = Integrator::default();
    let mut bodies = launched_body();

    let result = integrator.leapfrog_step(&mut bodies, 1.0, &failing_on_call(2));
    assert!(matches!(result, Err(SimError::InvalidParameter { .. })));
    assert_at_launch(&bodies, "leapfrog");
}

#[test]
fn verlet_rolls_back_when_force_evaluation_fails() {
    let integrator = Integrator::default();

    // Without a cache the second evaluation happens after the drift
    let mut bodies = launched_body();
    let result = integrator.velocity_verlet_step(&mut bodies, 1.0, &failing_on_call(2), None);
    assert!(matches!(result, Err(SimError::InvalidParameter { .. })));
    assert_at_launch(&bodies, "verlet");

    // With a cache the only evaluation happens after the drift
    let cache = vec![NVec2::new(1.0, 1.0)];
    let result = integrator.velocity_verlet_step(&mut bodies, 1.0, &failing_on_call(1), Some(cache.as_slice()));
    assert!(result.is_err());
    assert_at_launch(&bodies, "cached verlet");

    // Through the dispatcher the cache is left as it was
    let mut cache = Some(cache);
    let result = integrator.step(Scheme::Verlet, &mut bodies, 1.0, &failing_on_call(1), &mut cache);
    assert!(result.is_err());
    assert_eq!(cache, Some(vec![NVec2::new(1.0, 1.0)]));
    assert_at_launch(&bodies, "verlet dispatch");
}

// ==================================================================================
// Velocity-Verlet acceleration cache
// ==================================================================================

#[test]
fn verlet_cache_matches_fresh_evaluation() {
    let integrator = Integrator::default();
    let forces = DirectGravity::new(1.0, 0.0);

    let mut cached_run = kepler_pair();
    let mut fresh_run = kepler_pair();
    let mut cache: Option<Vec<NVec2>> = None;

    for _ in 0..50 {
        let a = integrator
            .velocity_verlet_step(&mut cached_run, 0.01, &forces, cache.as_deref())
            .unwrap();
        cache = Some(a);
        integrator.velocity_verlet_step(&mut fresh_run, 0.01, &forces, None).unwrap();
    }

    for (c, f) in cached_run.iter().zip(&fresh_run) {
        assert_relative_eq!(c.x.x, f.x.x, epsilon = 1e-12);
        assert_relative_eq!(c.x.y, f.x.y, epsilon = 1e-12);
        assert_relative_eq!(c.v.x, f.v.x, epsilon = 1e-12);
        assert_relative_eq!(c.v.y, f.v.y, epsilon = 1e-12);
    }
}

#[test]
fn verlet_ignores_cache_of_wrong_length() {
    let integrator = Integrator::default();
    let forces = DirectGravity::new(1.0, 0.0);

    let mut with_stale = kepler_pair();
    let mut without = kepler_pair();
    let stale = vec![NVec2::new(1.0e3, 1.0e3)];

    integrator.velocity_verlet_step(&mut with_stale, 0.01, &forces, Some(&stale)).unwrap();
    integrator.velocity_verlet_step(&mut without, 0.01, &forces, None).unwrap();

    assert_eq!(with_stale[0].x, without[0].x);
    assert_eq!(with_stale[1].v, without[1].v);
}

// ==================================================================================
// Adaptive RK4
// ==================================================================================

#[test]
fn adaptive_step_accepts_and_suggests_next() {
    let mut bodies = kepler_pair();
    let forces = DirectGravity::new(1.0, 0.0);
    let integrator = Integrator::new(1e-8, 32, 1e-12);

    let report = integrator.adaptive_rk4_step(&mut bodies, 0.01, &forces).unwrap();

    assert_eq!(report.used, 0.01);
    assert_eq!(report.attempts, 1);
    assert!(report.error.unwrap() <= 1e-8);
    assert!(report.next > report.used && report.next <= 0.02, "next = {}", report.next);
}

#[test]
fn adaptive_step_shrinks_until_accurate() {
    let mut bodies = kepler_pair();
    let forces = DirectGravity::new(1.0, 0.0);
    let integrator = Integrator::new(1e-10, 32, 1e-12);

    let report = integrator.adaptive_rk4_step(&mut bodies, 0.5, &forces).unwrap();

    assert!(report.attempts > 1);
    assert!(report.used < 0.5);
    assert!(report.error.unwrap() <= 1e-10);
    assert!(report.next <= 1.0);
}

#[test]
fn adaptive_orbit_conserves_energy() {
    let mut bodies = kepler_pair();
    let forces = DirectGravity::new(1.0, 0.0);
    let integrator = Integrator::new(1e-9, 32, 1e-12);
    let e0 = system_energy(&bodies, 1.0, 0.0).total;

    let period = kepler_period();
    let mut t = 0.0;
    let mut dt = period / 50.0;
    while t < period {
        let report = integrator.adaptive_rk4_step(&mut bodies, dt.min(period - t), &forces).unwrap();
        t += report.used;
        dt = report.next;
    }

    assert_relative_eq!(t, period, epsilon = 1e-12);
    let drift = relative_drift(e0, system_energy(&bodies, 1.0, 0.0).total);
    assert!(drift < 1e-4, "energy drift {drift:e}");
}

#[test]
fn adaptive_failure_at_timestep_floor_leaves_bodies_untouched() {
    let mut bodies = vec![Body::new(NVec2::new(1.0, 0.0), NVec2::new(0.0, 1.0), 1.0)];
    let before = bodies.clone();
    let integrator = Integrator::new(1e-10, 32, 1e-3);

    match integrator.adaptive_rk4_step(&mut bodies, 0.01, &stiff_spring) {
        Err(SimError::ConvergenceFailure { attempts, dt, error, tolerance }) => {
            assert_eq!(attempts, 2);
            assert_eq!(dt, 1e-3);
            assert!(error > tolerance);
        }
        other => panic!("expected ConvergenceFailure, got {other:?}"),
    }

    assert_eq!(bodies[0].x, before[0].x);
    assert_eq!(bodies[0].v, before[0].v);
    assert_eq!(bodies[0].f, NVec2::zeros());
    assert!(bodies[0].trail.is_empty());
}

#[test]
fn adaptive_failure_after_retry_cap() {
    let mut bodies = vec![Body::new(NVec2::new(1.0, 0.0), NVec2::zeros(), 1.0)];
    let integrator = Integrator::new(1e-10, 0, 1e-15);

    let result = integrator.adaptive_rk4_step(&mut bodies, 0.01, &stiff_spring);
    assert!(matches!(result, Err(SimError::ConvergenceFailure { attempts: 1, .. })));
    assert_eq!(bodies[0].x, NVec2::new(1.0, 0.0));
}

#[test]
fn adaptive_rejects_non_finite_state() {
    // One body out of two goes NaN; the other moves normally
    let poisoned = |bodies: &mut [Body]| -> Result<(), SimError> {
        bodies[0].f += NVec2::new(f64::NAN, 0.0);
        Ok(())
    };
    let mut bodies = vec![
        Body::new(NVec2::zeros(), NVec2::new(1.0, 0.0), 1.0),
        Body::new(NVec2::new(1.0, 0.0), NVec2::new(0.0, 1.0), 1.0),
    ];
    let before = bodies.clone();

    match Integrator::default().adaptive_rk4_step(&mut bodies, 0.01, &poisoned) {
        Err(SimError::ConvergenceFailure { attempts, dt, error, .. }) => {
            assert_eq!(attempts, 2);
            assert_eq!(dt, DEFAULT_MIN_DT);
            assert!(error.is_nan());
        }
        other => panic!("expected ConvergenceFailure, got {other:?}"),
    }

    for (b, b0) in bodies.iter().zip(&before) {
        assert_eq!(b.x, b0.x);
        assert_eq!(b.v, b0.v);
        assert_eq!(b.f, NVec2::zeros());
    }
}

#[test]
fn closures_drive_integrators() {
    // Uniform field: exact parabola, which RK4 reproduces to rounding
    let gravity = |bodies: &mut [Body]| -> Result<(), SimError> {
        for b in bodies.iter_mut() {
            b.f += NVec2::new(0.0, -9.81 * b.m);
        }
        Ok(())
    };
    let mut bodies = vec![Body::new(NVec2::zeros(), NVec2::new(1.0, 10.0), 2.0)];
    let integrator = Integrator::default();
    for _ in 0..100 {
        integrator.rk4_step(&mut bodies, 0.01, &gravity).unwrap();
    }

    assert_relative_eq!(bodies[0].x.x, 1.0, max_relative = 1e-12);
    assert_relative_eq!(bodies[0].x.y, 10.0 - 0.5 * 9.81, max_relative = 1e-12);
    assert_relative_eq!(bodies[0].v.y, 10.0 - 9.81, max_relative = 1e-12);

    // Same provider through the trait object
    let provider: &dyn ForceProvider = &gravity;
    provider.compute_forces(&mut bodies).unwrap();
    assert_relative_eq!(bodies[0].f.y, -19.62);
}
