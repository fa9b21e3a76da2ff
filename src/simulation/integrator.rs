//! Time integrators for the N-body system
//!
//! Four interchangeable schemes, all driven by a [`ForceProvider`]:
//! - classical RK4 (4 force evaluations per step)
//! - adaptive RK4 with step doubling (bounded retry loop)
//! - kick-drift-kick leapfrog (2 evaluations)
//! - velocity-Verlet that hands back its final accelerations for reuse
//!
//! Every scheme finishes by running `Body::finish_step` on each body, which
//! leaves `f` zeroed. No scheme touches a body's mass.

use log::{debug, trace, warn};
use serde::Deserialize;

use crate::error::SimError;
use crate::simulation::forces::ForceProvider;
use crate::simulation::states::Body;
use crate::simulation::vector::NVec2;

/// Step-doubling error tolerance
pub const DEFAULT_TOLERANCE: f64 = 1.0e-6;

/// Timestep shrinks allowed before an adaptive step gives up
pub const DEFAULT_MAX_RETRIES: usize = 32;

/// Smallest timestep the adaptive scheme will try
pub const DEFAULT_MIN_DT: f64 = 1.0e-9;

/// Largest factor between a requested step and the next suggested one
pub const DEFAULT_MAX_GROWTH: f64 = 2.0;

/// Safety factor on the step-size controller
const SAFETY: f64 = 0.8;

/// Which integration scheme advances the bodies
/// `integrator: "rk4" | "adaptive_rk4" | "leapfrog" | "verlet"`
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    #[serde(rename = "rk4")] // Classical 4th-order Runge–Kutta, fixed step, not symplectic
    Rk4,

    #[serde(rename = "adaptive_rk4")] // RK4 with step-doubling error control
    AdaptiveRk4,

    #[serde(rename = "leapfrog")] // Kick-drift-kick, symplectic
    Leapfrog,

    #[default]
    #[serde(rename = "verlet")] // Velocity-Verlet, symplectic, reuses the last force evaluation
    Verlet,
}

/// Outcome of one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub used: f64, // timestep actually applied
    pub next: f64, // timestep to request next time
    pub attempts: usize, // tries it took (always 1 for fixed-step schemes)
    pub error: Option<f64>, // step-doubling error estimate, adaptive only
}

impl StepReport {
    fn fixed(dt: f64) -> Self {
        Self {
            used: dt,
            next: dt,
            attempts: 1,
            error: None,
        }
    }
}

/// Position and velocity derivatives of one body at one RK4 stage
#[derive(Debug, Clone, Copy)]
struct Derivative {
    dx: NVec2,
    dv: NVec2,
}

/// Integration schemes plus the adaptive controller's settings.
/// Holds no per-run state; callers keep the suggested timestep and the
/// Verlet acceleration cache themselves.
#[derive(Debug, Clone)]
pub struct Integrator {
    pub tolerance: f64, // max position/velocity discrepancy per adaptive step
    pub max_retries: usize, // shrink attempts before reporting failure
    pub min_dt: f64, // timestep floor
    pub max_growth: f64, // cap on next / requested
}

impl Default for Integrator {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_retries: DEFAULT_MAX_RETRIES,
            min_dt: DEFAULT_MIN_DT,
            max_growth: DEFAULT_MAX_GROWTH,
        }
    }
}

impl Integrator {
    pub fn new(tolerance: f64, max_retries: usize, min_dt: f64) -> Self {
        Self {
            tolerance,
            max_retries,
            min_dt,
            ..Self::default()
        }
    }

    /// Advance with `scheme`.
    ///
    /// `accelerations` is the velocity-Verlet cache: read and refreshed by
    /// `Scheme::Verlet`, cleared by every other scheme.
    pub fn step(
        &self,
        scheme: Scheme,
        bodies: &mut [Body],
        dt: f64,
        forces: &dyn ForceProvider,
        accelerations: &mut Option<Vec<NVec2>>,
    ) -> Result<StepReport, SimError> {
        match scheme {
            Scheme::Rk4 => {
                *accelerations = None;
                self.rk4_step(bodies, dt, forces)?;
                Ok(StepReport::fixed(dt))
            }
            Scheme::AdaptiveRk4 => {
                *accelerations = None;
                self.adaptive_rk4_step(bodies, dt, forces)
            }
            Scheme::Leapfrog => {
                *accelerations = None;
                self.leapfrog_step(bodies, dt, forces)?;
                Ok(StepReport::fixed(dt))
            }
            Scheme::Verlet => {
                let a = self.velocity_verlet_step(bodies, dt, forces, accelerations.as_deref())?;
                *accelerations = Some(a);
                Ok(StepReport::fixed(dt))
            }
        }
    }

    /// Advance by one classical RK4 step.
    ///
    /// ```text
    /// k1 = f(y0)
    /// k2 = f(y0 + dt/2 k1)
    /// k3 = f(y0 + dt/2 k2)
    /// k4 = f(y0 + dt k3)
    /// y1 = y0 + dt/6 (k1 + 2 k2 + 2 k3 + k4)
    /// ```
    /// with `y = (x, v)` and `f(y) = (v, F/m)`.
    ///
    /// If the force provider fails at any stage the bodies are put back at
    /// `y0` with forces zeroed before the error is returned.
    pub fn rk4_step(&self, bodies: &mut [Body], dt: f64, forces: &dyn ForceProvider) -> Result<(), SimError> {
        if bodies.is_empty() {
            return Ok(());
        }
        let start = Snapshot::take(bodies);
        rk4_advance(bodies, dt, forces).map_err(|e| start.restore(bodies, e))?;
        bodies.iter_mut().for_each(Body::finish_step);
        Ok(())
    }

    /// Advance by one RK4 step with step-doubling error control.
    ///
    /// Each attempt integrates scratch copies twice: one step of `h`, and two
    /// steps of `h/2`. The error is the largest position or velocity
    /// difference between the two over all bodies.
    ///
    /// - error > tolerance, or not finite: shrink `h` by `0.8 (tol/err)^(1/4)` and retry.
    ///   After `max_retries` shrinks, or once `h` is at `min_dt`, give up
    ///   with [`SimError::ConvergenceFailure`] and leave the bodies as they were.
    /// - otherwise: apply the two-half-step result. If the error was below
    ///   tol/10 suggest a larger next step, at most `max_growth` times `dt`.
    pub fn adaptive_rk4_step(&self, bodies: &mut [Body], dt: f64, forces: &dyn ForceProvider) -> Result<StepReport, SimError> {
        if bodies.is_empty() {
            return Ok(StepReport::fixed(dt));
        }

        let max_next = dt * self.max_growth;
        let mut h = dt;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let mut full = bodies.to_vec();
            rk4_advance(&mut full, h, forces)?;

            let mut halves = bodies.to_vec();
            rk4_advance(&mut halves, 0.5 * h, forces)?;
            rk4_advance(&mut halves, 0.5 * h, forces)?;

            let error = max_discrepancy(&full, &halves);
            trace!("adaptive rk4 attempt {attempts}: h = {h:e}, error = {error:e}");

            if error.is_finite() && error <= self.tolerance {
                for (b, s) in bodies.iter_mut().zip(&halves) {
                    b.x = s.x;
                    b.v = s.v;
                    b.finish_step();
                }

                let next = if error < 0.1 * self.tolerance {
                    let grow = if error > 0.0 {
                        (SAFETY * (self.tolerance / error).powf(0.25)).min(self.max_growth)
                    } else {
                        self.max_growth
                    };
                    (h * grow).min(max_next).max(h)
                } else {
                    h
                };

                return Ok(StepReport {
                    used: h,
                    next,
                    attempts,
                    error: Some(error),
                });
            }

            if attempts > self.max_retries || h <= self.min_dt {
                bodies.iter_mut().for_each(Body::reset_force);
                warn!("adaptive rk4 gave up after {attempts} attempts at dt = {h:e} (error {error:e})");
                return Err(SimError::ConvergenceFailure {
                    attempts,
                    dt: h,
                    error,
                    tolerance: self.tolerance,
                });
            }

            // A non-finite error makes `factor` NaN or zero; either way `h` lands on the floor
            let factor = SAFETY * (self.tolerance / error).powf(0.25);
            h = (h * factor).max(self.min_dt);
            debug!("adaptive rk4 error {error:e} above {:e}, retrying with dt = {h:e}", self.tolerance);
        }
    }

    /// Kick-drift-kick leapfrog:
    /// v(t+dt/2) = v(t) + a(t) dt/2, x(t+dt) = x(t) + v(t+dt/2) dt,
    /// v(t+dt) = v(t+dt/2) + a(t+dt) dt/2
    ///
    /// A failed force evaluation rolls the bodies back to the start state.
    pub fn leapfrog_step(&self, bodies: &mut [Body], dt: f64, forces: &dyn ForceProvider) -> Result<(), SimError> {
        if bodies.is_empty() {
            return Ok(());
        }
        let half_dt = 0.5 * dt;
        let start = Snapshot::take(bodies);

        // Kick with forces at the start state
        forces.compute_forces(bodies).map_err(|e| start.restore(bodies, e))?;
        for b in bodies.iter_mut() {
            let a = b.acceleration();
            b.v += a * half_dt;
        }

        // Drift
        for b in bodies.iter_mut() {
            let v = b.v;
            b.x += v * dt;
        }

        // Second kick with forces at the new positions
        forces.compute_forces(bodies).map_err(|e| start.restore(bodies, e))?;
        for b in bodies.iter_mut() {
            let a = b.acceleration();
            b.v += a * half_dt;
            b.finish_step();
        }
        Ok(())
    }

    /// Velocity-Verlet:
    /// x(t+dt) = x + v dt + a(t) dt²/2, v(t+dt) = v + (a(t) + a(t+dt)) dt/2
    ///
    /// `cached` are the accelerations returned by the previous call. When it
    /// is missing or its length no longer matches the bodies, a(t) is
    /// evaluated afresh. Returns a(t+dt) to pass in next time. On a failed
    /// force evaluation the bodies are restored and nothing is returned to cache.
    pub fn velocity_verlet_step(
        &self,
        bodies: &mut [Body],
        dt: f64,
        forces: &dyn ForceProvider,
        cached: Option<&[NVec2]>,
    ) -> Result<Vec<NVec2>, SimError> {
        if bodies.is_empty() {
            return Ok(Vec::new());
        }

        let start = Snapshot::take(bodies);
        let a_old = match cached {
            Some(a) if a.len() == bodies.len() => a.to_vec(),
            _ => {
                forces.compute_forces(bodies).map_err(|e| start.restore(bodies, e))?;
                accelerations(bodies)
            }
        };

        let half_dt2 = 0.5 * dt * dt;
        for (b, a) in bodies.iter_mut().zip(&a_old) {
            let v = b.v;
            b.x += v * dt + a * half_dt2;
        }

        forces.compute_forces(bodies).map_err(|e| start.restore(bodies, e))?;
        let a_new = accelerations(bodies);

        let half_dt = 0.5 * dt;
        for ((b, a0), a1) in bodies.iter_mut().zip(&a_old).zip(&a_new) {
            b.v += (a0 + a1) * half_dt;
            b.finish_step();
        }

        Ok(a_new)
    }
}

// helpers ===========================================================================

/// Positions and velocities at the start of a fixed step
struct Snapshot {
    x: Vec<NVec2>,
    v: Vec<NVec2>,
}

impl Snapshot {
    fn take(bodies: &[Body]) -> Self {
        Self {
            x: bodies.iter().map(|b| b.x).collect(),
            v: bodies.iter().map(|b| b.v).collect(),
        }
    }

    /// Put the bodies back, zero their forces, and pass `err` through
    fn restore(&self, bodies: &mut [Body], err: SimError) -> SimError {
        for ((b, x), v) in bodies.iter_mut().zip(&self.x).zip(&self.v) {
            b.x = *x;
            b.v = *v;
            b.reset_force();
        }
        debug!("force evaluation failed mid-step, bodies rolled back: {err}");
        err
    }
}

/// One RK4 step without the post-step hooks. Forces are left as evaluated
/// at the last stage.
fn rk4_advance(bodies: &mut [Body], dt: f64, forces: &dyn ForceProvider) -> Result<(), SimError> {
    let x0: Vec<NVec2> = bodies.iter().map(|b| b.x).collect();
    let v0: Vec<NVec2> = bodies.iter().map(|b| b.v).collect();

    forces.compute_forces(bodies)?;
    let k1 = derivatives(bodies);

    set_stage(bodies, &x0, &v0, &k1, 0.5 * dt);
    forces.compute_forces(bodies)?;
    let k2 = derivatives(bodies);

    set_stage(bodies, &x0, &v0, &k2, 0.5 * dt);
    forces.compute_forces(bodies)?;
    let k3 = derivatives(bodies);

    set_stage(bodies, &x0, &v0, &k3, dt);
    forces.compute_forces(bodies)?;
    let k4 = derivatives(bodies);

    let sixth = dt / 6.0;
    for (i, b) in bodies.iter_mut().enumerate() {
        b.x = x0[i] + (k1[i].dx + 2.0 * k2[i].dx + 2.0 * k3[i].dx + k4[i].dx) * sixth;
        b.v = v0[i] + (k1[i].dv + 2.0 * k2[i].dv + 2.0 * k3[i].dv + k4[i].dv) * sixth;
    }
    Ok(())
}

fn derivatives(bodies: &[Body]) -> Vec<Derivative> {
    bodies
        .iter()
        .map(|b| Derivative {
            dx: b.v,
            dv: b.acceleration(),
        })
        .collect()
}

/// Put every body at `y0 + h k`
fn set_stage(bodies: &mut [Body], x0: &[NVec2], v0: &[NVec2], k: &[Derivative], h: f64) {
    for (i, b) in bodies.iter_mut().enumerate() {
        b.x = x0[i] + k[i].dx * h;
        b.v = v0[i] + k[i].dv * h;
    }
}

fn accelerations(bodies: &[Body]) -> Vec<NVec2> {
    bodies.iter().map(Body::acceleration).collect()
}

/// Largest position or velocity difference between two integrations, NaN if
/// any body went non-finite
fn max_discrepancy(a: &[Body], b: &[Body]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(p, q)| (p.x - q.x).norm().max((p.v - q.v).norm()))
        .fold(0.0, |acc: f64, e| if acc.is_nan() || e.is_nan() { f64::NAN } else { acc.max(e) })
}
