//! Build fully-initialized simulation scenarios from configuration
//!
//! Takes a `ScenarioConfig` (YAML-facing) and produces a runtime bundle,
//! `Scenario`, containing:
//! - engine settings (`Engine`)
//! - numerical parameters (`Parameters`)
//! - system state (`System` with bodies at t = 0)
//! - active force set (`ForceSet` with Barnes–Hut or direct gravity)
//! - the integrator and the state it carries between ticks
//!
//! `step` advances one tick, `run` steps until `t_end`.

use log::{debug, info, warn};

use crate::configuration::config::{BodyConfig, ScenarioConfig};
use crate::error::SimError;
use crate::simulation::collisions::merge_close_bodies;
use crate::simulation::diagnostics::{relative_drift, system_energy, total_angular_momentum, total_momentum, EnergyReport};
use crate::simulation::engine::Engine;
use crate::simulation::forces::{BarnesHutGravity, DirectGravity, ForceSet};
use crate::simulation::integrator::{Integrator, StepReport};
use crate::simulation::params::Parameters;
use crate::simulation::states::{Body, System};
use crate::simulation::vector::NVec2;

/// Steps closer than this to `t_end` are not taken
const TIME_EPSILON: f64 = 1.0e-12;

/// Runtime bundle constructed from a [`ScenarioConfig`]: engine settings,
/// parameters, current system state, active forces and the integrator.
pub struct Scenario {
    pub engine: Engine,
    pub parameters: Parameters,
    pub system: System,
    pub forces: ForceSet,
    pub integrator: Integrator,
    dt: f64, // step to request next tick
    accelerations: Option<Vec<NVec2>>, // velocity-Verlet cache
    steps: usize,
    merges: usize,
    reference_energy: f64,
    max_energy_drift: f64,
}

/// What a run did, for printing or asserting on
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub steps: usize,
    pub t: f64,
    pub bodies: usize,
    pub merges: usize,
    pub initial_energy: EnergyReport,
    pub final_energy: EnergyReport,
    pub max_energy_drift: f64, // largest relative drift seen at a monitor check
    pub momentum: NVec2,
    pub angular_momentum: f64,
}

impl Scenario {
    pub fn build_scenario(cfg: ScenarioConfig) -> Result<Self, SimError> {
        // Bodies: map `BodyConfig` -> runtime `Body` using nalgebra vectors
        let bodies: Vec<Body> = cfg
            .bodies
            .iter()
            .map(|bc: &BodyConfig| {
                Body::new(NVec2::new(bc.x[0], bc.x[1]), NVec2::new(bc.v[0], bc.v[1]), bc.m)
                    .with_radius(bc.radius)
                    .with_trail_length(bc.trail)
            })
            .collect();

        // Parameters (runtime) from ParametersConfig
        let p_cfg = cfg.parameters;
        let parameters = Parameters {
            t_end: p_cfg.t_end,
            h0: p_cfg.h0,
            tolerance: p_cfg.tolerance,
            min_dt: p_cfg.min_dt,
            max_retries: p_cfg.max_retries,
            merge_t: p_cfg.merge_t,
            eps: p_cfg.eps,
            g: p_cfg.g,
            energy_tolerance: p_cfg.energy_tolerance,
            monitor_interval: p_cfg.monitor_interval,
        };

        // Engine (runtime) from EngineConfig
        let e_cfg = cfg.engine;
        let engine = Engine {
            integrator: e_cfg.integrator,
            barnes_hut: e_cfg.barnes_hut,
            theta: e_cfg.theta,
            capacity: e_cfg.capacity,
            max_depth: e_cfg.max_depth,
            tolerate_dropped_bodies: e_cfg.tolerate_dropped_bodies,
        };

        Self::new(engine, parameters, System::new(bodies))
    }

    /// Check the inputs and wire up gravity and the integrator
    pub fn new(engine: Engine, parameters: Parameters, system: System) -> Result<Self, SimError> {
        check_positive("h0", parameters.h0)?;
        check_positive("min_dt", parameters.min_dt)?;
        check_positive("tolerance", parameters.tolerance)?;
        check_non_negative("t_end", parameters.t_end)?;
        check_non_negative("eps", parameters.eps)?;
        check_non_negative("theta", engine.theta)?;
        if engine.capacity == 0 {
            return Err(SimError::InvalidParameter {
                name: "capacity",
                value: 0.0,
            });
        }
        system.validate()?;

        // Forces: construct a ForceSet and register Newtonian gravity
        let forces = if engine.barnes_hut {
            ForceSet::new().with(
                BarnesHutGravity::new(parameters.g, parameters.eps)
                    .with_theta(engine.theta)
                    .with_capacity(engine.capacity)
                    .with_max_depth(engine.max_depth)
                    .tolerate_dropped_bodies(engine.tolerate_dropped_bodies),
            )
        } else {
            ForceSet::new().with(DirectGravity::new(parameters.g, parameters.eps))
        };

        let integrator = Integrator::new(parameters.tolerance, parameters.max_retries, parameters.min_dt);
        let reference_energy = system_energy(&system.bodies, parameters.g, parameters.eps).total;

        info!(
            "scenario: {} bodies, {:?}, {}, t_end = {}, h0 = {}",
            system.len(),
            engine.integrator,
            if engine.barnes_hut { "barnes-hut" } else { "direct" },
            parameters.t_end,
            parameters.h0
        );

        Ok(Self {
            dt: parameters.h0,
            engine,
            parameters,
            system,
            forces,
            integrator,
            accelerations: None,
            steps: 0,
            merges: 0,
            reference_energy,
            max_energy_drift: 0.0,
        })
    }

    /// Step the next tick will request
    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn is_finished(&self) -> bool {
        self.system.t >= self.parameters.t_end - TIME_EPSILON
    }

    pub fn energy(&self) -> EnergyReport {
        system_energy(&self.system.bodies, self.parameters.g, self.parameters.eps)
    }

    /// Advance one tick: integrate, merge, advance time, monitor energy.
    /// The last step is shortened so `t` lands on `t_end`.
    pub fn step(&mut self) -> Result<StepReport, SimError> {
        let remaining = self.parameters.t_end - self.system.t;
        let dt = if remaining > TIME_EPSILON { self.dt.min(remaining) } else { self.dt };

        let report = self.integrator.step(
            self.engine.integrator,
            &mut self.system.bodies,
            dt,
            &self.forces,
            &mut self.accelerations,
        )?;

        self.system.t += report.used;
        // A step clamped to t_end must not shrink the next suggestion
        self.dt = if dt < self.dt { report.next.max(self.dt) } else { report.next };
        self.steps += 1;

        let merged = merge_close_bodies(&mut self.system.bodies, self.parameters.merge_t);
        if merged > 0 {
            info!("t = {:.6}: merged {merged} bodies, {} left", self.system.t, self.system.len());
            self.merges += merged;
            self.accelerations = None;
            // Inelastic merges dissipate energy; drift is measured from here on
            self.reference_energy = self.energy().total;
        }

        let interval = self.parameters.monitor_interval;
        if interval > 0 && self.steps % interval == 0 {
            self.monitor_energy();
        }

        debug!("step {}: t = {:.6}, dt = {:e}", self.steps, self.system.t, report.used);
        Ok(report)
    }

    /// Step until `t_end`
    pub fn run(&mut self) -> Result<RunSummary, SimError> {
        let initial_energy = self.energy();

        while !self.is_finished() {
            self.step()?;
        }

        let final_energy = self.energy();
        self.max_energy_drift = self
            .max_energy_drift
            .max(relative_drift(self.reference_energy, final_energy.total));

        info!(
            "finished at t = {:.6} after {} steps, energy drift {:e}",
            self.system.t, self.steps, self.max_energy_drift
        );

        Ok(RunSummary {
            steps: self.steps,
            t: self.system.t,
            bodies: self.system.len(),
            merges: self.merges,
            initial_energy,
            final_energy,
            max_energy_drift: self.max_energy_drift,
            momentum: total_momentum(&self.system.bodies),
            angular_momentum: total_angular_momentum(&self.system.bodies),
        })
    }

    fn monitor_energy(&mut self) {
        let energy = self.energy();
        let drift = relative_drift(self.reference_energy, energy.total);
        self.max_energy_drift = self.max_energy_drift.max(drift);

        if drift > self.parameters.energy_tolerance {
            warn!(
                "energy drift {drift:e} exceeds {:e} at t = {:.6} (E = {:e}, E0 = {:e})",
                self.parameters.energy_tolerance, self.system.t, energy.total, self.reference_energy
            );
        } else {
            debug!("energy drift {drift:e} at t = {:.6}", self.system.t);
        }
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), SimError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter { name, value })
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), SimError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter { name, value })
    }
}
