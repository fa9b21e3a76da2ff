//! Numerical and physical parameters for the simulation
//!
//! `Parameters` holds runtime settings:
//! - integration step size and end time,
//! - adaptive rk4 controls (tolerance, timestep floor, retry cap),
//! - softening length and gravitational constant (`eps`, `g`),
//! - merge threshold and energy monitoring

use crate::simulation::integrator::{DEFAULT_MAX_RETRIES, DEFAULT_MIN_DT, DEFAULT_TOLERANCE};

pub const DEFAULT_SOFTENING: f64 = 1.0;
pub const DEFAULT_G: f64 = 1.0;
pub const DEFAULT_ENERGY_TOLERANCE: f64 = 1.0e-2;
pub const DEFAULT_MONITOR_INTERVAL: usize = 100;

#[derive(Debug, Clone)]
pub struct Parameters {
    pub t_end: f64, // time end
    pub h0: f64, // step size (initial step size for adaptive rk4)
    pub tolerance: f64, // step-doubling error tolerance
    pub min_dt: f64, // adaptive timestep floor
    pub max_retries: usize, // adaptive shrink attempts per step
    pub merge_t: f64, // merge threshold, 0 disables merging
    pub eps: f64, // softening length
    pub g: f64, // gravitational constant
    pub energy_tolerance: f64, // relative energy drift that triggers a warning
    pub monitor_interval: usize, // steps between energy checks, 0 disables
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            t_end: 10.0,
            h0: 0.01,
            tolerance: DEFAULT_TOLERANCE,
            min_dt: DEFAULT_MIN_DT,
            max_retries: DEFAULT_MAX_RETRIES,
            merge_t: 0.0,
            eps: DEFAULT_SOFTENING,
            g: DEFAULT_G,
            energy_tolerance: DEFAULT_ENERGY_TOLERANCE,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
        }
    }
}
