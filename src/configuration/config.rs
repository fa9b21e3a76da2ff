//! Configuration types for loading simulation scenarios from YAML.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! simulation scenario. A scenario consists of:
//!
//! - [`EngineConfig`]     – integration scheme and gravity provider options
//! - [`ParametersConfig`] – numerical parameters and physical constants
//! - [`BodyConfig`]       – initial state for each body
//! - [`ScenarioConfig`]   – top-level wrapper used to load a scenario from YAML
//!
//! # YAML format
//! Every field except `t_end` and `h0` is optional:
//!
//! ```yaml
//! engine:
//!   integrator: "verlet"    # "rk4", "adaptive_rk4", "leapfrog" or "verlet"
//!   barnes_hut: true        # false -> exact pairwise sum
//!   theta: 0.5
//!   capacity: 1             # bodies per leaf
//!   max_depth: 20
//!
//! parameters:
//!   t_end: 10.0             # total simulation time
//!   h0: 0.01                # fixed (or initial adaptive) step size
//!   tolerance: 1.0e-6       # adaptive rk4 error tolerance
//!   merge_t: 0.0            # merge distance, 0 disables merging
//!   eps: 1.0                # softening length
//!   G: 1.0                  # gravitational constant
//!
//! bodies:
//!   - x: [ -0.5, 0.0 ]
//!     v: [  0.0, -0.7071 ]
//!     m: 1.0
//!   - x: [  0.5, 0.0 ]
//!     v: [  0.0, 0.7071 ]
//!     m: 1.0
//!     radius: 0.02
//!     trail: 100
//! ```
//!
//! [`crate::simulation::scenario::Scenario`] maps this onto the runtime types.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;

use crate::error::SimError;
use crate::simulation::barnes_hut::{DEFAULT_CAPACITY, DEFAULT_MAX_DEPTH};
use crate::simulation::forces::DEFAULT_THETA;
use crate::simulation::integrator::{Scheme, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DT, DEFAULT_TOLERANCE};
use crate::simulation::params::{DEFAULT_ENERGY_TOLERANCE, DEFAULT_G, DEFAULT_MONITOR_INTERVAL, DEFAULT_SOFTENING};
use crate::simulation::states::DEFAULT_TRAIL_LENGTH;

/// High-level engine configuration
/// Controls the structure of the simulation
#[derive(Deserialize, Debug, Clone)]
pub struct EngineConfig {
    #[serde(default)]
    pub integrator: Scheme, // Time integrator used for advancing the system state
    #[serde(default = "default_true")]
    pub barnes_hut: bool, // `true` - forces approximated through the quadtree, `false` - direct N^2 summation
    #[serde(default = "default_theta")]
    pub theta: f64, // Opening angle: below it a node's center of mass stands in for its bodies
    #[serde(default = "default_capacity")]
    pub capacity: usize, // Bodies held by a leaf before it subdivides
    #[serde(default = "default_max_depth")]
    pub max_depth: usize, // Depth below which nodes stop subdividing
    #[serde(default)]
    pub tolerate_dropped_bodies: bool, // Skip bodies outside the tree bounds instead of failing
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            integrator: Scheme::default(),
            barnes_hut: true,
            theta: DEFAULT_THETA,
            capacity: DEFAULT_CAPACITY,
            max_depth: DEFAULT_MAX_DEPTH,
            tolerate_dropped_bodies: false,
        }
    }
}

/// Global numerical and physical parameters for a scenario
#[derive(Deserialize, Debug, Clone)]
pub struct ParametersConfig {
    pub t_end: f64, // time end
    pub h0: f64, // time step size
    #[serde(default = "default_tolerance")]
    pub tolerance: f64, // adaptive rk4 error tolerance
    #[serde(default = "default_min_dt")]
    pub min_dt: f64, // smallest adaptive step
    #[serde(default = "default_max_retries")]
    pub max_retries: usize, // adaptive shrink attempts per step
    #[serde(default)]
    pub merge_t: f64, // merge threshold
    #[serde(default = "default_softening")]
    pub eps: f64, // softening - keeps forces finite at very small separations
    #[serde(rename = "G", default = "default_g")]
    pub g: f64, // gravitational constant
    #[serde(default = "default_energy_tolerance")]
    pub energy_tolerance: f64, // relative energy drift that triggers a warning
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval: usize, // steps between energy checks
}

/// Configuration for a single body’s initial state
#[derive(Deserialize, Debug, Clone)]
pub struct BodyConfig {
    pub x: [f64; 2], // Initial position
    pub v: [f64; 2], // Initial velocity
    pub m: f64, // Mass of the body
    #[serde(default)]
    pub radius: f64, // Radius, grows on merge
    #[serde(default = "default_trail")]
    pub trail: usize, // Number of past positions kept
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub engine: EngineConfig, // Engine-level configuration (integrator, Barnes–Hut)
    pub parameters: ParametersConfig, // Global numerical and physical parameters
    #[serde(default)]
    pub bodies: Vec<BodyConfig>, // List of bodies that define the initial state of the system
}

impl ScenarioConfig {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SimError> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }
}

fn default_true() -> bool {
    true
}

fn default_theta() -> f64 {
    DEFAULT_THETA
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_min_dt() -> f64 {
    DEFAULT_MIN_DT
}

fn default_max_retries() -> usize {
    DEFAULT_MAX_RETRIES
}

fn default_softening() -> f64 {
    DEFAULT_SOFTENING
}

fn default_g() -> f64 {
    DEFAULT_G
}

fn default_energy_tolerance() -> f64 {
    DEFAULT_ENERGY_TOLERANCE
}

fn default_monitor_interval() -> usize {
    DEFAULT_MONITOR_INTERVAL
}

fn default_trail() -> usize {
    DEFAULT_TRAIL_LENGTH
}
