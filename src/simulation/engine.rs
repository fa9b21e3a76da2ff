//! High-level runtime engine settings
//!
//! Selects the integration scheme and the gravity provider (Barnes–Hut or
//! direct summation) used when building and running a `Scenario`

use crate::simulation::barnes_hut::{DEFAULT_CAPACITY, DEFAULT_MAX_DEPTH};
use crate::simulation::forces::DEFAULT_THETA;
use crate::simulation::integrator::Scheme;

#[derive(Debug, Clone)]
pub struct Engine {
    pub integrator: Scheme, // rk4, adaptive rk4, leapfrog or verlet
    pub barnes_hut: bool, // false = direct, true = barnes-hut
    pub theta: f64, // opening angle, decides when a node's center of mass stands in for its bodies
    pub capacity: usize, // bodies per leaf
    pub max_depth: usize, // tree depth cap
    pub tolerate_dropped_bodies: bool, // skip bodies outside the tree instead of failing
}

impl Default for Engine {
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
