//! Core state types for the N-body simulation.
//!
//! - `Body`   one point mass: kinematic state, accumulated force, and the
//!            derived values renderers read (kinetic energy, glow, trail)
//! - `System` the list of bodies and the current simulation time `t`
//!
//! Bodies are owned by the `System`. Force providers and integrators only
//! borrow them for the duration of one call.

use std::collections::VecDeque;

use crate::error::SimError;
use crate::simulation::vector::{NVec2, PlanarVector};

/// Default number of positions kept in a body's trail
pub const DEFAULT_TRAIL_LENGTH: usize = 50;

/// Speed at which `glow` reaches one half
const GLOW_HALF_SPEED: f64 = 50.0;

/// Bounded history of past positions, oldest first
#[derive(Debug, Clone, Default)]
pub struct Trail {
    points: VecDeque<NVec2>,
    max_len: usize,
}

impl Trail {
    pub fn new(max_len: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    pub fn push(&mut self, p: NVec2) {
        if self.max_len == 0 {
            return;
        }
        while self.points.len() >= self.max_len {
            self.points.pop_front();
        }
        self.points.push_back(p);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &NVec2> {
        self.points.iter()
    }

    pub fn last(&self) -> Option<&NVec2> {
        self.points.back()
    }
}

#[derive(Debug, Clone)]
pub struct Body {
    pub x: NVec2, // position
    pub v: NVec2, // velocity
    pub f: NVec2, // accumulated force, zeroed after every step
    pub m: f64, // mass, never changed by the integrators
    pub radius: f64, // merge radius
    pub kinetic: f64, // kinetic energy as of the last completed step
    pub glow: f64, // visual intensity in [0, 1), derived from speed
    pub trail: Trail, // recent positions
}

impl Body {
    pub fn new(x: NVec2, v: NVec2, m: f64) -> Self {
        let mut body = Self {
            x,
            v,
            f: NVec2::zeros(),
            m,
            radius: 0.0,
            kinetic: 0.0,
            glow: 0.0,
            trail: Trail::new(DEFAULT_TRAIL_LENGTH),
        };
        body.refresh_kinetic_energy();
        body
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_trail_length(mut self, max_len: usize) -> Self {
        self.trail = Trail::new(max_len);
        self
    }

    /// Acceleration implied by the accumulated force
    pub fn acceleration(&self) -> NVec2 {
        self.f / self.m
    }

    pub fn momentum(&self) -> NVec2 {
        self.v * self.m
    }

    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.m * self.v.norm_squared()
    }

    /// z component of the angular momentum about the origin
    pub fn angular_momentum(&self) -> f64 {
        self.m * self.x.cross_z(&self.v)
    }

    pub fn reset_force(&mut self) {
        self.f = NVec2::zeros();
    }

    pub fn refresh_kinetic_energy(&mut self) {
        self.kinetic = self.kinetic_energy();
    }

    pub fn record_trail(&mut self) {
        self.trail.push(self.x);
    }

    pub fn update_glow(&mut self) {
        let s2 = self.v.norm_squared();
        self.glow = s2 / (s2 + GLOW_HALF_SPEED * GLOW_HALF_SPEED);
    }

    /// Post-step hooks. Renderers depend on this order.
    pub fn finish_step(&mut self) {
        self.refresh_kinetic_energy();
        self.record_trail();
        self.update_glow();
        self.reset_force();
    }

    /// Check the preconditions every integrator relies on
    pub fn validate(&self, index: usize) -> Result<(), SimError> {
        let reason = if !(self.m.is_finite() && self.m > 0.0) {
            format!("mass must be positive and finite, got {}", self.m)
        } else if !(self.x.x.is_finite() && self.x.y.is_finite()) {
            format!("position is not finite: ({}, {})", self.x.x, self.x.y)
        } else if !(self.v.x.is_finite() && self.v.y.is_finite()) {
            format!("velocity is not finite: ({}, {})", self.v.x, self.v.y)
        } else {
            return Ok(());
        };
        Err(SimError::InvalidBody { index, reason })
    }
}

#[derive(Debug, Clone, Default)]
pub struct System {
    pub bodies: Vec<Body>, // collection of bodies
    pub t: f64, // time
}

impl System {
    pub fn new(bodies: Vec<Body>) -> Self {
        Self { bodies, t: 0.0 }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn total_mass(&self) -> f64 {
        self.bodies.iter().map(|b| b.m).sum()
    }

    pub fn validate(&self) -> Result<(), SimError> {
        self.bodies
            .iter()
            .enumerate()
            .try_for_each(|(i, b)| b.validate(i))
    }
}
