//! Force providers for the n-body engine
//!
//! A [`ForceProvider`] writes the net force on every body into `Body::f`.
//! Integrators only ever talk to this trait, so the Barnes–Hut calculator,
//! the exact pairwise sum, a composite [`ForceSet`], or a plain closure can
//! all drive any integration scheme.

use crate::error::SimError;
use crate::simulation::barnes_hut::{pair_force, QuadTree, Rect, DEFAULT_CAPACITY, DEFAULT_MAX_DEPTH};
use crate::simulation::states::Body;
use crate::simulation::vector::{warn_once, NVec2};

/// Default opening angle
pub const DEFAULT_THETA: f64 = 0.5;

/// Fraction of the body extent added on each side of the root rectangle
pub const BOUNDS_PADDING: f64 = 0.2;

/// Padding around a single point (or coincident bodies), where there is no
/// extent to scale by
pub const MIN_BOUNDS_PADDING: f64 = 1.0;

/// Padding never drops below this many ulps of the largest coordinate
const ULP_MARGIN: f64 = 4.0 * f64::EPSILON;

/// Root rectangle used when there are no bodies
pub const DEFAULT_BOUNDS: Rect = Rect {
    x: -500.0,
    y: -500.0,
    width: 1000.0,
    height: 1000.0,
};

/// Anything that can fill in the force on each body
pub trait ForceProvider {
    /// Add this provider's contribution to `f` of every body
    fn accumulate_forces(&self, bodies: &mut [Body]) -> Result<(), SimError>;

    /// Zero every `f`, then accumulate
    fn compute_forces(&self, bodies: &mut [Body]) -> Result<(), SimError> {
        bodies.iter_mut().for_each(Body::reset_force);
        self.accumulate_forces(bodies)
    }
}

/// Closures receive bodies with zeroed forces and add to them
impl<F> ForceProvider for F
where
    F: Fn(&mut [Body]) -> Result<(), SimError>,
{
    fn accumulate_forces(&self, bodies: &mut [Body]) -> Result<(), SimError> {
        self(bodies)
    }
}

/// Collection of force terms (gravity, external fields, ...)
/// Their contributions are summed into each body's force
#[derive(Default)]
pub struct ForceSet {
    terms: Vec<Box<dyn ForceProvider + Send + Sync>>,
}

impl ForceSet {
    /// Create an empty force set
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Add a force term
    pub fn with<T>(mut self, term: T) -> Self
    where
        T: ForceProvider + Send + Sync + 'static,
    {
        self.terms.push(Box::new(term));
        self
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl ForceProvider for ForceSet {
    fn accumulate_forces(&self, bodies: &mut [Body]) -> Result<(), SimError> {
        for term in &self.terms {
            term.accumulate_forces(bodies)?;
        }
        Ok(())
    }
}

/// Exact softened Newtonian gravity, O(N²) over unique pairs.
/// Reference for the tree code and the cheaper choice for a handful of bodies.
pub struct DirectGravity {
    pub g: f64, // gravitational constant
    pub softening: f64, // softening length
}

impl DirectGravity {
    pub fn new(g: f64, softening: f64) -> Self {
        Self { g, softening }
    }
}

impl ForceProvider for DirectGravity {
    fn accumulate_forces(&self, bodies: &mut [Body]) -> Result<(), SimError> {
        let n = bodies.len();
        let eps2 = self.softening * self.softening;

        // Each unordered pair once; equal and opposite contributions
        for i in 0..n {
            for j in (i + 1)..n {
                let r = bodies[j].x - bodies[i].x;
                let f = pair_force(r, bodies[i].m, bodies[j].m, self.g, eps2);
                bodies[i].f += f;
                bodies[j].f -= f;
            }
        }
        Ok(())
    }
}

/// Newtonian gravity evaluated through a Barnes–Hut quadtree.
///
/// Every call:
/// 1. computes a padded rectangle around the bodies,
/// 2. builds a fresh [`QuadTree`] over them,
/// 3. queries the tree once per body and adds the result to `f`.
///
/// `theta` is the accuracy knob: lower is more accurate, higher is faster.
#[derive(Debug, Clone)]
pub struct BarnesHutGravity {
    pub g: f64, // gravitational constant
    pub softening: f64, // softening length
    pub theta: f64, // opening angle
    pub capacity: usize, // bodies per leaf before subdividing
    pub max_depth: usize, // tree depth cap
    pub tolerate_dropped_bodies: bool, // drop out-of-bounds bodies instead of failing
}

impl BarnesHutGravity {
    pub fn new(g: f64, softening: f64) -> Self {
        Self {
            g,
            softening,
            theta: DEFAULT_THETA,
            capacity: DEFAULT_CAPACITY,
            max_depth: DEFAULT_MAX_DEPTH,
            tolerate_dropped_bodies: false,
        }
    }

    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn tolerate_dropped_bodies(mut self, tolerate: bool) -> Self {
        self.tolerate_dropped_bodies = tolerate;
        self
    }

    /// Build the tree for the current positions without computing forces
    pub fn build_tree<'a>(&self, bodies: &'a [Body]) -> Result<QuadTree<'a>, SimError> {
        let mut tree = QuadTree::new(bodies, compute_bounds(bodies), self.capacity, self.max_depth);

        for (i, b) in bodies.iter().enumerate() {
            if tree.insert(i) {
                continue;
            }
            // The bounds were computed from these very bodies, so this is a
            // NaN/inf position or a bounds bug
            if self.tolerate_dropped_bodies {
                warn_once!("dropping body {i} at ({}, {}) outside the tree bounds", b.x.x, b.x.y);
                continue;
            }
            return Err(SimError::BodyOutOfBounds {
                index: i,
                x: b.x.x,
                y: b.x.y,
            });
        }

        Ok(tree)
    }
}

impl Default for BarnesHutGravity {
    fn default() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl ForceProvider for BarnesHutGravity {
    fn accumulate_forces(&self, bodies: &mut [Body]) -> Result<(), SimError> {
        if bodies.is_empty() {
            return Ok(());
        }

        let forces: Vec<NVec2> = {
            let tree = self.build_tree(bodies)?;
            (0..bodies.len())
                .map(|i| tree.calculate_force(i, self.g, self.softening, self.theta))
                .collect()
        };

        for (b, f) in bodies.iter_mut().zip(forces) {
            b.f += f;
        }
        Ok(())
    }
}

/// Rectangle enclosing every body, padded by `BOUNDS_PADDING` of the
/// extent on each side of each axis. An axis with no extent takes the other
/// axis' padding, and a single point gets `MIN_BOUNDS_PADDING`.
/// Falls back to `DEFAULT_BOUNDS` for an empty slice.
pub fn compute_bounds(bodies: &[Body]) -> Rect {
    if bodies.is_empty() {
        return DEFAULT_BOUNDS;
    }

    let (min, max) = bodies.iter().fold(
        (
            NVec2::new(f64::INFINITY, f64::INFINITY),
            NVec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        ),
        |(min, max), b| {
            (
                NVec2::new(min.x.min(b.x.x), min.y.min(b.x.y)),
                NVec2::new(max.x.max(b.x.x), max.y.max(b.x.y)),
            )
        },
    );

    if !(min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()) {
        return DEFAULT_BOUNDS;
    }

    let extent = max - min;
    let longest = extent.x.max(extent.y);

    // A flat axis borrows the padding of the longer one
    let fallback = if longest > 0.0 { longest * BOUNDS_PADDING } else { MIN_BOUNDS_PADDING };
    let pad = |span: f64, lo: f64, hi: f64| {
        let pad = if span > 0.0 { span * BOUNDS_PADDING } else { fallback };
        pad.max(ULP_MARGIN * lo.abs().max(hi.abs()))
    };
    let pad_x = pad(extent.x, min.x, max.x);
    let pad_y = pad(extent.y, min.y, max.y);

    Rect::new(
        min.x - pad_x,
        min.y - pad_y,
        extent.x + 2.0 * pad_x,
        extent.y + 2.0 * pad_y,
    )
}
