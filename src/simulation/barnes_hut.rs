//! # Barnes–Hut Quadtree (2D)
//!
//! This module implements a **planar Barnes–Hut quadtree** for approximating
//! gravitational forces in an `N`-body system. The goal is to replace the
//! naive `O(N²)` all-pairs force calculation with an approximate `O(N log N)`
//! method while keeping close interactions exact.
//!
//! ## Core Concepts
//!
//! A group of distant bodies is treated as a single pseudo-body located at
//! their center of mass. For a far cluster one interaction is much cheaper
//! than many individual ones.
//!
//! - The simulation plane is recursively subdivided into 4 quadrants
//!   (nw, ne, sw, se).
//! - Each region becomes a node of the tree.
//! - A node holds bodies directly until it exceeds its capacity, then it
//!   subdivides and pushes them down into its children.
//! - Each node stores:
//!   - total mass of its subtree
//!   - center of mass (COM)
//!   - bounding rectangle (for its size and for subdivision)
//!
//! ## Invariants
//!
//! - `mass`/`com` of every node are refreshed right after each insertion or
//!   subdivision that touches it, so the tree is never queried stale.
//! - Depth is capped (`max_depth`). Past the cap a node keeps every body it
//!   is given. Coincident positions would otherwise subdivide forever.
//! - A body is never dropped once it is inside the root bounds.
//! - The tree borrows the body slice; it never copies or frees bodies and
//!   is rebuilt from scratch for every force evaluation.

use log::{debug, warn};

use crate::simulation::states::Body;
use crate::simulation::vector::{warn_once, NVec2};

/// Bodies a node may hold directly before it subdivides
pub const DEFAULT_CAPACITY: usize = 1;

/// Hard limit on tree depth
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// An axis-aligned rectangle given by its minimum corner and extent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Edge-inclusive containment test
    pub fn contains(&self, p: &NVec2) -> bool {
        p.x >= self.x
            && p.x <= self.x + self.width
            && p.y >= self.y
            && p.y <= self.y + self.height
    }

    /// Whether any point of the rectangle lies within `radius` of `center`
    pub fn intersects_circle(&self, center: &NVec2, radius: f64) -> bool {
        let closest = NVec2::new(
            center.x.clamp(self.x, self.x + self.width),
            center.y.clamp(self.y, self.y + self.height),
        );
        (center - closest).norm_squared() <= radius * radius
    }

    pub fn center(&self) -> NVec2 {
        NVec2::new(self.x + 0.5 * self.width, self.y + 0.5 * self.height)
    }

    /// Size used by the opening-angle test: the longer side
    pub fn size(&self) -> f64 {
        self.width.max(self.height)
    }

    /// Split into four equal quadrants, in insertion order `[nw, ne, sw, se]`
    ///
    /// The y axis points up, so "north" is the half with larger y.
    ///
    /// ```text
    /// +------+------+
    /// |  nw  |  ne  |
    /// +------+------+
    /// |  sw  |  se  |
    /// +------+------+
    /// ```
    pub fn quadrants(&self) -> [Rect; 4] {
        let hw = 0.5 * self.width;
        let hh = 0.5 * self.height;
        let mx = self.x + hw;
        let my = self.y + hh;
        [
            Rect::new(self.x, my, hw, hh), // nw
            Rect::new(mx, my, hw, hh),     // ne
            Rect::new(self.x, self.y, hw, hh), // sw
            Rect::new(mx, self.y, hw, hh), // se
        ]
    }
}

/// A single quadtree node.
///
/// A node is either
/// - an undivided leaf holding up to `capacity` bodies directly (more only
///   once the depth cap is reached), or
/// - a divided internal node with exactly four children and, normally, no
///   bodies of its own.
pub struct QuadNode {
    pub bounds: Rect,
    pub bodies: Vec<usize>,           // indices into the body slice held directly
    pub children: Option<[usize; 4]>, // indices into QuadTree::nodes, [nw, ne, sw, se]
    pub mass: f64,                    // total mass of this subtree
    pub com: NVec2,                   // center of mass of this subtree
    pub depth: usize,
    own_mass: f64,    // mass of `bodies` alone
    own_moment: NVec2, // sum of m * x over `bodies`
}

impl QuadNode {
    fn new(bounds: Rect, depth: usize) -> Self {
        Self {
            bounds,
            bodies: Vec::new(),
            children: None,
            mass: 0.0,
            com: NVec2::zeros(),
            depth,
            own_mass: 0.0,
            own_moment: NVec2::zeros(),
        }
    }

    pub fn is_divided(&self) -> bool {
        self.children.is_some()
    }
}

/// A complete quadtree built over a slice of bodies.
///
/// This structure owns:
/// - a vector of all nodes (`nodes`), children referenced by index
/// - the index of the root node (`root`)
///
/// and borrows the bodies it indexes.
pub struct QuadTree<'a> {
    pub nodes: Vec<QuadNode>,
    pub root: usize,
    bodies: &'a [Body],
    capacity: usize,
    max_depth: usize,
    depth_limited: bool,
}

impl<'a> QuadTree<'a> {
    /// Create an empty tree whose root covers `bounds`.
    ///
    /// # Parameters
    /// - `bodies`   : slice the tree will index into; insertions refer to it by position
    /// - `bounds`   : rectangle of the root node
    /// - `capacity` : bodies a node holds directly before subdividing (at least 1)
    /// - `max_depth`: depth at which nodes stop subdividing
    pub fn new(bodies: &'a [Body], bounds: Rect, capacity: usize, max_depth: usize) -> Self {
        let mut nodes = Vec::with_capacity(bodies.len() * 2 + 1);
        nodes.push(QuadNode::new(bounds, 0));

        Self {
            nodes,
            root: 0,
            bodies,
            capacity: capacity.max(1),
            max_depth,
            depth_limited: false,
        }
    }

    /// Insert body `index` of the borrowed slice.
    ///
    /// Returns `false` only when the body lies outside the root bounds.
    pub fn insert(&mut self, index: usize) -> bool {
        self.insert_at(self.root, index)
    }

    /// Compute the force on body `index` from every other body in the tree.
    ///
    /// Walks the tree from the root:
    ///
    /// - **Empty node** (`mass == 0`): no contribution.
    /// - **Undivided leaf**: exact softened pairwise force from each held
    ///   body, skipping `index` itself and any body at zero distance.
    /// - **Divided node**: let `s` be the longer side and `d` the distance to
    ///   the node's COM. If `s / d < theta` and the node does not contain the
    ///   queried body, the whole subtree acts as one mass at its COM.
    ///   Otherwise descend into all four children.
    ///
    /// The containment check keeps a body from ever being attracted by an
    /// aggregate that includes itself, which a plain `s / d` test allows
    /// for `theta` near 1.
    ///
    /// Force law: `|F| = G * m1 * m2 / (d² + softening²)` along the unit
    /// displacement. `theta = 0` reproduces the exact pairwise sum.
    ///
    /// # Parameters
    /// - `index`    : body to compute the force on
    /// - `g`        : gravitational constant
    /// - `softening`: softening length (added in quadrature to the distance)
    /// - `theta`    : opening-angle threshold, smaller is more accurate
    pub fn calculate_force(&self, index: usize, g: f64, softening: f64, theta: f64) -> NVec2 {
        let body = &self.bodies[index];
        let eps2 = softening * softening;
        self.force_from(self.root, index, body.x, body.m, g, eps2, theta)
    }

    /// Indices of the inserted bodies strictly closer than `radius` to `pos`,
    /// in traversal order. Subtrees whose bounds miss the circle are skipped.
    pub fn neighbors_within(&self, pos: NVec2, radius: f64) -> Vec<usize> {
        let mut found = Vec::new();
        self.collect_neighbors(self.root, pos, radius, &mut found);
        found
    }

    pub fn total_mass(&self) -> f64 {
        self.nodes[self.root].mass
    }

    pub fn center_of_mass(&self) -> NVec2 {
        self.nodes[self.root].com
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn bounds(&self) -> Rect {
        self.nodes[self.root].bounds
    }

    /// Whether any insertion had to overfill a node at the depth cap
    pub fn depth_limited(&self) -> bool {
        self.depth_limited
    }

    // helpers ==============================================================================

    /// Insert a body into the subtree rooted at `node_idx`.
    ///
    /// - Outside this node's bounds: reject.
    /// - Undivided with spare capacity: hold it here.
    /// - At the depth cap: hold it here regardless of capacity.
    /// - Otherwise subdivide if needed and hand it to the first child
    ///   (nw, ne, sw, se) that accepts it.
    ///
    /// The node's mass aggregate is refreshed before returning `true`.
    fn insert_at(&mut self, node_idx: usize, body_idx: usize) -> bool {
        let pos = self.bodies[body_idx].x;
        let node = &self.nodes[node_idx];

        if !node.bounds.contains(&pos) {
            return false;
        }

        if !node.is_divided() && node.bodies.len() < self.capacity {
            self.hold(node_idx, body_idx);
            self.recompute_mass(node_idx);
            return true;
        }

        if node.depth >= self.max_depth {
            if !self.depth_limited {
                self.depth_limited = true;
                warn!(
                    "quadtree depth limit {} reached at ({}, {}); holding {} bodies in one cell",
                    self.max_depth,
                    pos.x,
                    pos.y,
                    node.bodies.len() + 1
                );
            }
            self.hold(node_idx, body_idx);
            self.recompute_mass(node_idx);
            return true;
        }

        if !node.is_divided() {
            self.subdivide(node_idx);
        }

        if !self.insert_into_children(node_idx, body_idx) {
            // Inside the parent but outside every child: only rounding at
            // the quadrant seams can do this. Keep it rather than lose it.
            self.straddle(node_idx, body_idx);
        }

        self.recompute_mass(node_idx);
        true
    }

    /// Try children in fixed order, first success wins
    fn insert_into_children(&mut self, node_idx: usize, body_idx: usize) -> bool {
        let Some(children) = self.nodes[node_idx].children else {
            return false;
        };
        children.iter().any(|&child| self.insert_at(child, body_idx))
    }

    /// Split a node into four children and move its bodies down.
    ///
    /// After this the node holds no bodies directly (barring the
    /// rounding case in `insert_at`) and its aggregate is recomputed from
    /// its children.
    fn subdivide(&mut self, node_idx: usize) {
        let bounds = self.nodes[node_idx].bounds;
        let depth = self.nodes[node_idx].depth;

        let first = self.nodes.len();
        for quad in bounds.quadrants() {
            self.nodes.push(QuadNode::new(quad, depth + 1));
        }

        let held = {
            let node = &mut self.nodes[node_idx];
            node.children = Some([first, first + 1, first + 2, first + 3]);
            node.own_mass = 0.0;
            node.own_moment = NVec2::zeros();
            std::mem::take(&mut node.bodies)
        };

        for body_idx in held {
            if !self.insert_into_children(node_idx, body_idx) {
                self.straddle(node_idx, body_idx);
            }
        }

        self.recompute_mass(node_idx);
    }

    fn straddle(&mut self, node_idx: usize, body_idx: usize) {
        warn_once!("body on a quadrant seam rejected by every child; kept in its parent");
        debug!("body {body_idx} kept in divided node {node_idx}");
        self.hold(node_idx, body_idx);
    }

    /// Store a body directly in a node and update its own-mass sums
    fn hold(&mut self, node_idx: usize, body_idx: usize) {
        let body = &self.bodies[body_idx];
        let node = &mut self.nodes[node_idx];
        node.bodies.push(body_idx);
        node.own_mass += body.m;
        node.own_moment += body.x * body.m;
    }

    /// Recompute `mass` and `com` of one node from its held bodies and the
    /// (already current) totals of its children.
    fn recompute_mass(&mut self, node_idx: usize) {
        let (mass, moment) = {
            let node = &self.nodes[node_idx];
            let mut mass = node.own_mass;
            let mut moment = node.own_moment;
            if let Some(children) = node.children {
                for child in children {
                    let c = &self.nodes[child];
                    mass += c.mass;
                    moment += c.com * c.mass;
                }
            }
            (mass, moment)
        };

        let node = &mut self.nodes[node_idx];
        node.mass = mass;
        node.com = if mass > 0.0 { moment / mass } else { NVec2::zeros() };
    }

    /// Recursive part of [`QuadTree::calculate_force`]
    #[allow(clippy::too_many_arguments)]
    fn force_from(&self, node_idx: usize, index: usize, pos: NVec2, m: f64, g: f64, eps2: f64, theta: f64) -> NVec2 {
        let node = &self.nodes[node_idx];

        // Skip empty nodes
        if node.mass == 0.0 {
            return NVec2::zeros();
        }

        let Some(children) = node.children else {
            // Leaf: exact interactions with whatever it holds
            return self.direct_sum(&node.bodies, index, pos, m, g, eps2);
        };

        let r = node.com - pos;
        let dist = r.norm();
        let s_over_d = if dist > 0.0 { node.bounds.size() / dist } else { f64::INFINITY };

        if s_over_d < theta && !node.bounds.contains(&pos) {
            // Far enough away: approximate this node as a single mass at COM
            return pair_force(r, m, node.mass, g, eps2);
        }

        // Too close: recurse into children
        let mut f = self.direct_sum(&node.bodies, index, pos, m, g, eps2);
        for child in children {
            f += self.force_from(child, index, pos, m, g, eps2, theta);
        }
        f
    }

    fn collect_neighbors(&self, node_idx: usize, pos: NVec2, radius: f64, found: &mut Vec<usize>) {
        let node = &self.nodes[node_idx];
        if !node.bounds.intersects_circle(&pos, radius) {
            return;
        }

        let r2 = radius * radius;
        found.extend(
            node.bodies
                .iter()
                .copied()
                .filter(|&j| (self.bodies[j].x - pos).norm_squared() < r2),
        );

        if let Some(children) = node.children {
            for child in children {
                self.collect_neighbors(child, pos, radius, found);
            }
        }
    }

    fn direct_sum(&self, held: &[usize], index: usize, pos: NVec2, m: f64, g: f64, eps2: f64) -> NVec2 {
        held.iter()
            .filter(|&&j| j != index)
            .map(|&j| {
                let other = &self.bodies[j];
                pair_force(other.x - pos, m, other.m, g, eps2)
            })
            .fold(NVec2::zeros(), |acc, f| acc + f)
    }
}

/// Softened Newtonian force on `m1` from `m2` displaced by `r`.
///
/// Zero for coincident positions; with zero softening that is the only
/// case where the formula would divide by zero.
#[inline]
pub fn pair_force(r: NVec2, m1: f64, m2: f64, g: f64, eps2: f64) -> NVec2 {
    let d2 = r.norm_squared();
    if d2 == 0.0 {
        return NVec2::zeros();
    }
    let d = d2.sqrt();
    let magnitude = g * m1 * m2 / (d2 + eps2);
    r * (magnitude / d)
}
