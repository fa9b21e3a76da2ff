//! Perfectly inelastic merging of close bodies
//!
//! Runs between ticks, never inside a force evaluation. The heavier body of
//! each close pair absorbs the lighter one (the earlier index wins ties):
//! - mass and momentum are conserved
//! - the position becomes the mass-weighted mean
//! - the radius becomes the cube root of the summed cubes (equal density)
//! - the survivor keeps its own trail
//!
//! The lighter body is removed from the vector, so the working set shrinks.
//!
//! Candidate pairs come from a quadtree query around each body's position at
//! the start of the pass. A survivor that moves into range of a body it was
//! not paired with merges on the next pass.

use log::debug;

use crate::simulation::barnes_hut::{QuadTree, DEFAULT_CAPACITY, DEFAULT_MAX_DEPTH};
use crate::simulation::forces::compute_bounds;
use crate::simulation::states::{Body, Trail};

/// Merge every pair closer than `threshold`, returning how many bodies were
/// absorbed. A non-positive threshold disables merging.
pub fn merge_close_bodies(bodies: &mut Vec<Body>, threshold: f64) -> usize {
    if !(threshold > 0.0) || bodies.len() < 2 {
        return 0;
    }

    let candidates = close_pairs(bodies, threshold);
    let t2 = threshold * threshold;
    let mut absorbed = vec![false; bodies.len()];
    let mut count = 0;

    for (i, partners) in candidates.iter().enumerate() {
        if absorbed[i] {
            continue;
        }
        for &j in partners {
            if absorbed[j] || absorbed[i] {
                continue;
            }
            if (bodies[j].x - bodies[i].x).norm_squared() >= t2 {
                continue;
            }

            let (keep, lose) = if bodies[i].m >= bodies[j].m { (i, j) } else { (j, i) };
            let lighter = bodies[lose].clone();
            absorb(&mut bodies[keep], &lighter);
            absorbed[lose] = true;
            count += 1;
            debug!("merged body {lose} into body {keep}, mass now {}", bodies[keep].m);
        }
    }

    if count > 0 {
        let mut flags = absorbed.into_iter();
        bodies.retain(|_| !flags.next().unwrap_or(false));
    }
    count
}

/// For each body, the later-indexed bodies within `threshold` of it, ascending
fn close_pairs(bodies: &[Body], threshold: f64) -> Vec<Vec<usize>> {
    let mut tree = QuadTree::new(bodies, compute_bounds(bodies), DEFAULT_CAPACITY, DEFAULT_MAX_DEPTH);
    for i in 0..bodies.len() {
        // Only non-finite positions miss the root, and those never merge
        tree.insert(i);
    }

    bodies
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let mut partners: Vec<usize> = tree
                .neighbors_within(b.x, threshold)
                .into_iter()
                .filter(|&j| j > i)
                .collect();
            partners.sort_unstable();
            partners
        })
        .collect()
}

fn absorb(survivor: &mut Body, other: &Body) {
    let m = survivor.m + other.m;
    survivor.v = (survivor.momentum() + other.momentum()) / m;
    survivor.x = (survivor.x * survivor.m + other.x * other.m) / m;
    survivor.radius = (survivor.radius.powi(3) + other.radius.powi(3)).cbrt();
    survivor.m = m;

    if other.trail.max_len() > survivor.trail.max_len() {
        let mut trail = Trail::new(other.trail.max_len());
        survivor.trail.iter().for_each(|p| trail.push(*p));
        survivor.trail = trail;
    }
    survivor.refresh_kinetic_energy();
}
