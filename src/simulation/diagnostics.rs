//! Conservation diagnostics
//!
//! Energy, momentum and angular momentum of a set of bodies. The scenario
//! driver samples these every few steps and warns when the energy drifts.
//!
//! The potential is the one whose gradient is the softened force used by
//! the gravity providers, `F(d) = G m1 m2 / (d² + ε²)`:
//!
//! ```text
//! U(d) = -(G m1 m2 / ε) (π/2 - atan(d / ε))     ε > 0
//! U(d) = -G m1 m2 / d                            ε = 0
//! ```
//! so symplectic schemes conserve `total` up to their usual bounded error.

use std::f64::consts::FRAC_PI_2;

use crate::simulation::states::Body;
use crate::simulation::vector::{NVec2, PlanarVector};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyReport {
    pub kinetic: f64,
    pub potential: f64,
    pub total: f64,
}

/// Kinetic plus pairwise potential energy
pub fn system_energy(bodies: &[Body], g: f64, softening: f64) -> EnergyReport {
    let kinetic: f64 = bodies.iter().map(Body::kinetic_energy).sum();

    let mut potential = 0.0;
    for (i, a) in bodies.iter().enumerate() {
        for b in &bodies[i + 1..] {
            potential += pair_potential(a.x.distance_to(&b.x), a.m, b.m, g, softening);
        }
    }

    EnergyReport {
        kinetic,
        potential,
        total: kinetic + potential,
    }
}

fn pair_potential(d: f64, m1: f64, m2: f64, g: f64, softening: f64) -> f64 {
    if softening > 0.0 {
        -(g * m1 * m2 / softening) * (FRAC_PI_2 - (d / softening).atan())
    } else if d > 0.0 {
        -g * m1 * m2 / d
    } else {
        // Coincident and unsoftened: the force law treats this pair as inert
        0.0
    }
}

pub fn total_momentum(bodies: &[Body]) -> NVec2 {
    bodies.iter().map(Body::momentum).sum()
}

/// z component about the origin
pub fn total_angular_momentum(bodies: &[Body]) -> f64 {
    bodies.iter().map(Body::angular_momentum).sum()
}

/// Mass-weighted mean position, zero for an empty or massless set
pub fn center_of_mass(bodies: &[Body]) -> NVec2 {
    let mass: f64 = bodies.iter().map(|b| b.m).sum();
    let moment: NVec2 = bodies.iter().map(|b| b.x * b.m).sum();
    moment.safe_div(mass)
}

/// |current - initial| / |initial|, or the absolute change when `initial` is 0
pub fn relative_drift(initial: f64, current: f64) -> f64 {
    let delta = (current - initial).abs();
    if initial == 0.0 {
        delta
    } else {
        delta / initial.abs()
    }
}
