//! Planar vector helpers on top of nalgebra
//!
//! `NVec2` is the only vector type in the engine. nalgebra already gives it
//! the arithmetic operators (`+`, `-`, `* f64`, `dot`, `norm`), so the
//! [`PlanarVector`] trait only adds what gravity code needs on top:
//! - pure operations that return a new value (`safe_normalize`, `rotated`, ...)
//! - in-place operations that mutate the receiver and return `&mut Self`
//!   so calls can be chained (`v.translate(&dx).scale_by(0.5)`)
//!
//! Dividing by anything smaller than `f64::EPSILON` yields the zero vector
//! instead of NaN/inf. Each place this can happen logs a single warning.

use nalgebra::Vector2;

pub type NVec2 = Vector2<f64>;

/// Log a warning the first time this call site is reached, then stay quiet
macro_rules! warn_once {
    ($($arg:tt)+) => {{
        static WARNED: ::std::sync::atomic::AtomicBool = ::std::sync::atomic::AtomicBool::new(false);
        if !WARNED.swap(true, ::std::sync::atomic::Ordering::Relaxed) {
            ::log::warn!($($arg)+);
        }
    }};
}
pub(crate) use warn_once;

pub trait PlanarVector: Sized {
    /// Unit vector in the same direction, or zero for a degenerate vector
    fn safe_normalize(&self) -> Self;
    /// Divide by a scalar, or zero when `|s| < EPSILON`
    fn safe_div(&self, s: f64) -> Self;
    /// Rotate counter-clockwise by `angle` radians
    fn rotated(&self, angle: f64) -> Self;
    fn distance_to(&self, other: &Self) -> f64;
    fn distance_squared_to(&self, other: &Self) -> f64;
    /// Counter-clockwise perpendicular (-y, x)
    fn perpendicular(&self) -> Self;
    /// z component of the 3D cross product
    fn cross_z(&self, other: &Self) -> f64;

    fn translate(&mut self, other: &Self) -> &mut Self;
    fn retreat(&mut self, other: &Self) -> &mut Self;
    fn scale_by(&mut self, s: f64) -> &mut Self;
    fn normalize_in_place(&mut self) -> &mut Self;
    fn div_in_place(&mut self, s: f64) -> &mut Self;
    fn rotate_in_place(&mut self, angle: f64) -> &mut Self;
}

impl PlanarVector for NVec2 {
    fn safe_normalize(&self) -> Self {
        match self.try_normalize(f64::EPSILON) {
            Some(unit) => unit,
            None => {
                warn_once!("normalizing a near-zero vector ({}, {}), using zero", self.x, self.y);
                NVec2::zeros()
            }
        }
    }

    fn safe_div(&self, s: f64) -> Self {
        if s.abs() < f64::EPSILON {
            warn_once!("dividing a vector by near-zero scalar {s:e}, using zero");
            return NVec2::zeros();
        }
        self / s
    }

    fn rotated(&self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        NVec2::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    fn distance_to(&self, other: &Self) -> f64 {
        (other - self).norm()
    }

    fn distance_squared_to(&self, other: &Self) -> f64 {
        (other - self).norm_squared()
    }

    fn perpendicular(&self) -> Self {
        NVec2::new(-self.y, self.x)
    }

    fn cross_z(&self, other: &Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    fn translate(&mut self, other: &Self) -> &mut Self {
        *self += other;
        self
    }

    fn retreat(&mut self, other: &Self) -> &mut Self {
        *self -= other;
        self
    }

    fn scale_by(&mut self, s: f64) -> &mut Self {
        *self *= s;
        self
    }

    fn normalize_in_place(&mut self) -> &mut Self {
        let norm = self.norm();
        if norm < f64::EPSILON {
            warn_once!("normalizing a near-zero vector in place, using zero");
            *self = NVec2::zeros();
        } else {
            *self /= norm;
        }
        self
    }

    fn div_in_place(&mut self, s: f64) -> &mut Self {
        if s.abs() < f64::EPSILON {
            warn_once!("dividing a vector in place by near-zero scalar {s:e}, using zero");
            *self = NVec2::zeros();
        } else {
            *self /= s;
        }
        self
    }

    fn rotate_in_place(&mut self, angle: f64) -> &mut Self {
        *self = self.rotated(angle);
        self
    }
}
