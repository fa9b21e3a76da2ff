//! Error type shared by the engine
//!
//! Numeric degradation (near-zero divides, depth-limited tree cells) is
//! logged, not raised. The variants here are the conditions a caller has
//! to react to: bad input, a broken tree invariant, an adaptive step that
//! never converged, or a scenario file that could not be read.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A body violates a precondition (mass must be positive and finite,
    /// position and velocity must be finite)
    #[error("body {index} is invalid: {reason}")]
    InvalidBody { index: usize, reason: String },

    /// Tree insertion rejected a body the root bounds were built from
    #[error("body {index} at ({x}, {y}) lies outside the tree bounds")]
    BodyOutOfBounds { index: usize, x: f64, y: f64 },

    /// Adaptive RK4 ran out of retries or hit the timestep floor
    #[error("adaptive step failed to converge after {attempts} attempts (dt = {dt:e}, error = {error:e}, tolerance = {tolerance:e})")]
    ConvergenceFailure {
        attempts: usize,
        dt: f64,
        error: f64,
        tolerance: f64,
    },

    /// A scenario parameter is out of range (step size, end time, theta, ...)
    #[error("parameter `{name}` has invalid value {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("invalid scenario configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("could not read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
