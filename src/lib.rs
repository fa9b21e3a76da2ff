pub mod error;
pub mod simulation;
pub mod configuration;
pub mod benchmark;

pub use error::SimError;

pub use simulation::vector::{NVec2, PlanarVector};
pub use simulation::states::{Body, System, Trail};
pub use simulation::barnes_hut::{pair_force, QuadNode, QuadTree, Rect};
pub use simulation::forces::{compute_bounds, BarnesHutGravity, DirectGravity, ForceProvider, ForceSet};
pub use simulation::integrator::{Integrator, Scheme, StepReport};
pub use simulation::collisions::merge_close_bodies;
pub use simulation::diagnostics::{center_of_mass, relative_drift, system_energy, total_angular_momentum, total_momentum, EnergyReport};
pub use simulation::engine::Engine;
pub use simulation::params::Parameters;
pub use simulation::scenario::{RunSummary, Scenario};

pub use configuration::config::{BodyConfig, EngineConfig, ParametersConfig, ScenarioConfig};

pub use benchmark::benchmark::{bench_gravity, bench_integrators};
