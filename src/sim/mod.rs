//! Simulation domain: compartments, mesh, matrix assembly, loggers and the
//! engine that drives them.

pub mod compartment;
pub mod geometry;
pub mod logger;
pub mod matrix;
pub mod system;

pub use compartment::{Compartment, Sink, SinkKind};
pub use geometry::{DiscMethod, Geometry};
pub use logger::{MassLog, MassLogBinding, NodePosition, ProfileLog};
pub use matrix::{MatrixBuilder, Method};
pub use system::{NoHooks, RunHooks, RunStatus, System};
