//! Transient one-dimensional diffusion through a stack of material
//! compartments, targeted at skin permeation: a dosed vehicle on top of
//! one or more membrane layers draining into a perfect sink or a
//! pharmacokinetic elimination compartment.
//!
//! The diffusion equation is discretized on an equidistant or
//! geometrically refined mesh and advanced with an implicit
//! Crank–Nicolson scheme on a tridiagonal system solved by a cached-LU
//! Thomas algorithm.
//!
//! Typical usage goes through a validated [`params::Params`] snapshot and
//! the [`sim::System`] engine:
//!
//! ```no_run
//! use permea::io::json;
//! use permea::sim::{NoHooks, System};
//!
//! let params = json::parse_file(std::path::Path::new("config.json"))?;
//! let mut system = System::new(&params)?;
//! system.run(&mut NoHooks);
//! system.write_logs()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod io;
pub mod num;
pub mod params;
pub mod progress;
pub mod sim;

// Prelude
pub use params::Params;
pub use sim::system::{RunStatus, System};
