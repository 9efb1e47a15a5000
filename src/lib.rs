//! A 3D FLIP (Fluid-Implicit-Particle) fluid solver on a MAC grid, with
//! density-corrected pressure projection, staffed by a multithreaded CPU
//! backend rather than a GPU compute pipeline.
//!
//! The crate exposes a single entry point, [`solver::FlipSolver`], whose
//! `reset`/`step` pair implement the twelve-stage per-frame pipeline:
//! grid/kernel utilities, fixed-point atomic scatter, particle-to-grid
//! transfer, cell marking, normalisation and snapshot, external forces,
//! boundary enforcement, density-corrected divergence, the pressure
//! Poisson solve, pressure projection, and grid-to-particle advection.

pub mod advect;
pub mod boundary;
pub mod config;
pub mod error;
pub mod fields;
pub mod fixed_point;
pub mod forces;
pub mod grid;
pub mod particles;
pub mod pressure;
pub mod solver;
pub mod transfer;

pub use config::{MouseInput, PressureScheme, SolverConfig, StepInputs, StepReport};
pub use error::{SolverError, SolverResult};
pub use particles::{Particle, SpawnBox};
pub use solver::FlipSolver;
