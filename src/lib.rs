//! # fv-rs
//!
//! A finite-volume acoustic dynamical core on a doubly-periodic
//! staggered tile.
//!
//! This crate provides the building blocks of the acoustic sub-stepped
//! integrator:
//! - Flat staggered field containers with signed halo indexing
//! - Monotone PPM finite-volume transport with flux-form damping
//! - C-grid half-step and D-grid full-step shallow-atmosphere updates
//! - Implicit vertical Riemann solvers and height updates
//! - Hydrostatic and nonhydrostatic pressure gradient forces
//! - Rayleigh sponge and hyperdiffusion heat dissipation
//! - A sub-step scheduler with overlapped halo exchange

pub mod constants;
pub mod csw;
pub mod damping;
pub mod dsw;
pub mod dyncore;
pub mod error;
pub mod exec;
pub mod field;
pub mod grid;
pub mod halo;
pub mod nh_p_grad;
pub mod riemann;
pub mod state;
pub mod stencils;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use csw::CGridUpdate;
pub use damping::{HyperdiffusionDamping, RayleighDamping, nk_heat_dissipation};
pub use dsw::DGridUpdate;
pub use dyncore::{AcousticConfig, AcousticDynamics, AcousticStats};
pub use error::{ConfigError, HaloError, StepError, TransportError};
pub use exec::StepMode;
pub use field::{ColumnK, Field2, Field3};
pub use grid::{DampingCoefficients, GridData, GridIndexing, sigma_coordinate};
pub use halo::{Communicator, ScalarExchange, TileCommunicator, VectorExchange};
pub use nh_p_grad::NonHydrostaticPressureGradient;
pub use riemann::{RiemannSolverC, RiemannSolverD, UpdateHeightOnCGrid, UpdateHeightOnDGrid};
pub use state::PrognosticState;
pub use transport::{DelnFlux, FiniteVolumeTransport, PpmOrder};
pub use types::{Levels, Staggering};
