//! Horizontal finite-volume transport.
//!
//! The 2D operator ([`FiniteVolumeTransport`]) is built from two 1D
//! piecewise-parabolic sweeps per direction plus an optional
//! hyperdiffusive flux damper ([`DelnFlux`]).

pub mod delnflux;
pub mod fvtp2d;
pub mod ppm;

pub use delnflux::DelnFlux;
pub use fvtp2d::{CopiedCorners, FiniteVolumeTransport};
pub use ppm::PpmOrder;
