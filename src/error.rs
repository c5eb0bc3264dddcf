//! Error types for the acoustic dynamical core.
//!
//! Configuration problems are fatal and surface at construction time;
//! the integration loop itself never raises recoverable errors (numerical
//! instability manifests as NaN and is a bug, not an error condition).

use thiserror::Error;

/// Fatal configuration errors, raised when the scheduler or one of its
/// stages is constructed. None of these are retried or degraded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// External-mode damping is not implemented.
    #[error("d_ext != 0 is not implemented (got {0})")]
    DExtNotImplemented(f64),

    /// Time-extrapolated pressure gradient is not implemented.
    #[error("beta != 0 is not implemented (got {0})")]
    BetaNotImplemented(f64),

    /// Log-pressure vertical coordinate is not implemented.
    #[error("use_logp=true is not implemented")]
    UseLogpNotImplemented,

    /// Unsupported reconstruction order for the transport operator.
    #[error("unsupported reconstruction order hord={0} (supported: 1, 5, 6, 8, 10)")]
    UnsupportedHord(i32),

    /// The interior transport variant only supports hord=8.
    #[error("interior transport variant requires hord=8, got hord={0}")]
    InteriorHordUnsupported(i32),

    /// Sub-step count must be positive.
    #[error("n_split must be >= 1, got {0}")]
    InvalidSplit(i32),

    /// Domain too small for the requested halo width.
    #[error("compute domain {nx}x{ny} too small for halo width {n_halo}")]
    DomainTooSmall { nx: usize, ny: usize, n_halo: usize },

    /// The column solvers extrapolate across the bottom two layers.
    #[error("npz must be >= 2, got {0}")]
    TooFewLayers(usize),
}

/// Transport-operator misuse, raised on call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Flux damping of a per-mass quantity needs the mass field.
    #[error("when damping is enabled, mass must be given if mass flux is given")]
    MassFluxWithoutMass,
}

/// Failures surfaced by the sub-step scheduler. Both variants indicate
/// caller or sequencing bugs; the integration itself does not fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error(transparent)]
    Halo(#[from] HaloError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Halo exchange protocol violations. These indicate a sequencing bug in
/// the caller, not a communication failure (communication failures are
/// the responsibility of the external exchange service).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HaloError {
    /// `start` called while a previous exchange on this updater is
    /// still in flight.
    #[error("halo exchange '{0}' started twice without an intervening wait")]
    AlreadyStarted(&'static str),

    /// `wait` called with no exchange in flight.
    #[error("halo exchange '{0}' waited on without a matching start")]
    NotStarted(&'static str),

    /// The fields passed to `wait` do not match the fields passed to
    /// `start`.
    #[error("halo exchange '{name}': field count mismatch (started {started}, waited {waited})")]
    FieldMismatch {
        name: &'static str,
        started: usize,
        waited: usize,
    },
}
