//! Physical and numerical constants shared across the dynamical core.
//!
//! All values are SI. The thermodynamic constants follow the GFDL
//! convention (dry-air gas constant, dry kappa = RDGAS / CP_AIR).

/// Gravitational acceleration (m/s²).
pub const GRAV: f64 = 9.80665;

/// Dry-air gas constant (J/kg/K).
pub const RDGAS: f64 = 287.05;

/// Dry-air heat capacity at constant pressure (J/kg/K).
pub const CP_AIR: f64 = 1004.6;

/// Dry adiabatic exponent kappa = R_d / c_p.
pub const KAPPA: f64 = RDGAS / CP_AIR;

/// Reference surface pressure used by the hybrid vertical coordinate (Pa).
pub const P_REF: f64 = 1.0e5;

/// Coefficient applied to the minimum cell area when building the
/// hyperdiffusion damping coefficient for the dissipated-heat field.
pub const CNST_0P20: f64 = 0.2;

/// Sentinel for interface-pressure halo points that have never been
/// written. Large enough that any accidental read produces an obvious
/// overflow rather than a plausible value.
pub const HUGE_R: f64 = 1.0e40;

/// Smallest allowed (negative) layer thickness, in meters. The vertical
/// solvers clamp `delz` at this value so a layer can never collapse or
/// invert during the implicit update.
pub const DZ_MIN: f64 = 2.0;
