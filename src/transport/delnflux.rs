//! Hyperdiffusive flux damper for the finite-volume transport operator.
//!
//! Adds del-2n damping fluxes to the advective fluxes of a scalar:
//! `nord` Laplacian sweeps over a scratch copy of the field, then the
//! gradient of the result is scaled by `(damp_c * da_min)^(nord + 1)`
//! and accumulated onto the x/y fluxes. When a mass field is supplied
//! the damping fluxes are mass-weighted so the damped quantity is the
//! per-mass mixing ratio rather than the per-area density.

use crate::error::ConfigError;
use crate::field::Field3;
use crate::grid::{DampingCoefficients, GridData, GridIndexing};

/// Damping flux operator, built once per transported quantity.
#[derive(Debug)]
pub struct DelnFlux {
    nord: usize,
    damp: f64,
    d2: Field3,
    gx: Field3,
    gy: Field3,
}

impl DelnFlux {
    /// `nord` is the number of Laplacian sweeps (0 gives plain del-2
    /// damping of the field itself); `damp_c` the nondimensional
    /// damping coefficient.
    pub fn new(
        idx: &GridIndexing,
        damping: &DampingCoefficients,
        nord: usize,
        damp_c: f64,
    ) -> Result<Self, ConfigError> {
        Self::new_on(idx, damping, nord, damp_c, crate::types::Levels::Layer)
    }

    /// As [`new`](Self::new), on the given vertical placement (height
    /// damping operates on interface levels).
    pub fn new_on(
        idx: &GridIndexing,
        damping: &DampingCoefficients,
        nord: usize,
        damp_c: f64,
        levels: crate::types::Levels,
    ) -> Result<Self, ConfigError> {
        // Each sweep consumes one halo ring; the final gradient one more.
        if nord + 1 > idx.n_halo {
            return Err(ConfigError::DomainTooSmall {
                nx: idx.nx,
                ny: idx.ny,
                n_halo: idx.n_halo,
            });
        }
        let damp = (damp_c * damping.da_min).powi(nord as i32 + 1);
        Ok(Self {
            nord,
            damp,
            d2: idx.field(crate::types::Staggering::Center, levels),
            gx: idx.field(crate::types::Staggering::XEdge, levels),
            gy: idx.field(crate::types::Staggering::YEdge, levels),
        })
    }

    /// Accumulate damping fluxes of `q` onto `fx`/`fy`. With `mass`
    /// the fluxes are weighted by the interface-mean mass.
    pub fn accumulate(
        &mut self,
        grid: &GridData,
        idx: &GridIndexing,
        q: &Field3,
        fx: &mut Field3,
        fy: &mut Field3,
        mass: Option<&Field3>,
    ) {
        let h = idx.n_halo as isize;
        let (nx, ny) = (idx.nx as isize, idx.ny as isize);
        for k in 0..self.d2.nz() {
            // Scratch copy; sweeps shrink the valid ring by one each.
            for i in idx.x_full() {
                for j in idx.y_full() {
                    self.d2[(i, j, k)] = q[(i, j, k)];
                }
            }
            let mut ring = h;
            for _ in 0..self.nord {
                ring -= 1;
                for i in -ring..nx + ring + 1 {
                    for j in -ring..ny + ring {
                        self.gx[(i, j, k)] = (self.d2[(i - 1, j, k)] - self.d2[(i, j, k)])
                            * grid.dy_edge[(i, j)]
                            * grid.rdxc[(i, j)];
                    }
                }
                for i in -ring..nx + ring {
                    for j in -ring..ny + ring + 1 {
                        self.gy[(i, j, k)] = (self.d2[(i, j - 1, k)] - self.d2[(i, j, k)])
                            * grid.dx_edge[(i, j)]
                            * grid.rdyc[(i, j)];
                    }
                }
                for i in -ring..nx + ring {
                    for j in -ring..ny + ring {
                        self.d2[(i, j, k)] = grid.rarea[(i, j)]
                            * (self.gx[(i, j, k)] - self.gx[(i + 1, j, k)] + self.gy[(i, j, k)]
                                - self.gy[(i, j + 1, k)]);
                    }
                }
            }
            // Final gradient on the compute interfaces, accumulated with
            // alternating sign so every sweep order damps.
            let sign = if self.nord % 2 == 0 { 1.0 } else { -1.0 };
            match mass {
                None => {
                    for i in 0..nx + 1 {
                        for j in 0..ny {
                            fx[(i, j, k)] += sign
                                * self.damp
                                * (self.d2[(i - 1, j, k)] - self.d2[(i, j, k)])
                                * grid.dy_edge[(i, j)]
                                * grid.rdxc[(i, j)];
                        }
                    }
                    for i in 0..nx {
                        for j in 0..ny + 1 {
                            fy[(i, j, k)] += sign
                                * self.damp
                                * (self.d2[(i, j - 1, k)] - self.d2[(i, j, k)])
                                * grid.dx_edge[(i, j)]
                                * grid.rdyc[(i, j)];
                        }
                    }
                }
                Some(m) => {
                    for i in 0..nx + 1 {
                        for j in 0..ny {
                            let mw = 0.5 * (m[(i - 1, j, k)] + m[(i, j, k)]);
                            fx[(i, j, k)] += sign
                                * self.damp
                                * mw
                                * (self.d2[(i - 1, j, k)] - self.d2[(i, j, k)])
                                * grid.dy_edge[(i, j)]
                                * grid.rdxc[(i, j)];
                        }
                    }
                    for i in 0..nx {
                        for j in 0..ny + 1 {
                            let mw = 0.5 * (m[(i, j - 1, k)] + m[(i, j, k)]);
                            fy[(i, j, k)] += sign
                                * self.damp
                                * mw
                                * (self.d2[(i, j - 1, k)] - self.d2[(i, j, k)])
                                * grid.dx_edge[(i, j)]
                                * grid.rdyc[(i, j)];
                        }
                    }
                }
            }
        }
    }
}
