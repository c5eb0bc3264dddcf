//! Damping stages: hyperdiffusive heat-source smoothing applied once
//! per remap step, and the fast Rayleigh sponge applied every sub-step.

use crate::field::{ColumnK, Field3};
use crate::grid::{GridData, GridIndexing};

/// Number of top levels over which dissipated kinetic energy is
/// redistributed into potential temperature.
///
/// Full column when convective energy conversion is on or the
/// fourth-order damping coefficient is significant; otherwise 0, 1 or 2
/// levels from two successively weaker background-diffusion cutoffs.
/// The `1e-4`/`1e-3` thresholds are preserved verbatim from the
/// reference configuration; they have no documented derivation.
pub fn nk_heat_dissipation(
    convert_ke: bool,
    vtdm4: f64,
    d2_bg_k1: f64,
    d2_bg_k2: f64,
    npz: usize,
) -> usize {
    if convert_ke || vtdm4 > 1.0e-4 {
        npz
    } else if d2_bg_k1 < 1.0e-3 {
        0
    } else if d2_bg_k2 < 1.0e-3 {
        1
    } else {
        2
    }
}

/// Repeated-Laplacian smoother for the accumulated heat source
/// (del-2 applied `ntimes` times, coefficient proportional to the
/// minimum cell area).
pub struct HyperdiffusionDamping {
    ntimes: usize,
    cd: f64,
    fx: Field3,
    fy: Field3,
}

impl HyperdiffusionDamping {
    /// `nf_ke` smoothing passes with coefficient `cd` (m²).
    pub fn new(idx: &GridIndexing, nf_ke: usize, cd: f64) -> Self {
        Self {
            ntimes: nf_ke.min(idx.n_halo),
            cd,
            fx: idx.field(crate::types::Staggering::XEdge, crate::types::Levels::Layer),
            fy: idx.field(crate::types::Staggering::YEdge, crate::types::Levels::Layer),
        }
    }

    /// Smooth `q` in place over the compute domain. The halo of `q`
    /// must be current; each pass consumes one ring, so the passes run
    /// over successively narrower extents.
    pub fn apply(&mut self, idx: &GridIndexing, grid: &GridData, q: &mut Field3) {
        let (nx, ny) = (idx.nx as isize, idx.ny as isize);
        for t in 0..self.ntimes {
            let ring = (self.ntimes - 1 - t) as isize;
            for k in 0..idx.npz {
                for i in -ring..nx + ring + 1 {
                    for j in -ring..ny + ring {
                        self.fx[(i, j, k)] = (q[(i - 1, j, k)] - q[(i, j, k)])
                            * grid.dy_edge[(i, j)]
                            * grid.rdxc[(i, j)];
                    }
                }
                for i in -ring..nx + ring {
                    for j in -ring..ny + ring + 1 {
                        self.fy[(i, j, k)] = (q[(i, j - 1, k)] - q[(i, j, k)])
                            * grid.dx_edge[(i, j)]
                            * grid.rdyc[(i, j)];
                    }
                }
                for i in -ring..nx + ring {
                    for j in -ring..ny + ring {
                        q[(i, j, k)] += self.cd
                            * grid.rarea[(i, j)]
                            * (self.fx[(i, j, k)] - self.fx[(i + 1, j, k)] + self.fy[(i, j, k)]
                                - self.fy[(i, j + 1, k)]);
                    }
                }
            }
        }
    }
}

/// Fast Rayleigh sponge: per-level relaxation of the winds toward rest
/// in the low-pressure levels above `rf_cutoff`, applied every
/// sub-step. The per-level multiplier is computed once at construction
/// from the reference pressure column.
pub struct RayleighDamping {
    /// `1 / (1 + dmu)` per level; 1.0 below the cutoff.
    rf: Vec<f64>,
    /// Index of the first level at or below the cutoff.
    k_max: usize,
}

impl RayleighDamping {
    /// `dt` is the sub-step length, `tau` the damping timescale (s),
    /// `rf_cutoff` the pressure (Pa) below which damping activates.
    pub fn new(dt: f64, tau: f64, rf_cutoff: f64, ptop: f64, pfull: &ColumnK) -> Self {
        let npz = pfull.len();
        let mut rf = vec![1.0; npz];
        let mut k_max = 0;
        for k in 0..npz {
            if pfull[k] < rf_cutoff {
                let arg = 0.5 * std::f64::consts::PI * (rf_cutoff / pfull[k]).ln()
                    / (rf_cutoff / ptop).ln();
                let dmu = dt / tau * arg.sin().powi(2);
                rf[k] = 1.0 / (1.0 + dmu);
                k_max = k + 1;
            }
        }
        Self { rf, k_max }
    }

    /// Number of damped levels (for logging and tests).
    pub fn damped_levels(&self) -> usize {
        self.k_max
    }

    /// Relax `u`, `v` and (nonhydrostatic) `w` toward rest.
    pub fn apply(&self, idx: &GridIndexing, u: &mut Field3, v: &mut Field3, w: Option<&mut Field3>) {
        for k in 0..self.k_max {
            let rf = self.rf[k];
            for i in idx.x_range(0, 0) {
                for j in idx.y_range(0, 1) {
                    u[(i, j, k)] *= rf;
                }
            }
            for i in idx.x_range(0, 1) {
                for j in idx.y_range(0, 0) {
                    v[(i, j, k)] *= rf;
                }
            }
        }
        if let Some(w) = w {
            for k in 0..self.k_max {
                let rf = self.rf[k];
                for i in idx.x_range(0, 0) {
                    for j in idx.y_range(0, 0) {
                        w[(i, j, k)] *= rf;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{sigma_coordinate, DampingCoefficients, GridData};
    use crate::types::{Levels, Staggering};

    #[test]
    fn heat_dissipation_level_policy() {
        let npz = 30;
        assert_eq!(nk_heat_dissipation(true, 0.0, 0.1, 0.1, npz), npz);
        assert_eq!(nk_heat_dissipation(false, 2.0e-4, 0.1, 0.1, npz), npz);
        assert_eq!(nk_heat_dissipation(false, 0.0, 1.0e-4, 0.1, npz), 0);
        assert_eq!(nk_heat_dissipation(false, 0.0, 0.1, 1.0e-4, npz), 1);
        assert_eq!(nk_heat_dissipation(false, 0.0, 0.1, 0.1, npz), 2);
    }

    #[test]
    fn smoothing_conserves_the_interior_sum_on_a_flat_halo() {
        // With a constant halo the Laplacian fluxes cancel in the
        // interior sum except at the compute boundary; use a fully
        // constant field to check the no-op case exactly.
        let idx = GridIndexing::new(6, 6, 2, 3).unwrap();
        let (ak, bk) = sigma_coordinate(2, 100.0);
        let grid = GridData::uniform(&idx, 1.0e3, 1.0e3, 0.0, ak, bk);
        let damping = DampingCoefficients::uniform(1.0e3, 1.0e3);
        let mut q = idx.field(Staggering::Center, Levels::Layer);
        q.fill(7.0);
        let mut op = HyperdiffusionDamping::new(&idx, 3, 0.2 * damping.da_min);
        op.apply(&idx, &grid, &mut q);
        assert_eq!(q.interior_sum(0), 7.0 * 36.0);
    }

    #[test]
    fn smoothing_reduces_a_spike() {
        let idx = GridIndexing::new(6, 6, 2, 3).unwrap();
        let (ak, bk) = sigma_coordinate(2, 100.0);
        let grid = GridData::uniform(&idx, 1.0e3, 1.0e3, 0.0, ak, bk);
        let mut q = idx.field(Staggering::Center, Levels::Layer);
        q[(3, 3, 0)] = 10.0;
        let mut op = HyperdiffusionDamping::new(&idx, 2, 0.2 * 1.0e6);
        op.apply(&idx, &grid, &mut q);
        assert!(q[(3, 3, 0)] < 10.0);
        assert!(q[(2, 3, 0)] > 0.0);
    }

    #[test]
    fn rayleigh_damps_only_above_the_cutoff() {
        let npz = 6;
        let mut pfull = ColumnK::zeros(npz);
        for k in 0..npz {
            pfull[k] = 100.0 * 10.0_f64.powi(k as i32 / 2 + 1);
        }
        // Cutoff between levels: only the low-pressure top is damped.
        let rd = RayleighDamping::new(10.0, 60.0, 5.0e3, 100.0, &pfull);
        assert!(rd.damped_levels() >= 1 && rd.damped_levels() < npz);
        let idx = GridIndexing::new(4, 4, npz, 3).unwrap();
        let mut u = idx.field(Staggering::YEdge, Levels::Layer);
        let mut v = idx.field(Staggering::XEdge, Levels::Layer);
        u.fill(10.0);
        v.fill(10.0);
        let kd = rd.damped_levels();
        rd.apply(&idx, &mut u, &mut v, None);
        assert!(u[(0, 0, 0)] < 10.0);
        assert_eq!(u[(0, 0, kd)], 10.0);
    }
}
