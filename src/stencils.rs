//! Elementwise kernels consumed by the sub-step scheduler.
//!
//! Each kernel is a plain loop over an explicit index range derived
//! from [`GridIndexing`]; points within one kernel are independent, so
//! the execution order inside a kernel carries no meaning (only the
//! ordering *between* kernels, via their shared buffers, does).

use crate::constants::{CP_AIR, GRAV, KAPPA, P_REF, RDGAS};
use crate::field::{ColumnK, Field2, Field3};
use crate::grid::GridIndexing;

/// Zero the mass-flux and Courant-number accumulators over the full
/// domain; on the first remap step of a physics step, also zero the
/// heat-source and dissipation-estimate accumulators over the compute
/// interior.
#[allow(clippy::too_many_arguments)]
pub fn zero_accumulators(
    idx: &GridIndexing,
    mfxd: &mut Field3,
    mfyd: &mut Field3,
    cxd: &mut Field3,
    cyd: &mut Field3,
    heat_source: &mut Field3,
    diss_est: &mut Field3,
    first_timestep: bool,
) {
    mfxd.fill(0.0);
    mfyd.fill(0.0);
    cxd.fill(0.0);
    cyd.fill(0.0);
    if first_timestep {
        for i in idx.x_range(0, 0) {
            for j in idx.y_range(0, 0) {
                for k in 0..idx.npz {
                    heat_source[(i, j, k)] = 0.0;
                    diss_est[(i, j, k)] = 0.0;
                }
            }
        }
    }
}

/// Reference pressure-thickness column from the hybrid coordinate, and
/// surface height from the surface geopotential. Both are invariant for
/// the whole remap step; computed once on the first sub-step.
pub fn dp_ref_compute(ak: &ColumnK, bk: &ColumnK, phis: &Field2) -> (ColumnK, Field2) {
    let npz = ak.len() - 1;
    let mut dp_ref = ColumnK::zeros(npz);
    for k in 0..npz {
        dp_ref[k] = ak[k + 1] - ak[k] + (bk[k + 1] - bk[k]) * 1.0e5;
    }
    let mut zs = phis.clone();
    zs.assign(|i, j| phis[(i, j)] / GRAV);
    (dp_ref, zs)
}

/// Seed the geopotential height from the surface upward:
/// `gz[npz] = zs`, `gz[k] = gz[k+1] - delz[k]` (delz is negative).
pub fn set_gz(idx: &GridIndexing, zs: &Field2, delz: &Field3, gz: &mut Field3) {
    let npz = idx.npz;
    for i in idx.x_range(0, 0) {
        for j in idx.y_range(0, 0) {
            gz[(i, j, npz)] = zs[(i, j)];
            for k in (0..npz).rev() {
                gz[(i, j, k)] = gz[(i, j, k + 1)] - delz[(i, j, k)];
            }
        }
    }
}

/// Hydrostatic interface pressure integrated downward from the model
/// top, over the compute domain widened by one halo cell.
pub fn set_pem(idx: &GridIndexing, delp: &Field3, pem: &mut Field3, ptop: f64) {
    for i in idx.x_range(1, 1) {
        for j in idx.y_range(1, 1) {
            pem[(i, j, 0)] = ptop;
            for k in 0..idx.npz {
                pem[(i, j, k + 1)] = pem[(i, j, k)] + delp[(i, j, k)];
            }
        }
    }
}

/// Convert height to geopotential over the compute domain widened by
/// two halo cells (the pressure-gradient stencils read that far).
pub fn geopotential_from_height(idx: &GridIndexing, zh: &Field3, gz: &mut Field3) {
    for i in idx.x_range(2, 2) {
        for j in idx.y_range(2, 2) {
            for k in 0..=idx.npz {
                gz[(i, j, k)] = zh[(i, j, k)] * GRAV;
            }
        }
    }
}

/// Complete the C-grid wind update with the pressure gradient force.
///
/// When this runs, the momentum-equation terms have already advanced
/// `uc`/`vc`; applying this finite difference of height (meters, hence
/// the gravity factor) against interface pressure finishes the
/// half-step advance. In hydrostatic mode the vertical pressure
/// difference substitutes for `delpc`.
#[allow(clippy::too_many_arguments)]
pub fn p_grad_c(
    idx: &GridIndexing,
    rdxc: &Field2,
    rdyc: &Field2,
    uc: &mut Field3,
    vc: &mut Field3,
    delpc: &Field3,
    pkc: &Field3,
    gz: &Field3,
    dt2: f64,
    hydrostatic: bool,
) {
    let wk = |pkc: &Field3, delpc: &Field3, i: isize, j: isize, k: usize| -> f64 {
        if hydrostatic {
            pkc[(i, j, k + 1)] - pkc[(i, j, k)]
        } else {
            delpc[(i, j, k)]
        }
    };
    for i in idx.x_range(0, 1) {
        for j in idx.y_range(0, 1) {
            for k in 0..idx.npz {
                let wk0 = wk(pkc, delpc, i, j, k);
                let wx = wk(pkc, delpc, i - 1, j, k);
                uc[(i, j, k)] += dt2 * GRAV * rdxc[(i, j)] / (wx + wk0)
                    * ((gz[(i - 1, j, k + 1)] - gz[(i, j, k)])
                        * (pkc[(i, j, k + 1)] - pkc[(i - 1, j, k)])
                        + (gz[(i - 1, j, k)] - gz[(i, j, k + 1)])
                            * (pkc[(i - 1, j, k + 1)] - pkc[(i, j, k)]));
                let wy = wk(pkc, delpc, i, j - 1, k);
                vc[(i, j, k)] += dt2 * GRAV * rdyc[(i, j)] / (wy + wk0)
                    * ((gz[(i, j - 1, k + 1)] - gz[(i, j, k)])
                        * (pkc[(i, j, k + 1)] - pkc[(i, j - 1, k)])
                        + (gz[(i, j - 1, k)] - gz[(i, j, k + 1)])
                            * (pkc[(i, j - 1, k + 1)] - pkc[(i, j, k)]));
            }
        }
    }
}

/// Hydrostatic interface state for the C-grid pressure gradient when no
/// elastic solve runs: `pkc` from downward pressure integration of the
/// provisional thicknesses, `gz` (meters) from upward integration of
/// the Exner increments. Covers the same one-cell-widened domain the
/// elastic solver writes.
pub fn hydrostatic_interface_state(
    idx: &GridIndexing,
    zs: &Field2,
    delpc: &Field3,
    ptc: &Field3,
    ptop: f64,
    pkc: &mut Field3,
    gz: &mut Field3,
) {
    let npz = idx.npz;
    let rexner = 1.0 / (P_REF.powf(KAPPA) * GRAV);
    for i in idx.x_range(1, 1) {
        for j in idx.y_range(1, 1) {
            let mut pe = ptop;
            pkc[(i, j, 0)] = pe.powf(KAPPA);
            for k in 0..npz {
                pe += delpc[(i, j, k)];
                pkc[(i, j, k + 1)] = pe.powf(KAPPA);
            }
            gz[(i, j, npz)] = zs[(i, j)];
            for k in (0..npz).rev() {
                gz[(i, j, k)] = gz[(i, j, k + 1)]
                    + CP_AIR * ptc[(i, j, k)] * (pkc[(i, j, k + 1)] - pkc[(i, j, k)]) * rexner;
            }
        }
    }
}

#[inline]
fn in_halo_ring(idx: &GridIndexing, i: isize, j: isize, depth: isize) -> bool {
    let inside_wide = i >= -depth
        && i < idx.nx as isize + depth
        && j >= -depth
        && j < idx.ny as isize + depth;
    let inside_compute =
        i >= 0 && i < idx.nx as isize && j >= 0 && j < idx.ny as isize;
    inside_wide && !inside_compute
}

/// Recompute the true interface pressure in a 1-deep halo ring by
/// integrating `delp` down from the model top. Needed on the remap
/// sub-step because the Riemann solver only writes `pe` on the compute
/// interior.
pub fn edge_pe(idx: &GridIndexing, pe: &mut Field3, delp: &Field3, ptop: f64) {
    let h = idx.n_halo as isize;
    for i in idx.x_range(h, h) {
        for j in idx.y_range(h, h) {
            if !in_halo_ring(idx, i, j, 1) {
                continue;
            }
            pe[(i, j, 0)] = ptop;
            for k in 0..idx.npz {
                pe[(i, j, k + 1)] = pe[(i, j, k)] + delp[(i, j, k)];
            }
        }
    }
}

/// Recompute interface pressure to the kappa in a 2-deep halo ring:
/// `pk3 = pe^KAPPA` with `pe` integrated from `ptop`. The D-grid
/// pressure-gradient stencil reads `pk3` that far into the halo.
pub fn pk3_halo(idx: &GridIndexing, pk3: &mut Field3, delp: &Field3, ptop: f64, akap: f64) {
    let h = idx.n_halo as isize;
    for i in idx.x_range(h, h) {
        for j in idx.y_range(h, h) {
            if !in_halo_ring(idx, i, j, 2) {
                continue;
            }
            let mut pet = ptop;
            pk3[(i, j, 0)] = pet.powf(akap);
            for k in 0..idx.npz {
                pet += delp[(i, j, k)];
                pk3[(i, j, k + 1)] = pet.powf(akap);
            }
        }
    }
}

/// Convert smoothed dissipated kinetic energy into a potential
/// temperature adjustment over the top `nk` levels. The per-cell
/// temperature increment is capped at `delt_time_factor` in either
/// direction before being converted to potential temperature with the
/// local Exner-like factor.
#[allow(clippy::too_many_arguments)]
pub fn temperature_adjust(
    idx: &GridIndexing,
    delp: &Field3,
    delz: &Field3,
    cappa: &Field3,
    heat_source: &Field3,
    pt: &mut Field3,
    delt_time_factor: f64,
    nk: usize,
) {
    for i in idx.x_range(0, 0) {
        for j in idx.y_range(0, 0) {
            for k in 0..nk.min(idx.npz) {
                let cap = cappa[(i, j, k)];
                // Layer pressure from the equation of state; delz < 0.
                let rho_rt = -RDGAS / GRAV * delp[(i, j, k)] / delz[(i, j, k)] * pt[(i, j, k)];
                let pkz = (cap * rho_rt.ln()).exp();
                let dtmp = heat_source[(i, j, k)] / (crate::constants::CP_AIR * delp[(i, j, k)]);
                let dtmp = dtmp.clamp(-delt_time_factor, delt_time_factor);
                pt[(i, j, k)] += dtmp / pkz;
            }
        }
    }
}

/// Copy one field into another over the full domain, halo included.
pub fn copy_field(src: &Field3, dst: &mut Field3) {
    debug_assert_eq!(src.extents(), dst.extents());
    debug_assert_eq!(src.nz(), dst.nz());
    dst.as_mut_slice().copy_from_slice(src.as_slice());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::sigma_coordinate;
    use crate::types::{Levels, Staggering};

    fn idx() -> GridIndexing {
        GridIndexing::new(4, 4, 3, 3).unwrap()
    }

    #[test]
    fn dp_ref_matches_hybrid_coordinate() {
        let (ak, bk) = sigma_coordinate(3, 100.0);
        let phis = {
            let mut f = Field2::zeros(4, 4, 3);
            f.fill(981.0);
            f
        };
        let (dp_ref, zs) = dp_ref_compute(&ak, &bk, &phis);
        // Uniform sigma: each layer gets a third of (1e5 - ptop) from bk
        // plus the ak decrement.
        let expect = (100.0 * (-1.0 / 3.0)) + (1.0 / 3.0) * 1.0e5;
        for k in 0..3 {
            assert!((dp_ref[k] - expect).abs() < 1e-9);
        }
        assert!((zs[(0, 0)] - 981.0 / GRAV).abs() < 1e-12);
    }

    #[test]
    fn set_gz_integrates_thickness() {
        let idx = idx();
        let mut zs = Field2::zeros(4, 4, 3);
        zs.fill(10.0);
        let mut delz = idx.field(Staggering::Center, Levels::Layer);
        delz.fill(-100.0);
        let mut gz = idx.field(Staggering::Center, Levels::Interface);
        set_gz(&idx, &zs, &delz, &mut gz);
        assert_eq!(gz[(0, 0, 3)], 10.0);
        assert_eq!(gz[(0, 0, 2)], 110.0);
        assert_eq!(gz[(0, 0, 0)], 310.0);
    }

    #[test]
    fn set_pem_integrates_pressure() {
        let idx = idx();
        let mut delp = idx.field(Staggering::Center, Levels::Layer);
        delp.fill(1000.0);
        let mut pem = idx.field(Staggering::Center, Levels::Interface);
        set_pem(&idx, &delp, &mut pem, 100.0);
        assert_eq!(pem[(0, 0, 0)], 100.0);
        assert_eq!(pem[(3, 3, 3)], 3100.0);
        // Widened by one halo cell.
        assert_eq!(pem[(-1, 4, 3)], 3100.0);
    }

    #[test]
    fn p_grad_c_zero_for_flat_state() {
        // Uniform pressure and flat height: no pressure gradient force.
        let idx = idx();
        let mut rdxc = Field2::zeros(4, 4, 3);
        rdxc.fill(1e-3);
        let rdyc = rdxc.clone();
        let mut uc = idx.field(Staggering::XEdge, Levels::Layer);
        let mut vc = idx.field(Staggering::YEdge, Levels::Layer);
        let mut delpc = idx.field(Staggering::Center, Levels::Layer);
        delpc.fill(1000.0);
        let mut pkc = idx.field(Staggering::Center, Levels::Interface);
        pkc.assign(|_, _, k| 100.0 + 1000.0 * k as f64);
        let mut gz = idx.field(Staggering::Center, Levels::Interface);
        gz.assign(|_, _, k| 300.0 - 100.0 * k as f64);
        p_grad_c(
            &idx, &rdxc, &rdyc, &mut uc, &mut vc, &delpc, &pkc, &gz, 10.0, false,
        );
        assert!(uc.max_abs() < 1e-12);
        assert!(vc.max_abs() < 1e-12);
    }

    #[test]
    fn hydrostatic_interface_state_is_uniform_for_uniform_columns() {
        let idx = idx();
        let mut zs = Field2::zeros(4, 4, 3);
        zs.fill(5.0);
        let mut delpc = idx.field(Staggering::Center, Levels::Layer);
        delpc.fill(1000.0);
        let mut ptc = idx.field(Staggering::Center, Levels::Layer);
        ptc.fill(300.0);
        let mut pkc = idx.field(Staggering::Center, Levels::Interface);
        let mut gz = idx.field(Staggering::Center, Levels::Interface);
        hydrostatic_interface_state(&idx, &zs, &delpc, &ptc, 100.0, &mut pkc, &mut gz);
        assert_eq!(pkc[(0, 0, 0)], 100.0_f64.powf(KAPPA));
        assert!((pkc[(2, 2, 3)] - 3100.0_f64.powf(KAPPA)).abs() < 1e-12);
        // Heights grow upward and match across columns.
        assert!(gz[(0, 0, 0)] > gz[(0, 0, 3)]);
        assert_eq!(gz[(1, 2, 1)], gz[(-1, -1, 1)]);
    }

    #[test]
    fn pk3_halo_leaves_interior_alone() {
        let idx = idx();
        let mut pk3 = idx.field(Staggering::Center, Levels::Interface);
        pk3.fill(crate::constants::HUGE_R);
        let mut delp = idx.field(Staggering::Center, Levels::Layer);
        delp.fill(1000.0);
        pk3_halo(&idx, &mut pk3, &delp, 100.0, KAPPA);
        // Interior untouched, ring written.
        assert_eq!(pk3[(1, 1, 0)], crate::constants::HUGE_R);
        assert!((pk3[(-1, 0, 0)] - 100.0_f64.powf(KAPPA)).abs() < 1e-12);
        assert!((pk3[(4, 4, 3)] - 3100.0_f64.powf(KAPPA)).abs() < 1e-12);
    }
}
