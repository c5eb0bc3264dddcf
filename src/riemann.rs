//! Vertically-implicit nonhydrostatic column solvers and the height
//! updaters that feed them.
//!
//! The acoustic sub-step treats vertical sound propagation implicitly:
//! each column solves a linearized elastic system for the interface
//! vertical velocity, with the perturbation pressure responding to
//! interface convergence through the ideal-gas law,
//!
//! ```text
//!   dm_k (w_k^{n+1} - w_k^n) = dt (pp_k^{n+1} - pp_{k-1}^{n+1})
//!   pp_k^{n+1} = pp_k^n - (gamma_k p_k / dz_k) dt (w_{k+1} - w_k)
//! ```
//!
//! which closes into one symmetric-in-structure tridiagonal system per
//! column, solved directly (Thomas algorithm). The top boundary carries
//! zero perturbation pressure; the surface is a Dirichlet condition on
//! `w` supplied by the height updaters from the motion of the bottom
//! interface over the terrain.
//!
//! [`RiemannSolverC`] runs the half step on C-grid provisional fields
//! over a one-cell-widened domain (the pressure-gradient completion
//! reads one halo ring); [`RiemannSolverD`] runs the full step on the
//! D-grid fields and additionally refreshes the pressure diagnostics
//! used by vertical remapping on the final sub-step.

use crate::constants::{DZ_MIN, GRAV, KAPPA, RDGAS};
use crate::field::{Field2, Field3};
use crate::grid::{DampingCoefficients, GridData, GridIndexing};
use crate::transport::{CopiedCorners, FiniteVolumeTransport};
use crate::types::Levels;

/// Shared implicit column solver. Owns the per-column scratch; one
/// instance per Riemann solver, reused for every column.
struct Sim1 {
    p_fac: f64,
    // Layer scratch (npz).
    bcoef: Vec<f64>,
    pp: Vec<f64>,
    dm_kg: Vec<f64>,
    // Interface scratch (npz + 1).
    w_if: Vec<f64>,
    gam: Vec<f64>,
    rhs: Vec<f64>,
}

impl Sim1 {
    fn new(npz: usize, p_fac: f64) -> Self {
        Self {
            p_fac,
            bcoef: vec![0.0; npz],
            pp: vec![0.0; npz],
            dm_kg: vec![0.0; npz],
            w_if: vec![0.0; npz + 1],
            gam: vec![0.0; npz + 1],
            rhs: vec![0.0; npz + 1],
        }
    }

    /// Advance one column by `dt`.
    ///
    /// Inputs: layer pressure thickness `dm` (Pa), layer temperature
    /// `pt` (K), `cappa`, condensate fraction `q_con`, hydrostatic
    /// interface pressure `pem` (Pa, npz+1), surface vertical motion
    /// `ws` (m/s). In/out: layer height increment `dz` (m, negative)
    /// and layer vertical velocity `w` (m/s). Output: full interface
    /// pressure `p_if` (Pa, npz+1), floored at `p_fac` times the
    /// hydrostatic value.
    #[allow(clippy::too_many_arguments)]
    fn solve_column(
        &mut self,
        dt: f64,
        ws: f64,
        dm: &[f64],
        pt: &[f64],
        cappa: &[f64],
        q_con: &[f64],
        pem: &[f64],
        dz: &mut [f64],
        w: &mut [f64],
        p_if: &mut [f64],
    ) {
        let npz = dm.len();
        debug_assert!(npz >= 2);

        // Perturbation pressure and stiffness per layer.
        for k in 0..npz {
            let gamma = 1.0 / (1.0 - cappa[k]);
            let rho = -dm[k] / (GRAV * dz[k]);
            let pf = rho * RDGAS * pt[k] * (1.0 - q_con[k]);
            let pm = 0.5 * (pem[k] + pem[k + 1]);
            self.pp[k] = pf - pm;
            self.bcoef[k] = gamma * pf / dz[k]; // dz < 0, so bcoef <= 0
            self.dm_kg[k] = dm[k] / GRAV;
        }

        // Interface momentum rows, unknowns w_if[0..npz], surface fixed.
        // Row k:  a w[k-1] + b w[k] + c w[k+1] = r  with
        //   a = dt^2 B[k-1], c = dt^2 B[k],
        //   b = dm_if - dt^2 (B[k] + B[k-1]),
        //   r = dm_if w_if^n + dt (pp[k] - pp[k-1]).
        let dt2 = dt * dt;
        // Forward elimination (Thomas), rows 0..npz-1.
        for k in 0..npz {
            let b_up = if k == 0 { 0.0 } else { self.bcoef[k - 1] };
            let dm_if = if k == 0 {
                0.5 * self.dm_kg[0]
            } else {
                0.5 * (self.dm_kg[k - 1] + self.dm_kg[k])
            };
            let wn = if k == 0 { w[0] } else { 0.5 * (w[k - 1] + w[k]) };
            let a = dt2 * b_up;
            let c = dt2 * self.bcoef[k];
            let b = dm_if - c - a;
            let pp_above = if k == 0 { 0.0 } else { self.pp[k - 1] };
            let mut r = dm_if * wn + dt * (self.pp[k] - pp_above);
            if k == npz - 1 {
                // Surface Dirichlet condition folded into the last row.
                r -= c * ws;
            }
            let denom = if k == 0 { b } else { b - a * self.gam[k - 1] };
            self.gam[k] = if k == npz - 1 { 0.0 } else { c / denom };
            self.rhs[k] = if k == 0 {
                r / denom
            } else {
                (r - a * self.rhs[k - 1]) / denom
            };
        }
        // Back substitution.
        self.w_if[npz] = ws;
        self.w_if[npz - 1] = self.rhs[npz - 1];
        for k in (0..npz - 1).rev() {
            self.w_if[k] = self.rhs[k] - self.gam[k] * self.w_if[k + 1];
        }

        // Thickness, layer velocity, pressure response.
        for k in 0..npz {
            let div = self.w_if[k + 1] - self.w_if[k];
            self.pp[k] -= self.bcoef[k] * dt * div;
            dz[k] = (dz[k] + dt * div).min(-DZ_MIN);
            w[k] = 0.5 * (self.w_if[k] + self.w_if[k + 1]);
        }

        // Interface perturbation pressure: zero at the top, layer-mean
        // averages inside, linear extrapolation to the surface.
        p_if[0] = pem[0].max(self.p_fac * pem[0]);
        for k in 1..npz {
            let pp = 0.5 * (self.pp[k - 1] + self.pp[k]);
            p_if[k] = (pem[k] + pp).max(self.p_fac * pem[k]);
        }
        let pp_s = 1.5 * self.pp[npz - 1] - 0.5 * self.pp[npz - 2];
        p_if[npz] = (pem[npz] + pp_s).max(self.p_fac * pem[npz]);
    }
}

/// Column scratch shared by both Riemann drivers: gathers strided field
/// columns into contiguous slices for the solver.
struct ColumnBuffers {
    dm: Vec<f64>,
    dz: Vec<f64>,
    pt: Vec<f64>,
    cappa: Vec<f64>,
    q_con: Vec<f64>,
    pem: Vec<f64>,
    w: Vec<f64>,
    p_if: Vec<f64>,
}

impl ColumnBuffers {
    fn new(npz: usize) -> Self {
        Self {
            dm: vec![0.0; npz],
            dz: vec![0.0; npz],
            pt: vec![0.0; npz],
            cappa: vec![0.0; npz],
            q_con: vec![0.0; npz],
            pem: vec![0.0; npz + 1],
            w: vec![0.0; npz],
            p_if: vec![0.0; npz + 1],
        }
    }
}

/// Half-step column solver for the provisional C-grid fields.
///
/// Operates over the compute domain widened by one halo cell: the
/// C-grid pressure-gradient completion differences `pkc` and `gz`
/// across cell boundaries.
pub struct RiemannSolverC {
    sim1: Sim1,
    col: ColumnBuffers,
}

impl RiemannSolverC {
    pub fn new(idx: &GridIndexing, p_fac: f64) -> Self {
        Self {
            sim1: Sim1::new(idx.npz, p_fac),
            col: ColumnBuffers::new(idx.npz),
        }
    }

    /// Advance the provisional columns by the half step `dt2`.
    ///
    /// `gz` (interface heights, m) is rebuilt from the surface upward
    /// with the updated thicknesses; `pkc` receives the full interface
    /// pressure; `w3` the updated layer vertical velocity.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &mut self,
        idx: &GridIndexing,
        dt2: f64,
        ptop: f64,
        zs: &Field2,
        ws3: &Field2,
        cappa: &Field3,
        ptc: &Field3,
        q_con: &Field3,
        delpc: &Field3,
        gz: &mut Field3,
        pkc: &mut Field3,
        w3: &mut Field3,
    ) {
        let npz = idx.npz;
        for i in idx.x_range(1, 1) {
            for j in idx.y_range(1, 1) {
                let col = &mut self.col;
                col.pem[0] = ptop;
                for k in 0..npz {
                    col.dm[k] = delpc[(i, j, k)];
                    col.dz[k] = gz[(i, j, k + 1)] - gz[(i, j, k)];
                    col.pt[k] = ptc[(i, j, k)];
                    col.cappa[k] = cappa[(i, j, k)];
                    col.q_con[k] = q_con[(i, j, k)];
                    col.pem[k + 1] = col.pem[k] + col.dm[k];
                    col.w[k] = w3[(i, j, k)];
                }
                self.sim1.solve_column(
                    dt2, ws3[(i, j)], &col.dm, &col.pt, &col.cappa, &col.q_con, &col.pem,
                    &mut col.dz, &mut col.w, &mut col.p_if,
                );
                gz[(i, j, npz)] = zs[(i, j)];
                for k in (0..npz).rev() {
                    gz[(i, j, k)] = gz[(i, j, k + 1)] - col.dz[k];
                }
                for k in 0..=npz {
                    pkc[(i, j, k)] = col.p_if[k];
                }
                for k in 0..npz {
                    w3[(i, j, k)] = col.w[k];
                }
            }
        }
    }
}

/// Full-step column solver for the D-grid fields.
pub struct RiemannSolverD {
    sim1: Sim1,
    col: ColumnBuffers,
}

impl RiemannSolverD {
    pub fn new(idx: &GridIndexing, p_fac: f64) -> Self {
        Self {
            sim1: Sim1::new(idx.npz, p_fac),
            col: ColumnBuffers::new(idx.npz),
        }
    }

    /// Advance the D-grid columns by the full sub-step `dt`.
    ///
    /// Updates `delz`, `w`, `zh` (rebuilt from `zs`), writes the full
    /// interface pressure to `pkc` and the hydrostatic pressure to the
    /// kappa to `pk3`. On the remap sub-step also refreshes `pe`,
    /// `peln` and `pk` for the vertical remapping that follows the
    /// acoustic loop.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &mut self,
        idx: &GridIndexing,
        dt: f64,
        ptop: f64,
        zs: &Field2,
        wsd: &Field2,
        cappa: &Field3,
        pt: &Field3,
        q_con: &Field3,
        delp: &Field3,
        delz: &mut Field3,
        zh: &mut Field3,
        w: &mut Field3,
        pkc: &mut Field3,
        pk3: &mut Field3,
        pe: &mut Field3,
        peln: &mut Field3,
        pk: &mut Field3,
        remap_step: bool,
    ) {
        let npz = idx.npz;
        for i in idx.x_range(0, 0) {
            for j in idx.y_range(0, 0) {
                let col = &mut self.col;
                col.pem[0] = ptop;
                for k in 0..npz {
                    col.dm[k] = delp[(i, j, k)];
                    col.dz[k] = delz[(i, j, k)];
                    col.pt[k] = pt[(i, j, k)];
                    col.cappa[k] = cappa[(i, j, k)];
                    col.q_con[k] = q_con[(i, j, k)];
                    col.pem[k + 1] = col.pem[k] + col.dm[k];
                    col.w[k] = w[(i, j, k)];
                }
                self.sim1.solve_column(
                    dt, wsd[(i, j)], &col.dm, &col.pt, &col.cappa, &col.q_con, &col.pem,
                    &mut col.dz, &mut col.w, &mut col.p_if,
                );
                zh[(i, j, npz)] = zs[(i, j)];
                for k in (0..npz).rev() {
                    delz[(i, j, k)] = col.dz[k];
                    zh[(i, j, k)] = zh[(i, j, k + 1)] - col.dz[k];
                    w[(i, j, k)] = col.w[k];
                }
                for k in 0..=npz {
                    // pkc carries the full elastic pressure; pk3 and the
                    // remap diagnostics stay on the hydrostatic (mass)
                    // coordinate, so the pressure-gradient stage can
                    // split the full force into hydrostatic plus
                    // perturbation parts.
                    pkc[(i, j, k)] = col.p_if[k];
                    pk3[(i, j, k)] = col.pem[k].powf(KAPPA);
                    if remap_step {
                        pe[(i, j, k)] = col.pem[k];
                        peln[(i, j, k)] = col.pem[k].ln();
                        pk[(i, j, k)] = pk3[(i, j, k)];
                    }
                }
            }
        }
    }
}

/// Advect the interface heights with the provisional C-grid winds
/// (first-order upwind, conservative form), producing the surface
/// vertical motion the C-grid Riemann solver needs.
pub struct UpdateHeightOnCGrid {
    gz1: Field3,
}

impl UpdateHeightOnCGrid {
    pub fn new(idx: &GridIndexing) -> Self {
        Self {
            gz1: idx.field(crate::types::Staggering::Center, Levels::Interface),
        }
    }

    /// One half step: `gz` advected by `ut`/`vt` over the compute
    /// domain widened by one cell; `ws3` receives the implied surface
    /// vertical motion; thickness clamped to the floor.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        idx: &GridIndexing,
        grid: &GridData,
        dt2: f64,
        ut: &Field3,
        vt: &Field3,
        gz: &mut Field3,
        zs: &Field2,
        ws3: &mut Field2,
    ) {
        let npz = idx.npz;
        // Winds at interface kk from the adjacent layers.
        let layer_pair = |kk: usize| -> (usize, usize) {
            if kk == 0 {
                (0, 0)
            } else if kk == npz {
                (npz - 1, npz - 1)
            } else {
                (kk - 1, kk)
            }
        };
        for kk in 0..=npz {
            let (ka, kb) = layer_pair(kk);
            // x sweep over a 2-wide ring, y sweep over the 1-wide ring.
            for i in idx.x_range(2, 2) {
                for j in idx.y_range(2, 2) {
                    let u_lo = 0.5 * (ut[(i, j, ka)] + ut[(i, j, kb)]);
                    let u_hi = 0.5 * (ut[(i + 1, j, ka)] + ut[(i + 1, j, kb)]);
                    let xfx_lo = dt2 * u_lo * grid.dy_edge[(i, j)];
                    let xfx_hi = dt2 * u_hi * grid.dy_edge[(i + 1, j)];
                    let g_lo = if u_lo > 0.0 { gz[(i - 1, j, kk)] } else { gz[(i, j, kk)] };
                    let g_hi = if u_hi > 0.0 { gz[(i, j, kk)] } else { gz[(i + 1, j, kk)] };
                    self.gz1[(i, j, kk)] = (gz[(i, j, kk)] * grid.area[(i, j)]
                        + xfx_lo * g_lo
                        - xfx_hi * g_hi)
                        / (grid.area[(i, j)] + xfx_lo - xfx_hi);
                }
            }
            for i in idx.x_range(1, 1) {
                for j in idx.y_range(1, 1) {
                    let v_lo = 0.5 * (vt[(i, j, ka)] + vt[(i, j, kb)]);
                    let v_hi = 0.5 * (vt[(i, j + 1, ka)] + vt[(i, j + 1, kb)]);
                    let yfx_lo = dt2 * v_lo * grid.dx_edge[(i, j)];
                    let yfx_hi = dt2 * v_hi * grid.dx_edge[(i, j + 1)];
                    let g_lo = if v_lo > 0.0 {
                        self.gz1[(i, j - 1, kk)]
                    } else {
                        self.gz1[(i, j, kk)]
                    };
                    let g_hi = if v_hi > 0.0 {
                        self.gz1[(i, j, kk)]
                    } else {
                        self.gz1[(i, j + 1, kk)]
                    };
                    gz[(i, j, kk)] = (self.gz1[(i, j, kk)] * grid.area[(i, j)]
                        + yfx_lo * g_lo
                        - yfx_hi * g_hi)
                        / (grid.area[(i, j)] + yfx_lo - yfx_hi);
                }
            }
        }
        // Surface vertical motion and thickness floor.
        for i in idx.x_range(1, 1) {
            for j in idx.y_range(1, 1) {
                ws3[(i, j)] = (zs[(i, j)] - gz[(i, j, npz)]) / dt2;
                for k in (0..npz).rev() {
                    let floor = gz[(i, j, k + 1)] + DZ_MIN;
                    if gz[(i, j, k)] < floor {
                        gz[(i, j, k)] = floor;
                    }
                }
            }
        }
    }
}

/// Advect the interface heights with the full transport operator on the
/// D-grid, producing the surface vertical motion for the D-grid Riemann
/// solver.
pub struct UpdateHeightOnDGrid {
    transport: FiniteVolumeTransport,
    crx_if: Field3,
    cry_if: Field3,
    xfx_if: Field3,
    yfx_if: Field3,
    fx: Field3,
    fy: Field3,
}

impl UpdateHeightOnDGrid {
    pub fn new(
        idx: &GridIndexing,
        damping: &DampingCoefficients,
        hord_tm: i32,
        nord_v: usize,
        damp_vt: f64,
    ) -> Result<Self, crate::error::ConfigError> {
        let transport = FiniteVolumeTransport::new_on(
            idx,
            damping,
            hord_tm,
            Some(nord_v),
            Some(damp_vt),
            Levels::Interface,
        )?;
        let mk_x = || idx.field(crate::types::Staggering::XEdge, Levels::Interface);
        let mk_y = || idx.field(crate::types::Staggering::YEdge, Levels::Interface);
        Ok(Self {
            transport,
            crx_if: mk_x(),
            cry_if: mk_y(),
            xfx_if: mk_x(),
            yfx_if: mk_y(),
            fx: mk_x(),
            fy: mk_y(),
        })
    }

    /// One full sub-step: `zh` advected with the layer Courant numbers
    /// interpolated to interfaces; `ws` receives the implied surface
    /// vertical motion; thickness clamped to the floor.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        idx: &GridIndexing,
        grid: &GridData,
        dt: f64,
        crx: &Field3,
        cry: &Field3,
        xfx: &Field3,
        yfx: &Field3,
        zh: &mut Field3,
        zs: &Field2,
        ws: &mut Field2,
    ) -> Result<(), crate::error::TransportError> {
        let npz = idx.npz;
        // Layer-to-interface interpolation of the Courant numbers and
        // area fluxes.
        for kk in 0..=npz {
            let (ka, kb) = if kk == 0 {
                (0, 0)
            } else if kk == npz {
                (npz - 1, npz - 1)
            } else {
                (kk - 1, kk)
            };
            for i in idx.x_range(0, 1) {
                for j in idx.y_full() {
                    self.crx_if[(i, j, kk)] = 0.5 * (crx[(i, j, ka)] + crx[(i, j, kb)]);
                    self.xfx_if[(i, j, kk)] = 0.5 * (xfx[(i, j, ka)] + xfx[(i, j, kb)]);
                }
            }
            for i in idx.x_full() {
                for j in idx.y_range(0, 1) {
                    self.cry_if[(i, j, kk)] = 0.5 * (cry[(i, j, ka)] + cry[(i, j, kb)]);
                    self.yfx_if[(i, j, kk)] = 0.5 * (yfx[(i, j, ka)] + yfx[(i, j, kb)]);
                }
            }
        }
        self.transport.flux(
            idx,
            grid,
            CopiedCorners::periodic(zh),
            &self.crx_if,
            &self.cry_if,
            &self.xfx_if,
            &self.yfx_if,
            &mut self.fx,
            &mut self.fy,
            None,
            None,
            None,
        )?;
        for i in idx.x_range(0, 0) {
            for j in idx.y_range(0, 0) {
                for kk in 0..=npz {
                    let area_after = grid.area[(i, j)] + self.xfx_if[(i, j, kk)]
                        - self.xfx_if[(i + 1, j, kk)]
                        + self.yfx_if[(i, j, kk)]
                        - self.yfx_if[(i, j + 1, kk)];
                    zh[(i, j, kk)] = (zh[(i, j, kk)] * grid.area[(i, j)]
                        + self.fx[(i, j, kk)]
                        - self.fx[(i + 1, j, kk)]
                        + self.fy[(i, j, kk)]
                        - self.fy[(i, j + 1, kk)])
                        / area_after;
                }
                ws[(i, j)] = (zs[(i, j)] - zh[(i, j, npz)]) / dt;
                for k in (0..npz).rev() {
                    let floor = zh[(i, j, k + 1)] + DZ_MIN;
                    if zh[(i, j, k)] < floor {
                        zh[(i, j, k)] = floor;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::sigma_coordinate;
    use crate::types::Staggering;

    fn hydrostatic_column(npz: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
        // An isothermal column in exact hydrostatic balance: the gas-law
        // pressure equals the hydrostatic mean, so pp == 0 everywhere.
        let t0 = 250.0;
        let ptop = 100.0;
        let dp = 1.0e4;
        let mut pem = vec![ptop];
        for _ in 0..npz {
            pem.push(pem.last().unwrap() + dp);
        }
        let dm: Vec<f64> = vec![dp; npz];
        let pt = vec![t0; npz];
        let cappa = vec![KAPPA; npz];
        let q_con = vec![0.0; npz];
        // Choose dz so that rho R T == layer-mean hydrostatic pressure.
        let dz: Vec<f64> = (0..npz)
            .map(|k| {
                let pm = 0.5 * (pem[k] + pem[k + 1]);
                -dp * RDGAS * t0 / (GRAV * pm)
            })
            .collect();
        (dm, dz, pt, cappa, q_con, pem)
    }

    #[test]
    fn balanced_column_at_rest_stays_at_rest() {
        let npz = 8;
        let (dm, mut dz, pt, cappa, q_con, pem) = hydrostatic_column(npz);
        let dz0 = dz.clone();
        let mut w = vec![0.0; npz];
        let mut p_if = vec![0.0; npz + 1];
        let mut sim1 = Sim1::new(npz, 0.05);
        sim1.solve_column(
            4.0, 0.0, &dm, &pt, &cappa, &q_con, &pem, &mut dz, &mut w, &mut p_if,
        );
        for k in 0..npz {
            assert!(w[k].abs() < 1e-10, "w[{}] = {}", k, w[k]);
            assert!((dz[k] - dz0[k]).abs() < 1e-9);
        }
        // Interface pressure reduces to the hydrostatic profile.
        for k in 0..=npz {
            assert!((p_if[k] - pem[k]).abs() < 1e-6, "k={}", k);
        }
    }

    #[test]
    fn compression_raises_interface_pressure() {
        let npz = 8;
        let (dm, mut dz, pt, cappa, q_con, pem) = hydrostatic_column(npz);
        // Downward motion everywhere against a rigid surface compresses
        // the lowest layers.
        let mut w = vec![-1.0; npz];
        let mut p_if = vec![0.0; npz + 1];
        let mut sim1 = Sim1::new(npz, 0.05);
        sim1.solve_column(
            4.0, 0.0, &dm, &pt, &cappa, &q_con, &pem, &mut dz, &mut w, &mut p_if,
        );
        assert!(p_if[npz] > pem[npz]);
        // The surface interface stays pinned.
        assert!(w[npz - 1] > -1.0);
    }

    #[test]
    fn thickness_floor_is_enforced() {
        let npz = 4;
        let (dm, mut dz, pt, cappa, q_con, pem) = hydrostatic_column(npz);
        // Extreme convergence would collapse the bottom layer without
        // the floor.
        dz[npz - 1] = -DZ_MIN * 1.5;
        let mut w = vec![0.0; npz];
        let mut p_if = vec![0.0; npz + 1];
        let mut sim1 = Sim1::new(npz, 0.05);
        sim1.solve_column(
            50.0, 0.0, &dm, &pt, &cappa, &q_con, &pem, &mut dz, &mut w, &mut p_if,
        );
        for (k, dzk) in dz.iter().enumerate() {
            assert!(*dzk <= -DZ_MIN + 1e-12, "dz[{}] = {}", k, dzk);
        }
    }

    #[test]
    fn riemann_c_preserves_surface_height() {
        let npz = 6;
        let idx = GridIndexing::new(4, 4, npz, 3).unwrap();
        let (dm_col, dz_col, pt_col, _, _, _) = hydrostatic_column(npz);
        let mut zs = Field2::zeros(4, 4, 3);
        zs.fill(25.0);
        let ws3 = Field2::zeros(4, 4, 3);
        let mut cappa = idx.field(Staggering::Center, Levels::Layer);
        cappa.fill(KAPPA);
        let mut ptc = idx.field(Staggering::Center, Levels::Layer);
        ptc.assign(|_, _, k| pt_col[k]);
        let q_con = idx.field(Staggering::Center, Levels::Layer);
        let mut delpc = idx.field(Staggering::Center, Levels::Layer);
        delpc.assign(|_, _, k| dm_col[k]);
        let mut gz = idx.field(Staggering::Center, Levels::Interface);
        gz.assign(|_, _, _| 0.0);
        // Build gz from the column thicknesses.
        for i in idx.x_full() {
            for j in idx.y_full() {
                gz[(i, j, npz)] = 25.0;
                for k in (0..npz).rev() {
                    gz[(i, j, k)] = gz[(i, j, k + 1)] - dz_col[k];
                }
            }
        }
        let mut pkc = idx.field(Staggering::Center, Levels::Interface);
        let mut w3 = idx.field(Staggering::Center, Levels::Layer);
        let mut solver = RiemannSolverC::new(&idx, 0.05);
        solver.solve(
            &idx, 2.0, 100.0, &zs, &ws3, &cappa, &ptc, &q_con, &delpc, &mut gz, &mut pkc,
            &mut w3,
        );
        assert_eq!(gz[(0, 0, npz)], 25.0);
        // Balanced column: no vertical motion develops.
        assert!(w3.max_abs() < 1e-9);
    }

    #[test]
    fn riemann_d_writes_remap_diagnostics_only_on_remap_step() {
        let npz = 6;
        let idx = GridIndexing::new(4, 4, npz, 3).unwrap();
        let (dm_col, dz_col, pt_col, _, _, _) = hydrostatic_column(npz);
        let mut zs = Field2::zeros(4, 4, 3);
        zs.fill(0.0);
        let wsd = Field2::zeros(4, 4, 3);
        let mut cappa = idx.field(Staggering::Center, Levels::Layer);
        cappa.fill(KAPPA);
        let mut pt = idx.field(Staggering::Center, Levels::Layer);
        pt.assign(|_, _, k| pt_col[k]);
        let q_con = idx.field(Staggering::Center, Levels::Layer);
        let mut delp = idx.field(Staggering::Center, Levels::Layer);
        delp.assign(|_, _, k| dm_col[k]);
        let mut delz = idx.field(Staggering::Center, Levels::Layer);
        delz.assign(|_, _, k| dz_col[k]);
        let mut zh = idx.field(Staggering::Center, Levels::Interface);
        let mut w = idx.field(Staggering::Center, Levels::Layer);
        let mut pkc = idx.field(Staggering::Center, Levels::Interface);
        let mut pk3 = idx.field(Staggering::Center, Levels::Interface);
        let mut pe = idx.field(Staggering::Center, Levels::Interface);
        let mut peln = idx.field(Staggering::Center, Levels::Interface);
        let mut pk = idx.field(Staggering::Center, Levels::Interface);
        let mut solver = RiemannSolverD::new(&idx, 0.05);
        solver.solve(
            &idx, 4.0, 100.0, &zs, &wsd, &cappa, &pt, &q_con, &delp, &mut delz, &mut zh,
            &mut w, &mut pkc, &mut pk3, &mut pe, &mut peln, &mut pk, false,
        );
        assert_eq!(pe.max_abs(), 0.0);
        assert!(pk3.max_abs() > 0.0);
        solver.solve(
            &idx, 4.0, 100.0, &zs, &wsd, &cappa, &pt, &q_con, &delp, &mut delz, &mut zh,
            &mut w, &mut pkc, &mut pk3, &mut pe, &mut peln, &mut pk, true,
        );
        assert!(pe.max_abs() > 0.0);
        assert!((pk[(0, 0, npz)] - pe[(0, 0, npz)].powf(KAPPA)).abs() < 1e-10);
    }

    #[test]
    fn update_dz_c_zero_wind_keeps_heights() {
        let npz = 4;
        let idx = GridIndexing::new(4, 4, npz, 3).unwrap();
        let (ak, bk) = sigma_coordinate(npz, 100.0);
        let grid = GridData::uniform(&idx, 1.0e3, 1.0e3, 0.0, ak, bk);
        let ut = idx.field(Staggering::XEdge, Levels::Layer);
        let vt = idx.field(Staggering::YEdge, Levels::Layer);
        let mut gz = idx.field(Staggering::Center, Levels::Interface);
        gz.assign(|_, _, k| 1000.0 * (npz - k) as f64);
        let before = gz.clone();
        let mut zs = Field2::zeros(4, 4, 3);
        zs.fill(0.0);
        let mut ws3 = Field2::zeros(4, 4, 3);
        let mut op = UpdateHeightOnCGrid::new(&idx);
        op.update(&idx, &grid, 2.0, &ut, &vt, &mut gz, &zs, &mut ws3);
        for i in idx.x_range(1, 1) {
            for j in idx.y_range(1, 1) {
                for k in 0..=npz {
                    assert_eq!(gz[(i, j, k)], before[(i, j, k)]);
                }
            }
        }
        assert_eq!(ws3[(0, 0)], 0.0);
    }
}
